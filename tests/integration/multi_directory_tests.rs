use super::common::{finder, names, report, write_file};
use dupsort::duplicates::FinderError;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_duplicates_across_roots() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    write_file(left.path(), "photo.jpg", b"jpeg bytes");
    write_file(right.path(), "backup-photo.jpg", b"jpeg bytes");
    write_file(right.path(), "other.jpg", b"different!");
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work)
        .find_duplicates_in_paths(&[left.path().to_path_buf(), right.path().to_path_buf()])
        .unwrap();

    assert_eq!(summary.roots.len(), 2);
    assert_eq!(summary.total_files, 3);
    assert_eq!(groups.len(), 1);
    assert_eq!(names(&groups[0].paths()), vec!["backup-photo.jpg", "photo.jpg"]);
}

#[test]
fn test_nested_root_scanned_once() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "sub/a", b"twin");
    write_file(dir.path(), "b", b"twin");
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work)
        .find_duplicates_in_paths(&[dir.path().join("sub"), dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(summary.roots, vec![dir.path().to_path_buf()]);
    assert_eq!(summary.total_files, 2);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
}

#[test]
fn test_repeated_root_scanned_once() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"twin");
    write_file(dir.path(), "b", b"twin");
    let work = tempdir().unwrap();

    let root = dir.path().to_path_buf();
    let (groups, summary) = finder(&work)
        .find_duplicates_in_paths(&[root.clone(), root])
        .unwrap();

    assert_eq!(summary.total_files, 2);
    assert_eq!(groups[0].len(), 2);
}

#[test]
fn test_missing_root_is_fatal() {
    let dir = tempdir().unwrap();
    let work = tempdir().unwrap();

    let result = finder(&work).find_duplicates_in_paths(&[
        dir.path().to_path_buf(),
        PathBuf::from("/nonexistent/dupsort/root"),
    ]);

    assert!(matches!(result, Err(FinderError::PathNotFound(_))));
}

#[test]
fn test_file_root_is_fatal() {
    let dir = tempdir().unwrap();
    let file = write_file(dir.path(), "file.txt", b"x");
    let work = tempdir().unwrap();

    let result = finder(&work).find_duplicates_in_paths(&[file]);
    assert!(matches!(result, Err(FinderError::NotADirectory(_))));
}

#[test]
fn test_root_order_does_not_change_report() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    write_file(left.path(), "x", b"abc");
    write_file(right.path(), "y", b"abc");
    write_file(left.path(), "p", b"longer content");
    write_file(right.path(), "q", b"longer content");
    let work = tempdir().unwrap();

    let finder = finder(&work);
    let forward = report(&finder, &[left.path().to_path_buf(), right.path().to_path_buf()]);
    let backward = report(&finder, &[right.path().to_path_buf(), left.path().to_path_buf()]);

    assert_eq!(forward, backward);
}

use super::common::{config, finder, names, write_file};
use dupsort::duplicates::DuplicateFinder;
use dupsort::scanner::FileId;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_hardlinks_to_same_file_not_counted_as_duplicates() {
    let dir = tempdir().unwrap();
    let original = write_file(dir.path(), "original.txt", b"identical content");
    let hardlink = dir.path().join("hardlink.txt");
    if let Err(e) = fs::hard_link(&original, &hardlink) {
        eprintln!("Skipping hardlink test: failed to create hardlink: {}", e);
        return;
    }
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    if FileId::is_supported() {
        assert!(groups.is_empty());
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.hard_links_skipped, 1);
        assert_eq!(summary.files_hashed, 0);
    } else {
        assert_eq!(groups.len(), 1);
    }
}

#[test]
fn test_hardlink_plus_real_copy() {
    let dir = tempdir().unwrap();
    let original = write_file(dir.path(), "a", b"shared content");
    if fs::hard_link(&original, dir.path().join("a-link")).is_err() {
        return;
    }
    write_file(dir.path(), "copy", b"shared content");
    let work = tempdir().unwrap();

    let (groups, _) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 1);
    if FileId::is_supported() {
        // One name per inode survives.
        assert_eq!(groups[0].len(), 2);
        assert!(names(&groups[0].paths()).contains(&"copy".to_string()));
    }
}

#[test]
fn test_hardlinks_reported_in_cross_device_mode() {
    let dir = tempdir().unwrap();
    let original = write_file(dir.path(), "a", b"linked");
    if fs::hard_link(&original, dir.path().join("b")).is_err() {
        return;
    }
    let work = tempdir().unwrap();

    let finder = DuplicateFinder::new(config(&work).with_force_cross_device(true));
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert!(summary.cross_device);
    assert_eq!(groups.len(), 1);
    assert_eq!(names(&groups[0].paths()), vec!["a", "b"]);
}

#[cfg(unix)]
mod symlinks {
    use super::*;
    use dupsort::records::FileKind;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_symlink_to_file_in_tree_is_an_alias() {
        let dir = tempdir().unwrap();
        let target = write_file(dir.path(), "target.txt", b"symlinked content");
        symlink(&target, dir.path().join("link.txt")).unwrap();
        let work = tempdir().unwrap();

        let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

        assert!(groups.is_empty());
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.hard_links_skipped, 1);
    }

    #[test]
    fn test_symlink_to_file_outside_tree_is_a_candidate() {
        let outside = tempdir().unwrap();
        let target = write_file(outside.path(), "elsewhere.txt", b"linked from afar");
        let dir = tempdir().unwrap();
        symlink(&target, dir.path().join("link.txt")).unwrap();
        write_file(dir.path(), "copy.txt", b"linked from afar");
        let work = tempdir().unwrap();

        let (groups, _) = finder(&work).find_duplicates(dir.path()).unwrap();

        assert_eq!(groups.len(), 1);
        let link = groups[0]
            .files
            .iter()
            .find(|f| f.path.ends_with("link.txt"))
            .unwrap();
        assert_eq!(link.kind, FileKind::Symlink);
        assert_eq!(link.id, FileId::from_metadata(&fs::metadata(&target).unwrap()));
    }

    #[test]
    fn test_symlink_to_directory_not_followed() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "real/file.txt", b"only once");
        symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();
        let work = tempdir().unwrap();

        let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

        assert!(groups.is_empty());
        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.skipped_special, 1);
    }

    #[test]
    fn test_dangling_symlink_skipped() {
        let dir = tempdir().unwrap();
        symlink(dir.path().join("missing"), dir.path().join("dangling")).unwrap();
        write_file(dir.path(), "real.txt", b"content");
        let work = tempdir().unwrap();

        let (_, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.scan_errors, 1);
    }
}

use super::common::{finder, names, write_file};
use dupsort::duplicates::{DuplicateFinder, FinderError};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::tempdir;

#[cfg(unix)]
mod permissions {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_unreadable_directory_does_not_stop_scan() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a", b"visible");
        write_file(dir.path(), "b", b"visible");
        let locked = dir.path().join("locked");
        write_file(&locked, "hidden", b"visible");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        if fs::read_dir(&locked).is_ok() {
            // Running with privileges that ignore permissions.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let work = tempdir().unwrap();
        let result = finder(&work).find_duplicates(dir.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let (groups, summary) = result.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(names(&groups[0].paths()), vec!["a", "b"]);
        assert!(summary.scan_errors >= 1);
    }

    #[test]
    fn test_unreadable_file_skipped_while_screening() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a", b"same content");
        write_file(dir.path(), "b", b"same content");
        let c = write_file(dir.path(), "c", b"same content");
        fs::set_permissions(&c, fs::Permissions::from_mode(0o000)).unwrap();

        if fs::File::open(&c).is_ok() {
            return;
        }

        let work = tempdir().unwrap();
        let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(names(&groups[0].paths()), vec!["a", "b"]);
        assert_eq!(summary.read_errors, 1);
    }
}

#[test]
fn test_interrupt_before_start() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"x");
    let work = tempdir().unwrap();

    let flag = Arc::new(AtomicBool::new(true));
    let finder = DuplicateFinder::new(super::common::config(&work).with_shutdown_flag(flag));

    assert!(matches!(
        finder.find_duplicates(dir.path()),
        Err(FinderError::Interrupted)
    ));
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}

#[test]
fn test_failed_run_removes_work_area() {
    let dir = tempdir().unwrap();
    let work = tempdir().unwrap();

    let result = finder(&work).find_duplicates_in_paths(&[
        dir.path().to_path_buf(),
        dir.path().join("does-not-exist"),
    ]);

    assert!(result.is_err());
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}

#[test]
fn test_missing_work_dir_is_fatal() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"x");

    let finder = DuplicateFinder::new(
        dupsort::duplicates::FinderConfig::default()
            .with_work_dir(Some(dir.path().join("no/such/work/dir"))),
    );

    assert!(matches!(
        finder.find_duplicates(dir.path()),
        Err(FinderError::Staging(_))
    ));
}

use super::common::{finder, names, report, write_file};
use dupsort::output::read_groups;
use tempfile::tempdir;

#[test]
fn test_paths_with_spaces() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "my documents/file one.txt", b"spaced out");
    write_file(dir.path(), "file  two .txt", b"spaced out");
    let work = tempdir().unwrap();

    let (groups, _) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(
        names(&groups[0].paths()),
        vec!["file  two .txt", "file one.txt"]
    );
}

#[test]
fn test_unicode_paths() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "日本語/ファイル.txt", b"unicode");
    write_file(dir.path(), "café.txt", b"unicode");
    write_file(dir.path(), "emoji 🎉.txt", b"unicode");
    let work = tempdir().unwrap();

    let (groups, _) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);
    for path in groups[0].paths() {
        assert!(path.exists(), "{} should round-trip", path.display());
    }
}

#[test]
fn test_name_with_exclamation_marks() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "wow!.txt", b"bang");
    write_file(dir.path(), "!*END*.txt", b"bang");
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert_eq!(summary.skipped_unencodable, 0);
    assert_eq!(groups.len(), 1);
    assert_eq!(names(&groups[0].paths()), vec!["!*END*.txt", "wow!.txt"]);
}

#[cfg(unix)]
mod unix_names {
    use super::*;
    use std::ffi::OsStr;
    use std::fs;
    use std::os::unix::ffi::OsStrExt;

    #[test]
    fn test_name_containing_sentinel_is_skipped() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a", b"payload");
        write_file(dir.path(), "b", b"payload");
        write_file(dir.path(), "c!*END*!d", b"payload");
        let work = tempdir().unwrap();

        let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

        assert_eq!(summary.skipped_unencodable, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(names(&groups[0].paths()), vec!["a", "b"]);
    }

    #[test]
    fn test_name_containing_newline_is_skipped() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a", b"payload");
        write_file(dir.path(), "line\nbreak", b"payload");
        let work = tempdir().unwrap();

        let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

        assert_eq!(summary.skipped_unencodable, 1);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_non_utf8_names_round_trip() {
        let dir = tempdir().unwrap();
        let raw = OsStr::from_bytes(b"latin1-\xe9t\xe9.txt");
        let odd = dir.path().join(raw);
        if fs::write(&odd, b"bytes").is_err() {
            // Filesystem rejects non-UTF-8 names.
            return;
        }
        write_file(dir.path(), "plain.txt", b"bytes");
        let work = tempdir().unwrap();

        let out = report(&finder(&work), &[dir.path().to_path_buf()]);
        let groups = read_groups(out.as_slice()).unwrap();

        assert_eq!(groups.len(), 1);
        assert!(groups[0].paths().contains(&odd));
    }
}

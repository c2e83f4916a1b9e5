use super::common::{finder, report, write_file};
use dupsort::duplicates::FinderError;
use dupsort::error::{ExitCode, StructuredError};
use dupsort::output::read_groups;
use dupsort::records::{HashRecord, Record, SENTINEL};
use anyhow::Context;
use tempfile::tempdir;

#[test]
fn test_report_line_layout() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"X");
    write_file(dir.path(), "b", b"X");
    let work = tempdir().unwrap();

    let out = report(&finder(&work), &[dir.path().to_path_buf()]);
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 2);
    for line in &lines {
        let fields: Vec<&str> = line.splitn(4, ' ').collect();
        assert_eq!(fields[0], "02129bb861061d1a052c592e2dc6b383");
        assert_eq!(fields[1].len(), 16);
        assert_eq!(fields[2].len(), 16);
        assert!(fields[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(fields[2].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(fields[3].ends_with("!*END*! f"));
        assert!(fields[3].starts_with(dir.path().to_str().unwrap()));
    }
    assert!(text.ends_with('\n'));
}

#[test]
fn test_report_lines_decode_as_hash_records() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "x/one", b"hello world");
    write_file(dir.path(), "y/two", b"hello world");
    let work = tempdir().unwrap();

    let out = report(&finder(&work), &[dir.path().to_path_buf()]);

    for line in out.split(|&b| b == b'\n').filter(|l| !l.is_empty()) {
        let record = HashRecord::decode(line).unwrap();
        assert!(record.path.is_file());
        assert_eq!(record.to_line(), [line, b"\n"].concat());
        assert!(line.windows(SENTINEL.len()).any(|w| w == SENTINEL));
    }
}

#[test]
fn test_groups_are_contiguous_and_ordered() {
    let dir = tempdir().unwrap();
    for (name, body) in [
        ("k1", "kiwi"),
        ("a1", "apple"),
        ("k2", "kiwi"),
        ("a2", "apple"),
        ("m1", "mango!"),
        ("a3", "apple"),
        ("m2", "mango!"),
    ] {
        write_file(dir.path(), name, body.as_bytes());
    }
    let work = tempdir().unwrap();

    let out = report(&finder(&work), &[dir.path().to_path_buf()]);
    let groups = read_groups(out.as_slice()).unwrap();

    assert_eq!(groups.len(), 3);
    let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
    let mut sorted_sizes = sizes.clone();
    sorted_sizes.sort_unstable();
    assert_eq!(sorted_sizes, vec![2, 2, 3]);

    // Each group appears once, so no hash repeats after its run ends.
    let mut seen = Vec::new();
    for group in &groups {
        assert!(!seen.contains(&group.hash));
        seen.push(group.hash);
    }
}

#[test]
fn test_report_to_file_matches_summary() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"dup");
    write_file(dir.path(), "b", b"dup");
    write_file(dir.path(), "c", b"dup");
    let work = tempdir().unwrap();
    let out_path = work.path().join("report.txt");

    let file = std::fs::File::create(&out_path).unwrap();
    let summary = finder(&work)
        .run(&[dir.path().to_path_buf()], file)
        .unwrap();

    let contents = std::fs::read(&out_path).unwrap();
    let groups = read_groups(contents.as_slice()).unwrap();
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(summary.duplicate_files, 2);
    assert_eq!(groups[0].len(), 3);
}

#[test]
fn test_interrupted_error_maps_to_exit_130() {
    let err = Err::<(), _>(FinderError::Interrupted)
        .context("Duplicate scan failed")
        .unwrap_err();

    let code = ExitCode::for_error(&err);
    let structured = StructuredError::new(&err, code);

    assert_eq!(code.as_i32(), 130);
    assert_eq!(structured.code, "DS130");
    assert!(structured.interrupted);
    let json = serde_json::to_value(&structured).unwrap();
    assert_eq!(json["exit_code"], 130);
}

#[test]
fn test_missing_root_maps_to_general_error() {
    let work = tempdir().unwrap();
    let err = finder(&work)
        .run(&[work.path().join("gone")], Vec::new())
        .context("Duplicate scan failed")
        .unwrap_err();

    let code = ExitCode::for_error(&err);
    assert_eq!(code, ExitCode::GeneralError);
    assert!(StructuredError::new(&err, code).message.contains("gone"));
}

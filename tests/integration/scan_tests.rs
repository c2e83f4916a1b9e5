use super::common::{config, finder, names, report, write_file};
use dupsort::duplicates::{DuplicateFinder, FinderConfig};
use dupsort::scanner::{ExclusionList, WalkerConfig};
use tempfile::tempdir;

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.total_files, 0);
    assert_eq!(summary.duplicate_groups, 0);
}

#[test]
fn test_one_byte_duplicates() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"X");
    write_file(dir.path(), "b", b"X");
    write_file(dir.path(), "c", b"Y");
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(names(&groups[0].paths()), vec!["a", "b"]);
    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.duplicate_files, 1);
    assert_eq!(summary.reclaimable_space, 1);
}

#[test]
fn test_scan_unique_sizes_never_hashed() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.txt", b"1");
    write_file(dir.path(), "b.txt", b"22");
    write_file(dir.path(), "c.txt", b"333");
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.eliminated_by_size, 3);
    assert_eq!(summary.files_hashed, 0);
}

#[test]
fn test_equal_size_different_last_byte() {
    let dir = tempdir().unwrap();
    let mut a = vec![7u8; 4096];
    let mut b = a.clone();
    a[4095] = 1;
    b[4095] = 2;
    write_file(dir.path(), "a", &a);
    write_file(dir.path(), "b", &b);
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.eliminated_by_compare, 2);
    assert_eq!(summary.files_hashed, 0);
}

#[test]
fn test_large_group_with_distinct_headers_never_hashed() {
    let dir = tempdir().unwrap();
    let mut content = vec![0x11u8; 512 * 1024];
    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        content[0] = i as u8;
        write_file(dir.path(), name, &content);
    }
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.size_group_members, 4);
    assert_eq!(summary.eliminated_by_compare, 4);
    assert_eq!(summary.files_hashed, 0);
    assert_eq!(summary.bytes_hashed, 0);
}

#[test]
fn test_large_group_hashes_only_matching_headers() {
    let dir = tempdir().unwrap();
    let base = vec![0x22u8; 300 * 1024];
    let mut tail_differs = base.clone();
    tail_differs[250_000] = 0;
    let mut head_differs = base.clone();
    head_differs[10] = 0;
    write_file(dir.path(), "a", &base);
    write_file(dir.path(), "b", &base);
    write_file(dir.path(), "c", &tail_differs);
    write_file(dir.path(), "d", &head_differs);
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(names(&groups[0].paths()), vec!["a", "b"]);
    assert_eq!(summary.eliminated_by_compare, 1);
    assert_eq!(summary.files_hashed, 3);
}

#[test]
fn test_difference_past_compare_window_is_not_a_duplicate() {
    let dir = tempdir().unwrap();
    let a = vec![0x5a; 200 * 1024];
    let mut b = a.clone();
    b[150_000] ^= 0xff;
    write_file(dir.path(), "a", &a);
    write_file(dir.path(), "b", &b);
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert!(groups.is_empty());
    assert_eq!(summary.eliminated_by_compare, 0);
    assert_eq!(summary.files_hashed, 2);
}

#[test]
fn test_large_identical_files_reported() {
    let dir = tempdir().unwrap();
    let content: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    write_file(dir.path(), "big1", &content);
    write_file(dir.path(), "big2", &content);
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(summary.reclaimable_space, content.len() as u64);
}

#[test]
fn test_mixed_content_size_group() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a1", b"AAAA");
    write_file(dir.path(), "b1", b"BBBB");
    write_file(dir.path(), "a2", b"AAAA");
    write_file(dir.path(), "c1", b"CCCC");
    write_file(dir.path(), "b2", b"BBBB");
    let work = tempdir().unwrap();

    let (groups, summary) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 2);
    let mut found: Vec<Vec<String>> = groups.iter().map(|g| names(&g.paths())).collect();
    found.sort();
    assert_eq!(found, vec![vec!["a1", "a2"], vec!["b1", "b2"]]);
    assert_eq!(summary.files_hashed, 5);
}

#[test]
fn test_zero_length_files_never_reported() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "empty1", b"");
    write_file(dir.path(), "empty2", b"");
    write_file(dir.path(), "empty3", b"");
    let work = tempdir().unwrap();

    let finder = finder(&work);
    let out = report(&finder, &[dir.path().to_path_buf()]);
    let (_, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert!(out.is_empty());
    assert_eq!(summary.skipped_zero_length, 3);
    assert_eq!(summary.total_files, 0);
}

#[test]
fn test_excluded_paths_never_reach_report() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "keep/a", b"same bytes");
    write_file(dir.path(), "keep/b", b"same bytes");
    write_file(dir.path(), "node_modules/pkg/c", b"same bytes");
    write_file(dir.path(), "keep/skip-me.bak", b"same bytes");
    let work = tempdir().unwrap();

    let exclusions = ExclusionList::from_patterns(["/node_modules/", ".bak"]).unwrap();
    let finder = DuplicateFinder::new(
        FinderConfig::default()
            .with_work_dir(Some(work.path().to_path_buf()))
            .with_walker_config(WalkerConfig::new(exclusions, Vec::new())),
    );
    let out = report(&finder, &[dir.path().to_path_buf()]);
    let text = String::from_utf8(out).unwrap();

    assert_eq!(text.lines().count(), 2);
    assert!(!text.contains("node_modules"));
    assert!(!text.contains(".bak"));
}

#[test]
fn test_ignore_patterns() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.txt", b"same");
    write_file(dir.path(), "b.txt", b"same");
    write_file(dir.path(), "c.tmp", b"same");
    let work = tempdir().unwrap();

    let finder = DuplicateFinder::new(
        FinderConfig::default()
            .with_work_dir(Some(work.path().to_path_buf()))
            .with_walker_config(WalkerConfig::new(
                ExclusionList::default(),
                vec!["*.tmp".to_string()],
            )),
    );
    let (groups, summary) = finder.find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(names(&groups[0].paths()), vec!["a.txt", "b.txt"]);
    assert_eq!(summary.total_files, 2);
}

#[test]
fn test_nested_directories() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "one/two/three/deep.txt", b"nested content");
    write_file(dir.path(), "top.txt", b"nested content");
    let work = tempdir().unwrap();

    let (groups, _) = finder(&work).find_duplicates(dir.path()).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(names(&groups[0].paths()), vec!["deep.txt", "top.txt"]);
}

#[test]
fn test_report_is_idempotent() {
    let dir = tempdir().unwrap();
    for i in 0..20 {
        write_file(dir.path(), &format!("d{i}/x"), format!("content {}", i % 4).as_bytes());
    }
    let work = tempdir().unwrap();

    let finder = finder(&work);
    let first = report(&finder, &[dir.path().to_path_buf()]);
    let second = report(&finder, &[dir.path().to_path_buf()]);

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_small_sort_buffer_gives_same_report() {
    let dir = tempdir().unwrap();
    for i in 0..60 {
        write_file(dir.path(), &format!("f{i:02}"), format!("payload-{}", i % 7).as_bytes());
    }
    let work = tempdir().unwrap();

    let roomy = report(&finder(&work), &[dir.path().to_path_buf()]);
    let tight = DuplicateFinder::new(
        FinderConfig::default()
            .with_work_dir(Some(work.path().to_path_buf()))
            .with_sort_buffer_bytes(256)
            .with_io_threads(1),
    );
    let spilled = report(&tight, &[dir.path().to_path_buf()]);

    assert_eq!(roomy, spilled);
}

#[test]
fn test_thread_count_does_not_change_report() {
    let dir = tempdir().unwrap();
    for i in 0..40 {
        write_file(dir.path(), &format!("f{i:02}"), format!("group {}", i % 5).as_bytes());
    }
    let work = tempdir().unwrap();

    let single = DuplicateFinder::new(config(&work).with_io_threads(1));
    let many = DuplicateFinder::new(config(&work).with_io_threads(8));

    assert_eq!(
        report(&single, &[dir.path().to_path_buf()]),
        report(&many, &[dir.path().to_path_buf()])
    );
}

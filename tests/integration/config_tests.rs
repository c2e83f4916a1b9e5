use super::common::write_file;
use clap::Parser;
use dupsort::cli::Cli;
use dupsort::config::{
    Bootstrap, ConfigError, ConfigPaths, Settings, EXCLUDES_FILE, SETTINGS_FILE,
};
use dupsort::error::ExitCode;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["dupsort", "-q"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_first_run_installs_exclusions_without_scanning() {
    let home = tempdir().unwrap();
    let config_dir = home.path().join("dupsort");
    let data = tempdir().unwrap();
    write_file(data.path(), "a", b"dup");
    write_file(data.path(), "b", b"dup");
    let report = home.path().join("report.txt");

    let code = dupsort::run_app(cli(&[
        "--config-dir",
        path_arg(&config_dir),
        "-o",
        path_arg(&report),
        path_arg(data.path()),
    ]))
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(config_dir.join(EXCLUDES_FILE).is_file());
    assert!(!report.exists());
}

#[test]
fn test_second_run_writes_report() {
    let home = tempdir().unwrap();
    let config_dir = home.path().join("dupsort");
    let data = tempdir().unwrap();
    write_file(data.path(), "a", b"dup");
    write_file(data.path(), "b", b"dup");
    let work = tempdir().unwrap();
    let report = home.path().join("report.txt");
    let args = [
        "--config-dir",
        path_arg(&config_dir),
        "--work-dir",
        path_arg(work.path()),
        "-o",
        path_arg(&report),
        path_arg(data.path()),
    ];

    dupsort::run_app(cli(&args)).unwrap();
    let code = dupsort::run_app(cli(&args)).unwrap();

    assert_eq!(code, ExitCode::Success);
    let text = fs::read_to_string(&report).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
}

#[test]
fn test_installed_exclusions_apply_to_scan() {
    let home = tempdir().unwrap();
    let config_dir = home.path().join("dupsort");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join(EXCLUDES_FILE), "# skip caches\n/cache/\n").unwrap();
    let data = tempdir().unwrap();
    write_file(data.path(), "a", b"dup");
    write_file(data.path(), "cache/b", b"dup");
    let report = home.path().join("report.txt");

    dupsort::run_app(cli(&[
        "--config-dir",
        path_arg(&config_dir),
        "-o",
        path_arg(&report),
        path_arg(data.path()),
    ]))
    .unwrap();

    assert!(fs::read_to_string(&report).unwrap().is_empty());
}

#[test]
fn test_missing_root_leaves_existing_report_untouched() {
    let home = tempdir().unwrap();
    let config_dir = home.path().join("dupsort");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join(EXCLUDES_FILE), "/cache/\n").unwrap();
    let report = home.path().join("report.txt");
    fs::write(&report, "previous report\n").unwrap();
    let missing = home.path().join("gone");

    let err = dupsort::run_app(cli(&[
        "--config-dir",
        path_arg(&config_dir),
        "-o",
        path_arg(&report),
        path_arg(&missing),
    ]))
    .unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
    assert_eq!(fs::read_to_string(&report).unwrap(), "previous report\n");
}

#[test]
fn test_missing_root_does_not_create_report() {
    let home = tempdir().unwrap();
    let config_dir = home.path().join("dupsort");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join(EXCLUDES_FILE), "/cache/\n").unwrap();
    let report = home.path().join("report.txt");

    let result = dupsort::run_app(cli(&[
        "--config-dir",
        path_arg(&config_dir),
        "-o",
        path_arg(&report),
        path_arg(&home.path().join("gone")),
    ]));

    assert!(result.is_err());
    assert!(!report.exists());
}

#[test]
fn test_existing_dir_without_exclusions_is_an_error() {
    let home = tempdir().unwrap();
    let data = tempdir().unwrap();

    let err = dupsort::run_app(cli(&[
        "--config-dir",
        path_arg(home.path()),
        path_arg(data.path()),
    ]))
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::MissingExclusions(_))
    ));
    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
}

#[test]
fn test_bootstrap_prefers_share_template() {
    let home = tempdir().unwrap();
    let share = tempdir().unwrap();
    fs::write(share.path().join(EXCLUDES_FILE), "/from-share/\n").unwrap();
    let paths = ConfigPaths::resolve(Some(home.path().join("cfg"))).unwrap();

    let outcome = paths
        .bootstrap_from(&[home.path().join("missing"), share.path().to_path_buf()])
        .unwrap();

    assert_eq!(outcome, Bootstrap::Installed(paths.excludes_path()));
    assert_eq!(
        fs::read_to_string(paths.excludes_path()).unwrap(),
        "/from-share/\n"
    );
    assert_eq!(paths.bootstrap_from(&[]).unwrap(), Bootstrap::Ready);
}

#[test]
fn test_settings_file_then_cli_override() {
    let home = tempdir().unwrap();
    fs::write(
        home.path().join(SETTINGS_FILE),
        "io_threads = 2\nsort_buffer_bytes = 4096\nkeep_workfiles = true\n",
    )
    .unwrap();

    let settings = Settings::load(home.path()).unwrap();
    assert_eq!(settings.io_threads, 2);
    assert_eq!(settings.sort_buffer_bytes, 4096);
    assert!(settings.keep_workfiles);

    let merged = cli(&["--io-threads", "6", "--sort-buffer", "1MiB", "/data"]).apply_to(settings);
    assert_eq!(merged.io_threads, 6);
    assert_eq!(merged.sort_buffer_bytes, 1024 * 1024);
    assert!(merged.keep_workfiles);
}

#[test]
fn test_invalid_settings_file_is_an_error() {
    let home = tempdir().unwrap();
    fs::write(home.path().join(SETTINGS_FILE), "io_threads = \"many\"\n").unwrap();

    assert!(matches!(
        Settings::load(home.path()),
        Err(ConfigError::Settings(_))
    ));
}

#[test]
fn test_cli_rejects_zero_threads_and_buffer() {
    assert!(Cli::try_parse_from(["dupsort", "--io-threads", "0", "/data"]).is_err());
    assert!(Cli::try_parse_from(["dupsort", "--sort-buffer", "0", "/data"]).is_err());
    assert!(Cli::try_parse_from(["dupsort"]).is_err());
    assert!(Cli::try_parse_from(["dupsort", "-q", "-v", "/data"]).is_err());
}

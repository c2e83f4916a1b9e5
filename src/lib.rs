//! dupsort - out-of-core duplicate file finder
//!
//! Finds files with identical content across one or more directory trees.
//! Every stage streams fixed-width text records through files in a private
//! work area, ordered by an external merge sort, so memory use stays bounded
//! however many files are scanned. The final report lists one duplicate per
//! line, grouped by MD5 digest, for downstream tools to act on.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod records;
pub mod scanner;
pub mod signal;
pub mod staging;

use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::Cli;
use crate::config::{Bootstrap, ConfigPaths};
use crate::duplicates::{DuplicateFinder, FinderConfig, ScanSummary};
use crate::error::ExitCode;
use crate::progress::{Progress, ProgressCallback};
use crate::scanner::WalkerConfig;

/// Run the application for parsed command-line arguments.
///
/// # Errors
///
/// Returns an error for any fatal condition: bad roots, unusable
/// configuration, staging or sort failures, or interruption.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let paths = ConfigPaths::resolve(cli.config_dir.clone())?;
    if let Bootstrap::Installed(path) = paths.bootstrap()? {
        eprintln!(
            "Installed the default exclusion list at {}.\n\
             Review it, then run dupsort again.",
            path.display()
        );
        return Ok(ExitCode::Success);
    }

    let exclusions = paths.load_exclusions()?;
    let settings = cli.apply_to(paths.load_settings()?);
    let handler = signal::install_handler()?;
    let progress: Arc<dyn ProgressCallback> =
        Arc::new(Progress::new(cli.quiet).with_verbosity(cli.verbose));

    let config = FinderConfig::default()
        .with_walker_config(WalkerConfig::new(exclusions, cli.ignore_patterns.clone()))
        .with_io_threads(settings.io_threads)
        .with_sort_buffer_bytes(settings.sort_buffer_bytes)
        .with_work_dir(settings.work_dir)
        .with_keep_workfiles(settings.keep_workfiles)
        .with_force_cross_device(cli.cross_device)
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(progress);
    let finder = DuplicateFinder::new(config);

    // Bad roots must fail before an existing report is truncated.
    let roots = scanner::normalize_roots(&cli.dirs).context("Duplicate scan failed")?;
    let summary = match cli.output {
        Some(ref path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot create report file {}", path.display()))?;
            finder.run(&roots, file)
        }
        None => finder.run(&roots, std::io::stdout().lock()),
    }
    .context("Duplicate scan failed")?;

    report_side_files(&summary)?;
    Ok(ExitCode::Success)
}

/// Tell the user about files left behind for review.
fn report_side_files(summary: &ScanSummary) -> Result<()> {
    let mut stderr = std::io::stderr().lock();
    if let Some(ref path) = summary.diagnostics_path {
        writeln!(
            stderr,
            "{} file pair(s) changed size while being compared and were skipped; see {}",
            summary.compare_errors,
            path.display()
        )?;
    }
    if let Some(ref dir) = summary.kept_work_dir {
        writeln!(stderr, "Work files kept in {}", dir.display())?;
    }
    Ok(())
}

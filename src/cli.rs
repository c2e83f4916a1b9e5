//! Command-line interface definitions for dupsort.
//!
//! # Example
//!
//! ```bash
//! # Report duplicates under two trees
//! dupsort ~/Pictures /mnt/backup/Pictures
//!
//! # Write the report to a file and keep work files for inspection
//! dupsort -d -o dups.txt ~/data
//!
//! # Trace-level logging with a smaller sort buffer
//! dupsort -vv --sort-buffer 16MiB ~/data
//! ```

use std::path::PathBuf;

use bytesize::ByteSize;
use clap::Parser;

use crate::config::Settings;

/// Find duplicate files by content across one or more directory trees.
///
/// Candidates are staged on disk and ordered with an external sort, so trees
/// far larger than memory can be scanned. The report lists one duplicate per
/// line, grouped by content hash.
#[derive(Debug, Parser)]
#[command(name = "dupsort")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directories to scan
    #[arg(value_name = "DIR", required = true)]
    pub dirs: Vec<PathBuf>,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Keep the staged work files and log where they are
    #[arg(short, long)]
    pub debug: bool,

    /// Write the report to FILE instead of standard output
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Glob patterns to ignore (can be specified multiple times)
    ///
    /// Applied in addition to the substring exclusion list.
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Hash every size-sharing file, ignoring inode numbers
    ///
    /// Chosen automatically when the files span more than one device.
    #[arg(long)]
    pub cross_device: bool,

    /// Number of I/O threads for comparing and hashing [default: 4]
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub io_threads: Option<u16>,

    /// Memory used by each sort pass, e.g. 64MiB [default: 64MiB]
    #[arg(long, value_name = "SIZE", value_parser = parse_buffer_size)]
    pub sort_buffer: Option<u64>,

    /// Directory for work files [default: system temp dir]
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Configuration directory [default: ~/.config/dupsort]
    #[arg(long, value_name = "DIR", env = "DUPSORT_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Print fatal errors as JSON
    #[arg(long)]
    pub json_errors: bool,
}

impl Cli {
    /// Layer the flags given on the command line over `settings`.
    #[must_use]
    pub fn apply_to(&self, mut settings: Settings) -> Settings {
        if let Some(threads) = self.io_threads {
            settings.io_threads = usize::from(threads);
        }
        if let Some(bytes) = self.sort_buffer {
            settings.sort_buffer_bytes = usize::try_from(bytes).unwrap_or(usize::MAX);
        }
        if let Some(ref dir) = self.work_dir {
            settings.work_dir = Some(dir.clone());
        }
        if self.debug {
            settings.keep_workfiles = true;
        }
        settings
    }
}

/// Parse a human-readable buffer size such as `64MiB` or `500MB`.
///
/// # Errors
///
/// Returns an error for an unparsable or zero size.
pub fn parse_buffer_size(s: &str) -> Result<u64, String> {
    let size: ByteSize = s.trim().parse()?;
    match size.as_u64() {
        0 => Err("Sort buffer cannot be zero".to_string()),
        bytes => Ok(bytes),
    }
}

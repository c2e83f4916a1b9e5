//! Final report writing and parsing.
//!
//! The report is the stream of hash records left once cluster labels are
//! stripped: one line per duplicate file, members of a cluster on
//! consecutive lines. Downstream tools parse it with [`report::GroupReader`].
//!
//! # Example
//!
//! ```no_run
//! use dupsort::duplicates::DuplicateFinder;
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let summary = finder
//!     .run(&[PathBuf::from(".")], std::io::stdout().lock())
//!     .unwrap();
//! eprintln!("{} duplicate group(s)", summary.duplicate_groups);
//! ```

pub mod report;

pub use report::{format_report, read_groups, GroupReader, ReportStats};

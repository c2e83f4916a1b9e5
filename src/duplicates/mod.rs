//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size grouping of the sorted size records
//! - Content screening (bounded compare and MD5 hashing)
//! - Clustering of sorted hash records
//! - Pipeline orchestration

pub mod cluster;
pub mod finder;
pub mod groups;
pub mod screen;

pub use cluster::{cluster_records, ClusterStats};
pub use finder::{DuplicateFinder, FinderConfig, FinderError, ScanSummary};
pub use groups::{DuplicateGroup, GroupingStats, SizeGrouper, SizeMember};
pub use screen::{ScreenConfig, ScreenError, ScreenMode, ScreenStats, Screener};

//! Scanner module for directory traversal and file hashing.
//!
//! This module provides functionality for:
//! - Directory walking with substring and glob exclusions
//! - File identity (device, inode) and device-span tracking
//! - MD5 content hashing and bounded prefix comparison
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and candidate classification
//! - [`exclude`]: Substring exclusion list
//! - [`device`]: File identity and cross-device detection
//! - [`hasher`]: MD5 file hashing (streaming)
//!
//! # Example
//!
//! ```no_run
//! use dupsort::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default());
//! let mut walk = walker.walk();
//! for entry in &mut walk {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! println!("{} candidates", walk.stats().candidates);
//! ```

pub mod device;
pub mod exclude;
pub mod hasher;
pub mod walker;

use std::io;
use std::path::{Path, PathBuf};

use crate::records::{FileKind, SizeRecord};

// Re-export main types
pub use device::{DeviceSet, FileId};
pub use exclude::{ExcludeError, ExclusionList};
pub use hasher::{hash_to_hex, hex_to_hash, Hash, Hasher, PrefixComparison, COMPARE_SIZE};
pub use walker::{normalize_roots, Walk, WalkStats, Walker};

/// A candidate file discovered during traversal.
///
/// For symlinks, `size` and `id` describe the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path as reached from the scan root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Device and inode of the file data
    pub id: FileId,
    /// Regular file or symlink to one
    pub kind: FileKind,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, id: FileId, kind: FileKind) -> Self {
        Self {
            path,
            size,
            id,
            kind,
        }
    }

    /// Whether this entry is a symlink.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    /// Convert into the record staged for size sorting.
    #[must_use]
    pub fn into_size_record(self) -> SizeRecord {
        SizeRecord {
            size: self.size,
            id: self.id,
            path: self.path,
            kind: self.kind,
        }
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Substring exclusions from `excludes.conf`.
    pub exclusions: ExclusionList,

    /// Glob patterns to ignore (gitignore-style), relative to each root.
    pub ignore_patterns: Vec<String>,
}

impl WalkerConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(exclusions: ExclusionList, ignore_patterns: Vec<String>) -> Self {
        Self {
            exclusions,
            ignore_patterns,
        }
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The directory entry has a type the scanner does not recognise.
    #[error("Unknown file type: {0}")]
    UnknownType(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error for a path.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Shutdown was requested while reading.
    #[error("Hashing interrupted")]
    Interrupted,

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl HashError {
    /// Classify an I/O error for a path.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

//! File identity and device-span tracking.
//!
//! # Overview
//!
//! Every candidate carries a [`FileId`], the `(device, inode)` pair of the
//! data it names. Two entries with the same id on the same device are hard
//! links to one file; they share content but are not duplicates of each other.
//! For a symlink the id is that of its target, so a link and the file it
//! points at also collapse to a single identity.
//!
//! Inode numbers are only comparable within a device. [`DeviceSet`] collects
//! the device ids seen during a run so the screener can decide whether the
//! hard-link shortcut is safe to use.
//!
//! # Platform Support
//!
//! - **Unix**: `(st_dev, st_ino)` from file metadata
//! - **Other**: ids are always zero and the run behaves as single-device
//!
//! # Example
//!
//! ```
//! use dupsort::scanner::device::{DeviceSet, FileId};
//!
//! let mut devices = DeviceSet::new();
//! devices.insert(FileId::new(1, 10).device);
//! devices.insert(FileId::new(1, 11).device);
//! assert!(!devices.spans_multiple());
//!
//! devices.insert(FileId::new(2, 10).device);
//! assert!(devices.spans_multiple());
//! ```

use std::collections::BTreeSet;
use std::fs::Metadata;

/// Identity of the data behind a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FileId {
    /// Device id holding the file
    pub device: u64,
    /// Inode number on that device
    pub inode: u64,
}

impl FileId {
    /// Create an id from raw device and inode numbers.
    #[must_use]
    pub const fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }

    /// Read the id from file metadata.
    ///
    /// Pass `std::fs::metadata` (not `symlink_metadata`) to get the id of a
    /// symlink's target.
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    #[must_use]
    pub fn from_metadata(_metadata: &Metadata) -> Self {
        Self::default()
    }

    /// Whether two ids name the same underlying file.
    ///
    /// Only meaningful when both ids come from the same device, which is the
    /// case in same-device screening.
    #[must_use]
    pub fn is_alias_of(&self, other: &FileId) -> bool {
        self == other
    }

    /// Whether identity detection works on this platform.
    #[must_use]
    pub const fn is_supported() -> bool {
        cfg!(unix)
    }
}

/// Set of device ids observed during a run.
#[derive(Debug, Clone, Default)]
pub struct DeviceSet {
    devices: BTreeSet<u64>,
}

impl DeviceSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a device id. Returns `true` if it was not seen before.
    pub fn insert(&mut self, device: u64) -> bool {
        self.devices.insert(device)
    }

    /// Record the device of a metadata entry.
    pub fn insert_metadata(&mut self, metadata: &Metadata) -> bool {
        self.insert(FileId::from_metadata(metadata).device)
    }

    /// Merge another set into this one.
    pub fn extend(&mut self, other: &DeviceSet) {
        self.devices.extend(other.devices.iter().copied());
    }

    /// Number of distinct devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Whether more than one device was seen.
    #[must_use]
    pub fn spans_multiple(&self) -> bool {
        self.devices.len() > 1
    }

    /// Device ids in ascending order (test-only accessor).
    #[cfg(test)]
    fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.devices.iter().copied()
    }
}

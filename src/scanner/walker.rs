//! Directory walker built on walkdir.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for traversing a directory tree
//! and producing the candidates the duplicate pipeline works on. Traversal is
//! single-threaded and depth-first with entries sorted by file name, so a
//! walk over an unchanged tree always yields the same sequence.
//!
//! Each entry is classified once and then run through a single filter:
//!
//! | Entry type | Outcome |
//! |---|---|
//! | directory | descend, unless excluded |
//! | regular file | candidate if non-empty and not excluded |
//! | symlink to regular file | candidate (target size and identity) |
//! | symlink to anything else | ignored |
//! | block, char, fifo, socket | ignored |
//! | unknown | reported as [`ScanError::UnknownType`], walk continues |
//!
//! Errors are yielded as values and never end the walk early. The
//! [`Walk`] iterator keeps run-scoped counters in [`WalkStats`] and the set
//! of devices seen, which decides between same-device and cross-device
//! screening.
//!
//! # Example
//!
//! ```no_run
//! use dupsort::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), WalkerConfig::default());
//! let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("Found {} candidates", files.len());
//! ```

use std::fs::{FileType, Metadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use walkdir::WalkDir;

use super::device::{DeviceSet, FileId};
use super::{FileEntry, ScanError, WalkerConfig};
use crate::records::{is_encodable, FileKind};

/// Counters collected while walking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Directory entries visited (including directories)
    pub entries: u64,
    /// Directories descended into
    pub directories: u64,
    /// Candidates yielded
    pub candidates: u64,
    /// Total size of all candidates
    pub candidate_bytes: u64,
    /// Symlinks among the candidates
    pub symlinks: u64,
    /// Zero-length files skipped
    pub zero_length: u64,
    /// Entries skipped by exclusions or ignore patterns
    pub excluded: u64,
    /// Devices, fifos, sockets, and symlinks to non-regular targets
    pub special: u64,
    /// Paths that cannot be written into a record
    pub unencodable: u64,
    /// Entries of unknown type
    pub unknown: u64,
    /// Entries that could not be read
    pub errors: u64,
}

impl WalkStats {
    /// Add another walk's counters to this one.
    pub fn merge(&mut self, other: &WalkStats) {
        self.entries += other.entries;
        self.directories += other.directories;
        self.candidates += other.candidates;
        self.candidate_bytes += other.candidate_bytes;
        self.symlinks += other.symlinks;
        self.zero_length += other.zero_length;
        self.excluded += other.excluded;
        self.special += other.special;
        self.unencodable += other.unencodable;
        self.unknown += other.unknown;
        self.errors += other.errors;
    }
}

/// Directory walker for a single root.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, the walk stops at the next entry.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Build the gitignore matcher from the configured patterns.
    fn build_gitignore(&self) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if !gitignore.is_empty() => Some(gitignore),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    /// Start walking the tree.
    ///
    /// Returns a [`Walk`] iterator over candidates. Errors are yielded as
    /// [`ScanError`] values rather than stopping iteration.
    pub fn walk(&self) -> Walk<'_> {
        let mut devices = DeviceSet::new();
        if let Ok(meta) = std::fs::metadata(&self.root) {
            devices.insert_metadata(&meta);
        }

        Walk {
            walker: self,
            inner: WalkDir::new(&self.root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter(),
            gitignore: self.build_gitignore(),
            stats: WalkStats::default(),
            devices,
        }
    }
}

/// Iterator over the candidates of one root.
pub struct Walk<'a> {
    walker: &'a Walker,
    inner: walkdir::IntoIter,
    gitignore: Option<Gitignore>,
    stats: WalkStats,
    devices: DeviceSet,
}

/// What a directory entry turned out to be.
enum Classified {
    Directory,
    Regular,
    Symlink,
    Special,
    Unknown,
}

impl Walk<'_> {
    /// Counters collected so far.
    #[must_use]
    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }

    /// Devices seen so far (the root's and every candidate's).
    #[must_use]
    pub fn devices(&self) -> &DeviceSet {
        &self.devices
    }

    fn is_shutdown_requested(&self) -> bool {
        self.walker
            .shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if self.walker.config.exclusions.is_excluded(path) {
            return true;
        }
        match &self.gitignore {
            Some(gi) => {
                let relative = path.strip_prefix(&self.walker.root).unwrap_or(path);
                gi.matched(relative, is_dir).is_ignore()
            }
            None => false,
        }
    }

    fn process(&mut self, entry: walkdir::DirEntry) -> Option<Result<FileEntry, ScanError>> {
        let path = entry.path();
        self.stats.entries += 1;

        match classify(entry.file_type()) {
            Classified::Directory => {
                if entry.depth() > 0 && self.is_excluded(path, true) {
                    log::trace!("Excluding directory: {}", path.display());
                    self.stats.excluded += 1;
                    self.inner.skip_current_dir();
                } else {
                    self.stats.directories += 1;
                }
                None
            }
            Classified::Special => {
                log::trace!("Skipping special file: {}", path.display());
                self.stats.special += 1;
                None
            }
            Classified::Unknown => {
                log::warn!("Unknown file type: {}", path.display());
                self.stats.unknown += 1;
                Some(Err(ScanError::UnknownType(path.to_path_buf())))
            }
            Classified::Regular => match entry.metadata() {
                Ok(meta) => self.accept(entry.into_path(), &meta, FileKind::Regular),
                Err(e) => Some(Err(self.walk_error(e))),
            },
            Classified::Symlink => match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => {
                    self.accept(entry.into_path(), &meta, FileKind::Symlink)
                }
                Ok(_) => {
                    log::trace!("Skipping symlink to non-regular file: {}", path.display());
                    self.stats.special += 1;
                    None
                }
                Err(e) => {
                    log::debug!("Skipping dangling symlink {}: {}", path.display(), e);
                    self.stats.errors += 1;
                    None
                }
            },
        }
    }

    /// The shared "is this wanted?" check for regular files and symlinks.
    fn accept(
        &mut self,
        path: PathBuf,
        meta: &Metadata,
        kind: FileKind,
    ) -> Option<Result<FileEntry, ScanError>> {
        let size = meta.len();
        if size == 0 {
            log::trace!("Skipping empty file: {}", path.display());
            self.stats.zero_length += 1;
            return None;
        }

        if self.is_excluded(&path, false) {
            log::trace!("Excluding file: {}", path.display());
            self.stats.excluded += 1;
            return None;
        }

        if !is_encodable(&path) {
            log::warn!(
                "Skipping path containing a reserved sequence: {}",
                path.display()
            );
            self.stats.unencodable += 1;
            return None;
        }

        let id = FileId::from_metadata(meta);
        self.devices.insert(id.device);
        self.stats.candidates += 1;
        self.stats.candidate_bytes += size;
        if kind == FileKind::Symlink {
            self.stats.symlinks += 1;
        }

        Some(Ok(FileEntry::new(path, size, id, kind)))
    }

    fn walk_error(&mut self, error: walkdir::Error) -> ScanError {
        self.stats.errors += 1;
        let path = error
            .path()
            .map_or_else(|| self.walker.root.clone(), Path::to_path_buf);

        match error.into_io_error() {
            Some(io) => {
                let err = ScanError::from_io(&path, io);
                match &err {
                    ScanError::NotFound(_) => {
                        log::debug!("Entry vanished during scan: {}", path.display());
                    }
                    _ => log::warn!("{}", err),
                }
                err
            }
            None => {
                log::warn!("Filesystem loop at {}", path.display());
                ScanError::Io {
                    path,
                    source: std::io::Error::other("filesystem loop"),
                }
            }
        }
    }
}

impl Iterator for Walk<'_> {
    type Item = Result<FileEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            let item = match self.inner.next()? {
                Ok(entry) => self.process(entry),
                Err(e) => Some(Err(self.walk_error(e))),
            };
            if item.is_some() {
                return item;
            }
        }
    }
}

fn classify(file_type: FileType) -> Classified {
    if file_type.is_dir() {
        return Classified::Directory;
    }
    if file_type.is_file() {
        return Classified::Regular;
    }
    if file_type.is_symlink() {
        return Classified::Symlink;
    }
    if is_special(file_type) {
        Classified::Special
    } else {
        Classified::Unknown
    }
}

#[cfg(unix)]
fn is_special(file_type: FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    file_type.is_block_device()
        || file_type.is_char_device()
        || file_type.is_fifo()
        || file_type.is_socket()
}

#[cfg(not(unix))]
fn is_special(_file_type: FileType) -> bool {
    false
}

/// Validate the scan roots and drop any nested inside another.
///
/// Roots keep the spelling they were given; overlap is decided on their
/// canonical forms. Order of first appearance is preserved.
///
/// # Errors
///
/// Returns [`ScanError::NotFound`] or [`ScanError::NotADirectory`] for the
/// first root that does not exist or is not a directory.
pub fn normalize_roots(paths: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
    let mut resolved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(paths.len());

    for path in paths {
        let meta = std::fs::metadata(path).map_err(|e| ScanError::from_io(path, e))?;
        if !meta.is_dir() {
            return Err(ScanError::NotADirectory(path.clone()));
        }
        let canonical = path
            .canonicalize()
            .map_err(|e| ScanError::from_io(path, e))?;
        resolved.push((path.clone(), canonical));
    }

    let mut roots = Vec::with_capacity(resolved.len());
    for (i, (path, canonical)) in resolved.iter().enumerate() {
        let covered = resolved.iter().enumerate().any(|(j, (_, other))| {
            j != i && canonical.starts_with(other) && (canonical != other || j < i)
        });
        if covered {
            log::info!("Skipping {}: already covered by another root", path.display());
        } else {
            roots.push(path.clone());
        }
    }

    Ok(roots)
}

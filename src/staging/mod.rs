//! Per-invocation work area for staged records.
//!
//! # Overview
//!
//! Each run gets its own directory, created with a unique `dupsort-` prefix
//! under the configured base (the system temp dir by default), so concurrent
//! runs never share files. Every stage writes one [`StageFile`] into it and
//! the next stage reads it back. The directory is removed when the
//! [`Workspace`] is dropped, on success and on failure alike, unless it was
//! created with `keep` set for debugging.
//!
//! Comparison diagnostics live outside the work area in a [`Diagnostics`]
//! file that survives the run only if something was written to it.

pub mod sort;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};

pub use sort::{ExternalSorter, SortConfig, SortError, SortStats};

/// Errors raised while managing staged files.
#[derive(thiserror::Error, Debug)]
pub enum StagingError {
    /// The work area or a staged file could not be created or opened.
    #[error("Cannot use staging path {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl StagingError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The files a run stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFile {
    /// Size records as found by the scanner
    Sizes,
    /// Size records sorted by size
    SortedSizes,
    /// Hash records from the screener
    Hashes,
    /// Hash records sorted and unique
    SortedHashes,
    /// Cluster-labelled records
    Clusters,
    /// Cluster records sorted by label
    SortedClusters,
}

impl StageFile {
    /// File name inside the work area.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Sizes => "00-sizes",
            Self::SortedSizes => "01-sizes.sorted",
            Self::Hashes => "02-hashes",
            Self::SortedHashes => "03-hashes.sorted",
            Self::Clusters => "04-clusters",
            Self::SortedClusters => "05-clusters.sorted",
        }
    }
}

/// A run's private staging directory.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    keep: bool,
}

impl Workspace {
    /// Create a fresh work area under `base`, or the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError`] if the directory cannot be created.
    pub fn create(base: Option<&Path>, keep: bool) -> Result<Self, StagingError> {
        let base = base.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let dir = tempfile::Builder::new()
            .prefix("dupsort-")
            .disable_cleanup(keep)
            .tempdir_in(&base)
            .map_err(StagingError::io(&base))?;

        log::debug!("Work area: {}", dir.path().display());
        Ok(Self { dir, keep })
    }

    /// Directory holding the staged files.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Full path of a staged file.
    #[must_use]
    pub fn stage_path(&self, stage: StageFile) -> PathBuf {
        self.dir.path().join(stage.file_name())
    }

    /// Create (truncate) a staged file for writing.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError`] if the file cannot be created.
    pub fn create_stage(&self, stage: StageFile) -> Result<BufWriter<File>, StagingError> {
        let path = self.stage_path(stage);
        let file = File::create(&path).map_err(StagingError::io(&path))?;
        Ok(BufWriter::new(file))
    }

    /// Open a staged file for reading.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError`] if the file cannot be opened.
    pub fn open_stage(&self, stage: StageFile) -> Result<BufReader<File>, StagingError> {
        let path = self.stage_path(stage);
        let file = File::open(&path).map_err(StagingError::io(&path))?;
        Ok(BufReader::new(file))
    }

    /// Discard a consumed stage unless the work area is being kept.
    pub fn discard_stage(&self, stage: StageFile) {
        if self.keep {
            return;
        }
        let path = self.stage_path(stage);
        if let Err(e) = std::fs::remove_file(&path) {
            log::debug!("Failed to remove {}: {}", path.display(), e);
        }
    }

    /// Close the work area. Returns its path if it was kept.
    #[must_use]
    pub fn finish(self) -> Option<PathBuf> {
        let path = self.dir.path().to_path_buf();
        if self.keep {
            log::info!("Keeping work files in {}", path.display());
            Some(path)
        } else {
            drop(self.dir);
            None
        }
    }
}

/// Side file collecting comparison errors for the user to review.
#[derive(Debug)]
pub struct Diagnostics {
    file: NamedTempFile,
    entries: u64,
}

impl Diagnostics {
    /// Create the diagnostics file in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError`] if the file cannot be created.
    pub fn create(dir: &Path) -> Result<Self, StagingError> {
        let file = tempfile::Builder::new()
            .prefix("dupsort-compare-errors-")
            .suffix(".txt")
            .tempfile_in(dir)
            .map_err(StagingError::io(dir))?;
        Ok(Self { file, entries: 0 })
    }

    /// Append one entry.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError`] if the write fails.
    pub fn record(&mut self, message: &str) -> Result<(), StagingError> {
        let path = self.file.path().to_path_buf();
        writeln!(self.file, "{}", message).map_err(StagingError::io(&path))?;
        self.entries += 1;
        Ok(())
    }

    /// Number of entries recorded.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.entries
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Path of the diagnostics file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Keep the file if it has entries, otherwise delete it.
    ///
    /// Returns the kept path.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError`] if a non-empty file cannot be persisted.
    pub fn finish(mut self) -> Result<Option<PathBuf>, StagingError> {
        if self.entries == 0 {
            return Ok(None);
        }
        let path = self.file.path().to_path_buf();
        self.file.flush().map_err(StagingError::io(&path))?;
        let (_, kept) = self
            .file
            .keep()
            .map_err(|e| StagingError::io(&path)(e.error))?;
        Ok(Some(kept))
    }
}

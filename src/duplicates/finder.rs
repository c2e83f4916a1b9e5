//! Pipeline orchestration.
//!
//! # Overview
//!
//! [`DuplicateFinder`] runs every stage in order, each reading the previous
//! stage's file from the per-run [`Workspace`]:
//!
//! 1. **Scan** - walk each root and stage one size record per candidate
//! 2. **Sort** - order size records by size
//! 3. **Screen** - drop unique sizes, compare and hash the rest
//! 4. **Sort + unique** - order hash records, collapse repeats
//! 5. **Cluster** - label each run of equal hash with its first path
//! 6. **Sort** - bring cluster members together, ordered by label
//! 7. **Format** - strip labels and stream the report to the caller
//!
//! No stage holds more than a bounded amount of data in memory.
//!
//! # Example
//!
//! ```no_run
//! use dupsort::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::PathBuf;
//!
//! let config = FinderConfig::default().with_io_threads(4);
//! let finder = DuplicateFinder::new(config);
//!
//! let summary = finder
//!     .run(&[PathBuf::from("/some/path")], std::io::stdout().lock())
//!     .unwrap();
//!
//! eprintln!("Found {} duplicate groups", summary.duplicate_groups);
//! eprintln!("Reclaimable space: {}", summary.reclaimable_display());
//! ```

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;

use super::cluster::cluster_records;
use super::groups::{DuplicateGroup, SizeGrouper};
use super::screen::{ScreenConfig, ScreenError, ScreenMode, Screener, DEFAULT_IO_THREADS};
use crate::output::{format_report, read_groups};
use crate::progress::{ProgressCallback, PHASE_SCAN, PHASE_SCREEN};
use crate::records::{HashRecord, RecordError, RecordReader, RecordWriter, SizeRecord};
use crate::scanner::{
    normalize_roots, DeviceSet, ScanError, WalkStats, Walker, WalkerConfig, COMPARE_SIZE,
};
use crate::staging::sort::DEFAULT_SORT_BUFFER;
use crate::staging::{
    Diagnostics, ExternalSorter, SortConfig, SortError, StageFile, StagingError, Workspace,
};

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Walker configuration for directory traversal.
    pub walker_config: WalkerConfig,
    /// Number of I/O threads for comparing and hashing.
    /// Default is 4 to prevent disk thrashing.
    pub io_threads: usize,
    /// Memory bound for each external sort, in bytes.
    pub sort_buffer_bytes: usize,
    /// Bytes read from each file of a pair by the bounded compare.
    pub compare_size: usize,
    /// Base directory for the work area (system temp dir if unset).
    pub work_dir: Option<PathBuf>,
    /// Keep staged files after the run.
    pub keep_workfiles: bool,
    /// Use cross-device screening even if all files share a device.
    pub force_cross_device: bool,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("walker_config", &self.walker_config)
            .field("io_threads", &self.io_threads)
            .field("sort_buffer_bytes", &self.sort_buffer_bytes)
            .field("compare_size", &self.compare_size)
            .field("work_dir", &self.work_dir)
            .field("keep_workfiles", &self.keep_workfiles)
            .field("force_cross_device", &self.force_cross_device)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            walker_config: WalkerConfig::default(),
            io_threads: DEFAULT_IO_THREADS,
            sort_buffer_bytes: DEFAULT_SORT_BUFFER,
            compare_size: COMPARE_SIZE,
            work_dir: None,
            keep_workfiles: false,
            force_cross_device: false,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FinderConfig {
    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set the I/O thread count.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the per-sort memory bound.
    #[must_use]
    pub fn with_sort_buffer_bytes(mut self, bytes: usize) -> Self {
        self.sort_buffer_bytes = bytes.max(1);
        self
    }

    /// Set the bounded compare length.
    #[must_use]
    pub fn with_compare_size(mut self, bytes: usize) -> Self {
        self.compare_size = bytes.max(1);
        self
    }

    /// Set the base directory for the work area.
    #[must_use]
    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    /// Keep staged files for debugging.
    #[must_use]
    pub fn with_keep_workfiles(mut self, keep: bool) -> Self {
        self.keep_workfiles = keep;
        self
    }

    /// Force cross-device screening.
    #[must_use]
    pub fn with_force_cross_device(mut self, force: bool) -> Self {
        self.force_cross_device = force;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn sort_config(&self) -> SortConfig {
        SortConfig::default().with_buffer_bytes(self.sort_buffer_bytes)
    }
}

/// Summary statistics from a duplicate scan.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    /// Roots actually walked, after dropping nested ones
    pub roots: Vec<PathBuf>,
    /// Candidate files found by the scanner
    pub total_files: u64,
    /// Total size of all candidates in bytes
    pub total_size: u64,
    /// Zero-length files skipped
    pub skipped_zero_length: u64,
    /// Entries skipped by the exclusion list or ignore patterns
    pub skipped_excluded: u64,
    /// Devices, fifos, sockets and symlinks to non-files skipped
    pub skipped_special: u64,
    /// Paths that cannot be written into a record
    pub skipped_unencodable: u64,
    /// Entries of unknown type
    pub unknown_entries: u64,
    /// Entries that could not be read during the scan
    pub scan_errors: u64,
    /// Files sharing their size with another file
    pub size_group_members: u64,
    /// Files eliminated by size grouping (unique sizes)
    pub eliminated_by_size: u64,
    /// Hard-link aliases skipped without reading
    pub hard_links_skipped: u64,
    /// Files eliminated by the bounded compare or prefix screen
    pub eliminated_by_compare: u64,
    /// Files whose content was fully hashed
    pub files_hashed: u64,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Files that changed length while being compared
    pub compare_errors: u64,
    /// Files that could not be read while screening
    pub read_errors: u64,
    /// Number of confirmed duplicate groups
    pub duplicate_groups: u64,
    /// Total number of duplicate files (excluding originals)
    pub duplicate_files: u64,
    /// Total space that can be reclaimed by removing duplicates
    pub reclaimable_space: u64,
    /// Whether cross-device screening was used
    pub cross_device: bool,
    /// Comparison diagnostics kept for review
    pub diagnostics_path: Option<PathBuf>,
    /// Work area kept for debugging
    pub kept_work_dir: Option<PathBuf>,
    /// Duration of the entire scan
    pub scan_duration: Duration,
}

impl ScanSummary {
    /// Calculate the percentage of space that is wasted by duplicates.
    #[must_use]
    pub fn wasted_percentage(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.reclaimable_space as f64 / self.total_size as f64) * 100.0
        }
    }

    /// Format reclaimable space as human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_space).to_string()
    }

    /// Format total size as human-readable string.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        ByteSize::b(self.total_size).to_string()
    }

    /// Files skipped by the scanner for any reason.
    #[must_use]
    pub fn skipped_files(&self) -> u64 {
        self.skipped_zero_length
            + self.skipped_excluded
            + self.skipped_special
            + self.skipped_unencodable
            + self.scan_errors
    }

    fn apply_walk(&mut self, stats: &WalkStats) {
        self.total_files = stats.candidates;
        self.total_size = stats.candidate_bytes;
        self.skipped_zero_length = stats.zero_length;
        self.skipped_excluded = stats.excluded;
        self.skipped_special = stats.special;
        self.skipped_unencodable = stats.unencodable;
        self.unknown_entries = stats.unknown;
        self.scan_errors = stats.errors;
    }

    fn log(&self) {
        log::info!(
            "Scanned {} file(s) ({}), skipped {}",
            self.total_files,
            self.total_size_display(),
            self.skipped_files()
        );
        log::info!(
            "Screened {} size group member(s): {} hashed ({}), {} eliminated by compare",
            self.size_group_members,
            self.files_hashed,
            ByteSize::b(self.bytes_hashed),
            self.eliminated_by_compare
        );
        log::info!(
            "Found {} duplicate group(s), {} duplicate file(s), {} reclaimable ({:.1}%) in {:.2?}",
            self.duplicate_groups,
            self.duplicate_files,
            self.reclaimable_display(),
            self.wasted_percentage(),
            self.scan_duration
        );
    }
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The scan was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Scan interrupted by user")]
    Interrupted,

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A root could not be inspected.
    #[error(transparent)]
    Scan(ScanError),

    /// The work area or diagnostics file could not be used.
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// An external sort failed.
    #[error("Sort failed: {0}")]
    Sort(SortError),

    /// A staged record was malformed or could not be written.
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// Screening failed.
    #[error("Screening failed: {0}")]
    Screen(ScreenError),

    /// An I/O error occurred while writing the report.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An I/O error occurred on a staged file.
    #[error("I/O error for {path}: {source}")]
    IoWithPath {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl From<ScanError> for FinderError {
    fn from(error: ScanError) -> Self {
        match error {
            ScanError::NotFound(path) => Self::PathNotFound(path),
            ScanError::NotADirectory(path) => Self::NotADirectory(path),
            other => Self::Scan(other),
        }
    }
}

impl From<SortError> for FinderError {
    fn from(error: SortError) -> Self {
        match error {
            SortError::Interrupted => Self::Interrupted,
            other => Self::Sort(other),
        }
    }
}

impl From<ScreenError> for FinderError {
    fn from(error: ScreenError) -> Self {
        match error {
            ScreenError::Interrupted => Self::Interrupted,
            other => Self::Screen(other),
        }
    }
}

impl FinderError {
    fn stage_io(path: PathBuf) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::IoWithPath { path, source }
    }
}

/// Duplicate finder that orchestrates the staged detection pipeline.
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Create a new duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// The finder's configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    fn check_shutdown(&self) -> Result<(), FinderError> {
        if self.config.is_shutdown_requested() {
            log::info!("Shutdown requested, abandoning run");
            return Err(FinderError::Interrupted);
        }
        Ok(())
    }

    /// Run the whole pipeline over `roots` and write the report to `report`.
    ///
    /// # Errors
    ///
    /// Returns `FinderError` if:
    /// - A root does not exist or is not a directory
    /// - A staged file cannot be created, read or sorted
    /// - The report cannot be written
    /// - The run is interrupted by shutdown signal
    ///
    /// Unreadable entries and files are skipped and counted in the summary.
    pub fn run<W: Write>(&self, roots: &[PathBuf], report: W) -> Result<ScanSummary, FinderError> {
        let start_time = Instant::now();
        let mut summary = ScanSummary::default();
        self.check_shutdown()?;

        summary.roots = normalize_roots(roots)?;
        log::info!("Starting duplicate scan of {} root(s)", summary.roots.len());

        let workspace = Workspace::create(
            self.config.work_dir.as_deref(),
            self.config.keep_workfiles,
        )?;
        let diagnostics_dir = self
            .config
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let mut diagnostics = Diagnostics::create(&diagnostics_dir)?;

        let (devices, walk_stats) = self.scan(&summary.roots, &workspace)?;
        summary.apply_walk(&walk_stats);
        summary.cross_device = self.config.force_cross_device || devices.spans_multiple();
        if summary.cross_device {
            log::info!(
                "Files span {} device(s); using cross-device screening",
                devices.len()
            );
        }
        self.check_shutdown()?;

        let mut sorter = ExternalSorter::new(self.config.sort_config(), workspace.path());
        let mut unique_sorter =
            ExternalSorter::new(self.config.sort_config().with_unique(true), workspace.path());
        if let Some(ref flag) = self.config.shutdown_flag {
            sorter = sorter.with_shutdown_flag(Arc::clone(flag));
            unique_sorter = unique_sorter.with_shutdown_flag(Arc::clone(flag));
        }

        log::info!("Sorting size records...");
        sort_stage(
            &sorter,
            &workspace,
            StageFile::Sizes,
            StageFile::SortedSizes,
        )?;

        self.screen(&workspace, &mut diagnostics, &mut summary)?;
        self.check_shutdown()?;

        log::info!("Sorting hash records...");
        sort_stage(
            &unique_sorter,
            &workspace,
            StageFile::Hashes,
            StageFile::SortedHashes,
        )?;

        log::info!("Clustering...");
        let records =
            RecordReader::<_, HashRecord>::new(workspace.open_stage(StageFile::SortedHashes)?);
        let clusters_path = workspace.stage_path(StageFile::Clusters);
        let mut writer = RecordWriter::new(workspace.create_stage(StageFile::Clusters)?);
        let clustered = cluster_records(records, &mut writer)?;
        writer
            .finish()
            .map_err(FinderError::stage_io(clusters_path))?;
        workspace.discard_stage(StageFile::SortedHashes);
        summary.duplicate_groups = clustered.clusters;
        summary.duplicate_files = clustered.duplicate_files();
        summary.reclaimable_space = clustered.reclaimable_bytes;
        self.check_shutdown()?;

        log::info!("Ordering clusters...");
        sort_stage(
            &sorter,
            &workspace,
            StageFile::Clusters,
            StageFile::SortedClusters,
        )?;

        let mut out = RecordWriter::new(BufWriter::new(report));
        format_report(workspace.open_stage(StageFile::SortedClusters)?, &mut out)?;
        out.finish()?;
        workspace.discard_stage(StageFile::SortedClusters);

        summary.diagnostics_path = diagnostics.finish()?;
        if let Some(ref path) = summary.diagnostics_path {
            log::debug!("Kept comparison diagnostics in {}", path.display());
        }
        summary.kept_work_dir = workspace.finish();
        summary.scan_duration = start_time.elapsed();
        summary.log();
        Ok(summary)
    }

    /// Stage 1: walk every root into the size records file.
    fn scan(
        &self,
        roots: &[PathBuf],
        workspace: &Workspace,
    ) -> Result<(DeviceSet, WalkStats), FinderError> {
        let progress = self.config.progress_callback.as_ref();
        if let Some(callback) = progress {
            callback.on_phase_start(PHASE_SCAN, 0);
        }

        let sizes_path = workspace.stage_path(StageFile::Sizes);
        let mut writer = RecordWriter::new(workspace.create_stage(StageFile::Sizes)?);
        let mut stats = WalkStats::default();
        let mut devices = DeviceSet::new();

        for root in roots {
            let mut walker = Walker::new(root, self.config.walker_config.clone());
            if let Some(ref flag) = self.config.shutdown_flag {
                walker = walker.with_shutdown_flag(Arc::clone(flag));
            }

            log::debug!("Walking {}", root.display());
            let mut walk = walker.walk();
            for item in walk.by_ref() {
                match item {
                    Ok(entry) => {
                        if let Some(callback) = progress {
                            callback.on_progress(
                                writer.written() as usize + 1,
                                &entry.path.to_string_lossy(),
                            );
                        }
                        writer
                            .write(&entry.into_size_record())
                            .map_err(FinderError::stage_io(sizes_path.clone()))?;
                    }
                    Err(e) => log::warn!("{}", e),
                }
            }
            stats.merge(walk.stats());
            devices.extend(walk.devices());
            self.check_shutdown()?;
        }

        writer.finish().map_err(FinderError::stage_io(sizes_path))?;
        if let Some(callback) = progress {
            callback.on_phase_end(PHASE_SCAN);
        }

        log::info!(
            "Scan complete: {} candidate(s) across {} device(s)",
            stats.candidates,
            devices.len()
        );
        Ok((devices, stats))
    }

    /// Stage 3: size grouping and content screening.
    fn screen(
        &self,
        workspace: &Workspace,
        diagnostics: &mut Diagnostics,
        summary: &mut ScanSummary,
    ) -> Result<(), FinderError> {
        let records =
            RecordReader::<_, SizeRecord>::new(workspace.open_stage(StageFile::SortedSizes)?);
        let mut grouper = SizeGrouper::new(records);
        let hashes_path = workspace.stage_path(StageFile::Hashes);
        let mut writer = RecordWriter::new(workspace.create_stage(StageFile::Hashes)?);

        let config = ScreenConfig {
            mode: ScreenMode::from_cross_device(summary.cross_device),
            io_threads: self.config.io_threads,
            compare_size: self.config.compare_size,
            ..ScreenConfig::default()
        };
        let mut screener = Screener::new(config);
        if let Some(ref flag) = self.config.shutdown_flag {
            screener = screener.with_shutdown_flag(Arc::clone(flag));
        }
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_SCREEN, summary.total_files as usize);
            screener = screener.with_progress(Arc::clone(callback));
        }

        let stats = screener.run(&mut grouper, &mut writer, diagnostics)?;
        writer.finish().map_err(FinderError::stage_io(hashes_path))?;
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_SCREEN);
        }
        workspace.discard_stage(StageFile::SortedSizes);

        let grouping = grouper.stats();
        log::info!(
            "Size grouping: {} of {} file(s) eliminated ({:.1}%)",
            grouping.eliminated_unique,
            grouping.total_records,
            grouping.elimination_rate()
        );
        summary.size_group_members = grouping.potential_duplicates;
        summary.eliminated_by_size = grouping.eliminated_unique;
        summary.hard_links_skipped = stats.aliases_skipped;
        summary.eliminated_by_compare = stats.eliminated_by_compare();
        summary.files_hashed = stats.files_hashed;
        summary.bytes_hashed = stats.bytes_hashed;
        summary.compare_errors = stats.compare_errors;
        summary.read_errors = stats.read_errors;
        Ok(())
    }

    /// Find all duplicate files under a single directory.
    ///
    /// # Errors
    ///
    /// See [`DuplicateFinder::run`].
    pub fn find_duplicates(
        &self,
        path: &Path,
    ) -> Result<(Vec<DuplicateGroup>, ScanSummary), FinderError> {
        self.find_duplicates_in_paths(&[path.to_path_buf()])
    }

    /// Find all duplicate files across several directories.
    ///
    /// The report is collected in memory and parsed back into groups, so
    /// this suits callers that want to inspect results rather than stream
    /// them.
    ///
    /// # Errors
    ///
    /// See [`DuplicateFinder::run`].
    pub fn find_duplicates_in_paths(
        &self,
        paths: &[PathBuf],
    ) -> Result<(Vec<DuplicateGroup>, ScanSummary), FinderError> {
        let mut report = Vec::new();
        let summary = self.run(paths, &mut report)?;
        let groups = read_groups(io::Cursor::new(report))?;
        Ok((groups, summary))
    }
}

/// Sort one staged file into the next and discard the input.
fn sort_stage(
    sorter: &ExternalSorter,
    workspace: &Workspace,
    input: StageFile,
    output: StageFile,
) -> Result<(), FinderError> {
    let stats = sorter.sort_file(&workspace.stage_path(input), &workspace.stage_path(output))?;
    log::debug!(
        "Sorted {}: {} line(s) in, {} out, {} run(s)",
        input.file_name(),
        stats.lines_in,
        stats.lines_out,
        stats.runs
    );
    workspace.discard_stage(input);
    Ok(())
}

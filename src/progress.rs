//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements
//! [`ProgressCallback`] to display progress in the terminal while the
//! pipeline runs. Progress goes to stderr so it never mixes with a report
//! written to stdout.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Phase name for directory traversal.
pub const PHASE_SCAN: &str = "scan";

/// Phase name for content screening.
pub const PHASE_SCREEN: &str = "screen";

/// Progress callback for the duplicate pipeline.
///
/// Implement this trait to receive progress updates during
/// the duplicate detection pipeline.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase ([`PHASE_SCAN`] or [`PHASE_SCREEN`])
    /// * `total` - Total number of items to process, 0 if unknown
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called as items are processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Items processed so far in this phase
    /// * `path` - Path most recently processed
    fn on_progress(&self, current: usize, path: &str);

    /// Called when an item has been processed, providing its size.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    scan: Mutex<Option<ProgressBar>>,
    screen: Mutex<Option<ProgressBar>>,
    quiet: bool,
    verbosity: u8,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use dupsort::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        let target = if quiet {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        Self::with_target(target, quiet)
    }

    fn with_target(target: ProgressDrawTarget, quiet: bool) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            scan: Mutex::new(None),
            screen: Mutex::new(None),
            quiet,
            verbosity: 0,
        }
    }

    /// Set the detail level of progress messages.
    ///
    /// At 0 the bars show only the phase name; from 1 up they also show
    /// the path most recently processed.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    fn scan_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn screen_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn active(&self) -> Option<ProgressBar> {
        lock(&self.screen)
            .clone()
            .or_else(|| lock(&self.scan).clone())
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        match phase {
            PHASE_SCAN => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::scan_style());
                pb.set_message("Scanning");
                pb.enable_steady_tick(Duration::from_millis(100));
                *lock(&self.scan) = Some(pb);
            }
            PHASE_SCREEN => {
                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(Self::screen_style());
                pb.set_message("Screening");
                *lock(&self.screen) = Some(pb);
            }
            _ => log::debug!("Unknown progress phase: {}", phase),
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.active() {
            pb.set_position(current as u64);
            if self.verbosity > 0 && !path.is_empty() {
                pb.set_message(truncate_path(path, 30));
            }
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }

        match phase {
            PHASE_SCAN => {
                if let Some(pb) = lock(&self.scan).take() {
                    pb.finish_with_message("Scan complete");
                }
            }
            PHASE_SCREEN => {
                if let Some(pb) = lock(&self.screen).take() {
                    pb.finish_with_message("Screening complete");
                }
            }
            _ => {}
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        match self.active() {
            Some(pb) => pb.set_message(message.to_string()),
            None => {
                let _ = self.multi.println(message);
            }
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len >= max_len {
        let tail: String = file_name.chars().skip(name_len + 3 - max_len).collect();
        return format!("...{}", tail);
    }

    format!(".../{}", file_name)
}

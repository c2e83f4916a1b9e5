//! External byte-wise line sort.
//!
//! # Overview
//!
//! [`ExternalSorter`] orders the lines of a staged file by plain byte
//! comparison, the same order `LC_ALL=C sort` produces. Memory use is bounded
//! by [`SortConfig::buffer_bytes`]: lines are read into a buffer, each full
//! buffer is sorted in parallel with rayon and spilled as a sorted run, and the
//! runs are k-way merged through a binary heap. When there are more runs than
//! [`SortConfig::fan_in`], the merge takes several passes.
//!
//! With [`SortConfig::unique`] set, identical lines collapse to one.
//!
//! # Example
//!
//! ```no_run
//! use dupsort::staging::sort::{ExternalSorter, SortConfig};
//! use std::path::Path;
//!
//! let sorter = ExternalSorter::new(SortConfig::default().with_unique(true), Path::new("/tmp"));
//! let stats = sorter.sort_file(Path::new("/tmp/in"), Path::new("/tmp/out")).unwrap();
//! println!("{} lines written", stats.lines_out);
//! ```

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::slice::ParallelSliceMut;

/// Default in-memory buffer for one run (64 MiB).
pub const DEFAULT_SORT_BUFFER: usize = 64 * 1024 * 1024;

/// Default number of runs merged at once.
pub const DEFAULT_FAN_IN: usize = 64;

/// Per-line bookkeeping charged against the buffer on top of the line bytes.
const LINE_OVERHEAD: usize = std::mem::size_of::<Vec<u8>>();

/// How often the shutdown flag is polled, in lines.
const SHUTDOWN_POLL_LINES: u64 = 4096;

/// Errors raised while sorting.
#[derive(thiserror::Error, Debug)]
pub enum SortError {
    /// An I/O error on the input, output, or a run file.
    #[error("Sort I/O error for {path}: {source}")]
    Io {
        /// File being read or written
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Shutdown was requested while sorting.
    #[error("Sort interrupted")]
    Interrupted,
}

impl SortError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Sort tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortConfig {
    /// Upper bound on buffered line bytes before a run is spilled
    pub buffer_bytes: usize,
    /// Maximum runs merged in one pass
    pub fan_in: usize,
    /// Collapse identical lines
    pub unique: bool,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            buffer_bytes: DEFAULT_SORT_BUFFER,
            fan_in: DEFAULT_FAN_IN,
            unique: false,
        }
    }
}

impl SortConfig {
    /// Set the buffer size.
    #[must_use]
    pub fn with_buffer_bytes(mut self, bytes: usize) -> Self {
        self.buffer_bytes = bytes.max(1);
        self
    }

    /// Set the merge fan-in (at least 2).
    #[must_use]
    pub fn with_fan_in(mut self, fan_in: usize) -> Self {
        self.fan_in = fan_in.max(2);
        self
    }

    /// Enable or disable unique output.
    #[must_use]
    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// Statistics from one sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Lines read from the input
    pub lines_in: u64,
    /// Lines written to the output
    pub lines_out: u64,
    /// Sorted runs spilled to disk (0 if the input fit in memory)
    pub runs: usize,
    /// Merge passes over spilled runs
    pub merge_passes: usize,
}

/// Byte-wise external sorter.
#[derive(Debug, Clone)]
pub struct ExternalSorter {
    config: SortConfig,
    run_dir: PathBuf,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl ExternalSorter {
    /// Create a sorter that spills runs into `run_dir`.
    #[must_use]
    pub fn new(config: SortConfig, run_dir: &Path) -> Self {
        Self {
            config,
            run_dir: run_dir.to_path_buf(),
            shutdown_flag: None,
        }
    }

    /// Abort the sort when the flag is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    fn check_shutdown(&self) -> Result<(), SortError> {
        if self
            .shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
        {
            return Err(SortError::Interrupted);
        }
        Ok(())
    }

    /// Sort `input` into `output`.
    ///
    /// Every output line ends with a newline, including a final input line
    /// that lacked one.
    ///
    /// # Errors
    ///
    /// Returns [`SortError`] on any I/O failure or on shutdown.
    pub fn sort_file(&self, input: &Path, output: &Path) -> Result<SortStats, SortError> {
        let mut stats = SortStats::default();
        let mut reader = BufReader::new(File::open(input).map_err(SortError::io(input))?);
        let run_prefix = output
            .file_name()
            .map_or_else(|| "sort".into(), |n| n.to_string_lossy().into_owned());

        let mut runs: Vec<PathBuf> = Vec::new();
        let mut buffer: Vec<Vec<u8>> = Vec::new();
        let mut buffered = 0usize;

        loop {
            let mut line = Vec::new();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(SortError::io(input))?;
            if read == 0 {
                break;
            }
            if line.last() != Some(&b'\n') {
                line.push(b'\n');
            }

            stats.lines_in += 1;
            if stats.lines_in % SHUTDOWN_POLL_LINES == 0 {
                self.check_shutdown()?;
            }

            buffered += line.len() + LINE_OVERHEAD;
            buffer.push(line);

            if buffered >= self.config.buffer_bytes {
                let run = self.run_dir.join(format!("{}.run-0-{}", run_prefix, runs.len()));
                self.spill(&mut buffer, &run)?;
                runs.push(run);
                buffered = 0;
            }
        }

        if runs.is_empty() {
            log::trace!("Sorting {} lines in memory", stats.lines_in);
            sort_buffer(&mut buffer, self.config.unique);
            stats.lines_out = write_lines(&buffer, output)?;
            return Ok(stats);
        }

        if !buffer.is_empty() {
            let run = self.run_dir.join(format!("{}.run-0-{}", run_prefix, runs.len()));
            self.spill(&mut buffer, &run)?;
            runs.push(run);
        }
        stats.runs = runs.len();
        log::debug!(
            "Spilled {} sorted run(s) for {}",
            runs.len(),
            output.display()
        );

        let mut pass = 0;
        while runs.len() > self.config.fan_in {
            pass += 1;
            let mut next = Vec::with_capacity(runs.len() / self.config.fan_in + 1);
            for (i, chunk) in runs.chunks(self.config.fan_in).enumerate() {
                let merged = self.run_dir.join(format!("{}.run-{}-{}", run_prefix, pass, i));
                self.merge(chunk, &merged)?;
                next.push(merged);
            }
            runs = next;
        }

        stats.lines_out = self.merge(&runs, output)?;
        stats.merge_passes = pass + 1;
        Ok(stats)
    }

    fn spill(&self, buffer: &mut Vec<Vec<u8>>, run: &Path) -> Result<(), SortError> {
        self.check_shutdown()?;
        sort_buffer(buffer, self.config.unique);
        write_lines(buffer, run)?;
        buffer.clear();
        Ok(())
    }

    /// Merge sorted runs into `output`, deleting the runs afterwards.
    fn merge(&self, runs: &[PathBuf], output: &Path) -> Result<u64, SortError> {
        let mut readers = runs
            .iter()
            .map(|run| File::open(run).map(BufReader::new).map_err(SortError::io(run)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (idx, reader) in readers.iter_mut().enumerate() {
            if let Some(line) = next_line(reader, &runs[idx])? {
                heap.push(Reverse((line, idx)));
            }
        }

        let mut writer = BufWriter::new(File::create(output).map_err(SortError::io(output))?);
        let mut last: Option<Vec<u8>> = None;
        let mut written = 0u64;

        while let Some(Reverse((line, idx))) = heap.pop() {
            if written % SHUTDOWN_POLL_LINES == 0 {
                self.check_shutdown()?;
            }
            if let Some(next) = next_line(&mut readers[idx], &runs[idx])? {
                heap.push(Reverse((next, idx)));
            }

            if self.config.unique && last.as_ref() == Some(&line) {
                continue;
            }
            writer.write_all(&line).map_err(SortError::io(output))?;
            written += 1;
            last = Some(line);
        }

        writer.flush().map_err(SortError::io(output))?;
        drop(readers);
        for run in runs {
            if let Err(e) = fs::remove_file(run) {
                log::debug!("Failed to remove run {}: {}", run.display(), e);
            }
        }
        Ok(written)
    }
}

fn sort_buffer(buffer: &mut Vec<Vec<u8>>, unique: bool) {
    buffer.par_sort_unstable();
    if unique {
        buffer.dedup();
    }
}

fn write_lines(lines: &[Vec<u8>], path: &Path) -> Result<u64, SortError> {
    let mut writer = BufWriter::new(File::create(path).map_err(SortError::io(path))?);
    for line in lines {
        writer.write_all(line).map_err(SortError::io(path))?;
    }
    writer.flush().map_err(SortError::io(path))?;
    Ok(lines.len() as u64)
}

fn next_line(reader: &mut BufReader<File>, path: &Path) -> Result<Option<Vec<u8>>, SortError> {
    let mut line = Vec::new();
    match reader.read_until(b'\n', &mut line) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(line)),
        Err(e) => Err(SortError::io(path)(e)),
    }
}

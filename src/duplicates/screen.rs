//! Content screening: from size groups to hash records.
//!
//! # Overview
//!
//! The screener consumes the [`SizeGrouper`] stream and decides which files
//! need a full MD5 hash. It keeps only the first members of the current size
//! group in memory.
//!
//! ## Same-device mode
//!
//! - Members sharing `(device, inode)` with the previous distinct member are
//!   hard links (or a symlink and its target) and are dropped.
//! - A group with exactly two distinct members gets a bounded compare of
//!   `min(size, 128 KiB)` bytes. A length mismatch is logged to the
//!   diagnostics file and the pair skipped; differing bytes skip the pair.
//!   Otherwise both files are hashed and both records emitted only if the
//!   digests agree.
//! - A group with three or more distinct members gets a prefix screen: the
//!   first `min(size, 128 KiB)` bytes of each member are digested, and only
//!   members whose prefix digest is shared by another member go on to a full
//!   hash. When the prefix covers the whole file its digest already is the
//!   full hash and the file is not read again. Every surviving member is
//!   hashed once and emitted; later stages drop hashes nobody shares.
//! - A group is buffered while it is screened. A group larger than
//!   [`ScreenConfig::max_group_members`] skips the prefix screen and has each
//!   member hashed as it arrives, so memory stays bounded.
//!
//! ## Cross-device mode
//!
//! Inode numbers mean nothing across devices, so every member is hashed and
//! emitted without the hard-link shortcut or the bounded compare.
//!
//! Compare and hash work runs in batches on a dedicated rayon pool. Results
//! are written in input order, so the output is the same for any thread
//! count.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::groups::{SizeGrouper, SizeMember};
use crate::progress::ProgressCallback;
use crate::records::{HashRecord, RecordError, RecordWriter, SizeRecord};
use crate::scanner::{FileId, Hash, HashError, Hasher, PrefixComparison, COMPARE_SIZE};
use crate::staging::{Diagnostics, StagingError};

/// Default number of work items handed to the pool at once.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Default number of I/O worker threads.
pub const DEFAULT_IO_THREADS: usize = 4;

/// Default cap on the members of one size group held for the prefix screen.
pub const DEFAULT_MAX_GROUP_MEMBERS: usize = 65_536;

/// Screening strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenMode {
    /// All candidates share one device; hard links can be recognised.
    #[default]
    SameDevice,
    /// Candidates span devices; hash everything.
    CrossDevice,
}

impl ScreenMode {
    /// Pick the mode from the cross-device flag.
    #[must_use]
    pub fn from_cross_device(cross_device: bool) -> Self {
        if cross_device {
            Self::CrossDevice
        } else {
            Self::SameDevice
        }
    }
}

impl std::fmt::Display for ScreenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SameDevice => write!(f, "same-device"),
            Self::CrossDevice => write!(f, "cross-device"),
        }
    }
}

/// Screener settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenConfig {
    /// Screening strategy
    pub mode: ScreenMode,
    /// Worker threads for compare and hash work
    pub io_threads: usize,
    /// Bytes read from each file by the bounded compare
    pub compare_size: usize,
    /// Work items per batch
    pub batch_size: usize,
    /// Largest size group buffered for the prefix screen
    pub max_group_members: usize,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            mode: ScreenMode::SameDevice,
            io_threads: DEFAULT_IO_THREADS,
            compare_size: COMPARE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_group_members: DEFAULT_MAX_GROUP_MEMBERS,
        }
    }
}

/// Errors that end screening.
#[derive(thiserror::Error, Debug)]
pub enum ScreenError {
    /// A staged size record could not be read.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// A hash record could not be written.
    #[error("Failed to write hash records: {0}")]
    Write(#[from] std::io::Error),

    /// The diagnostics file could not be written.
    #[error(transparent)]
    Diagnostics(#[from] StagingError),

    /// The worker pool could not be created.
    #[error("Failed to build I/O thread pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// Shutdown was requested.
    #[error("Screening interrupted")]
    Interrupted,
}

/// Statistics from the screening pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenStats {
    /// Size group members consumed
    pub members: u64,
    /// Members dropped as hard-link aliases
    pub aliases_skipped: u64,
    /// Pairs given the bounded compare
    pub pairs_compared: u64,
    /// Pairs whose compared prefix differed
    pub pairs_differ: u64,
    /// Pairs whose prefix matched but whose full hashes differed
    pub hash_mismatches: u64,
    /// Members of larger groups whose prefix was digested
    pub prefix_reads: u64,
    /// Members of larger groups whose prefix matched no other member
    pub prefix_unique: u64,
    /// Pairs or members whose files changed size during the run
    pub compare_errors: u64,
    /// Files fully hashed
    pub files_hashed: u64,
    /// Bytes fully hashed
    pub bytes_hashed: u64,
    /// Files that could not be read
    pub read_errors: u64,
    /// Hash records written
    pub records_emitted: u64,
}

impl ScreenStats {
    /// Files ruled out by a bounded compare or prefix screen alone.
    #[must_use]
    pub fn eliminated_by_compare(&self) -> u64 {
        self.pairs_differ * 2 + self.prefix_unique
    }
}

/// A unit of work, in output order.
#[derive(Debug)]
enum Task {
    Compare(SizeRecord, SizeRecord),
    Hash(SizeRecord),
    /// A record whose full hash the prefix screen already produced.
    Emit(HashRecord),
}

impl Task {
    fn size(&self) -> u64 {
        match self {
            Self::Compare(a, _) | Self::Hash(a) => a.size,
            Self::Emit(_) => 0,
        }
    }
}

/// Result of one task.
#[derive(Debug)]
enum Outcome {
    Pair(HashRecord, HashRecord),
    Single(HashRecord),
    Differ,
    HashMismatch,
    LengthMismatch(String),
    ReadFailed(HashError, u64),
    Interrupted,
}

/// Per-group state: the distinct members seen so far, unless the group
/// outgrew the buffer.
#[derive(Debug, Default)]
struct GroupState {
    members: Vec<SizeRecord>,
    last_id: Option<FileId>,
    overflowed: bool,
}

impl GroupState {
    /// End the group. A pair becomes a compare task; a larger group is
    /// returned for the prefix screen.
    fn close(&mut self, tasks: &mut Vec<Task>) -> Option<Vec<SizeRecord>> {
        let members = std::mem::take(&mut self.members);
        *self = Self::default();
        match members.len() {
            0 | 1 => None,
            2 => {
                let mut pair = members.into_iter();
                if let (Some(a), Some(b)) = (pair.next(), pair.next()) {
                    tasks.push(Task::Compare(a, b));
                }
                None
            }
            _ => Some(members),
        }
    }
}

/// Result of digesting one member's prefix.
#[derive(Debug)]
enum PrefixOutcome {
    Digest(Hash),
    LengthMismatch(String),
    ReadFailed(HashError),
    Interrupted,
}

/// Content screener.
pub struct Screener {
    config: ScreenConfig,
    hasher: Hasher,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl Screener {
    /// Create a screener.
    #[must_use]
    pub fn new(config: ScreenConfig) -> Self {
        Self {
            config,
            hasher: Hasher::new(),
            shutdown_flag: None,
            progress: None,
        }
    }

    /// Abort screening when the flag is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.hasher = self.hasher.with_shutdown_flag(Arc::clone(&flag));
        self.shutdown_flag = Some(flag);
        self
    }

    /// Report progress to the callback.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Screen every size group and write the surviving hash records.
    ///
    /// # Errors
    ///
    /// Returns [`ScreenError`] if the input is malformed, the output or the
    /// diagnostics file cannot be written, or shutdown is requested.
    /// Per-file read failures are logged and counted, not returned.
    pub fn run<I, W>(
        &self,
        grouper: &mut SizeGrouper<I>,
        writer: &mut RecordWriter<W>,
        diagnostics: &mut Diagnostics,
    ) -> Result<ScreenStats, ScreenError>
    where
        I: Iterator<Item = Result<SizeRecord, RecordError>>,
        W: Write,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.io_threads.max(1))
            .thread_name(|i| format!("dupsort-io-{i}"))
            .build()?;

        log::info!(
            "Screening size groups ({} mode, {} I/O thread(s))",
            self.config.mode,
            self.config.io_threads.max(1)
        );

        let mut stats = ScreenStats::default();
        let mut state = GroupState::default();
        let batch_size = self.config.batch_size.max(1);
        let mut tasks: Vec<Task> = Vec::with_capacity(batch_size + 2);

        while let Some(member) = grouper.next() {
            if self.is_shutdown_requested() {
                return Err(ScreenError::Interrupted);
            }
            let member = member?;
            stats.members += 1;
            if let Some(group) = self.plan(member, &mut state, &mut tasks, &mut stats) {
                self.screen_prefixes(&pool, group, &mut tasks, diagnostics, &mut stats)?;
            }

            if tasks.len() >= batch_size {
                self.flush(&pool, &mut tasks, writer, diagnostics, &mut stats)?;
                if let Some(ref progress) = self.progress {
                    progress.on_progress(grouper.stats().total_records as usize, "");
                }
            }
        }

        if let Some(group) = state.close(&mut tasks) {
            self.screen_prefixes(&pool, group, &mut tasks, diagnostics, &mut stats)?;
        }
        self.flush(&pool, &mut tasks, writer, diagnostics, &mut stats)?;
        if let Some(ref progress) = self.progress {
            progress.on_progress(grouper.stats().total_records as usize, "");
        }

        log::info!(
            "Screening complete: {} members, {} hashed, {} record(s) emitted",
            stats.members,
            stats.files_hashed,
            stats.records_emitted
        );
        Ok(stats)
    }

    /// Turn one member into zero or more tasks. Returns the previous group
    /// when this member closes one that needs the prefix screen.
    fn plan(
        &self,
        member: SizeMember,
        state: &mut GroupState,
        tasks: &mut Vec<Task>,
        stats: &mut ScreenStats,
    ) -> Option<Vec<SizeRecord>> {
        let closed = if member.group_start {
            state.close(tasks)
        } else {
            None
        };
        let record = member.record;

        if self.config.mode == ScreenMode::CrossDevice {
            tasks.push(Task::Hash(record));
            return closed;
        }

        if state.last_id.is_some_and(|id| record.id.is_alias_of(&id)) {
            log::debug!("Skipping hard link: {}", record.path.display());
            stats.aliases_skipped += 1;
            return closed;
        }
        state.last_id = Some(record.id);

        if state.overflowed {
            tasks.push(Task::Hash(record));
        } else if state.members.len() >= self.config.max_group_members.max(2) {
            log::debug!(
                "Size group of {} bytes exceeds {} members; hashing without prefix screen",
                record.size,
                self.config.max_group_members
            );
            state.overflowed = true;
            tasks.extend(state.members.drain(..).map(Task::Hash));
            tasks.push(Task::Hash(record));
        } else {
            state.members.push(record);
        }
        closed
    }

    /// Digest the prefix of every member of a group and queue the members
    /// whose prefix another member shares.
    fn screen_prefixes(
        &self,
        pool: &rayon::ThreadPool,
        group: Vec<SizeRecord>,
        tasks: &mut Vec<Task>,
        diagnostics: &mut Diagnostics,
        stats: &mut ScreenStats,
    ) -> Result<(), ScreenError> {
        if self.is_shutdown_requested() {
            return Err(ScreenError::Interrupted);
        }
        let size = group.first().map_or(0, |r| r.size);
        let limit = self.config.compare_size;
        let whole_file = usize::try_from(size).is_ok_and(|s| s <= limit);

        let outcomes: Vec<PrefixOutcome> =
            pool.install(|| group.par_iter().map(|r| self.prefix_digest(r)).collect());

        let mut digests: Vec<(SizeRecord, Hash)> = Vec::with_capacity(group.len());
        for (record, outcome) in group.into_iter().zip(outcomes) {
            stats.prefix_reads += 1;
            match outcome {
                PrefixOutcome::Digest(digest) => {
                    if whole_file {
                        self.completed(size, stats, 1);
                    }
                    digests.push((record, digest));
                }
                PrefixOutcome::LengthMismatch(message) => {
                    log::warn!("{}", message);
                    diagnostics.record(&message)?;
                    stats.compare_errors += 1;
                }
                PrefixOutcome::ReadFailed(error) => {
                    log::warn!("Skipping unreadable file: {}", error);
                    stats.read_errors += 1;
                }
                PrefixOutcome::Interrupted => return Err(ScreenError::Interrupted),
            }
        }

        let mut shared: HashMap<Hash, usize> = HashMap::with_capacity(digests.len());
        for (_, digest) in &digests {
            *shared.entry(*digest).or_default() += 1;
        }

        for (record, digest) in digests {
            if shared.get(&digest).copied().unwrap_or(0) < 2 {
                log::trace!("Prefix unique in its group: {}", record.path.display());
                stats.prefix_unique += 1;
            } else if whole_file {
                tasks.push(Task::Emit(HashRecord::from_size_record(&record, digest)));
            } else {
                tasks.push(Task::Hash(record));
            }
        }
        Ok(())
    }

    fn prefix_digest(&self, record: &SizeRecord) -> PrefixOutcome {
        let limit = self.config.compare_size;
        let wanted = usize::try_from(record.size).map_or(limit, |s| s.min(limit));
        match self.hasher.prefix_hash(&record.path, wanted) {
            Ok((digest, read)) if read == wanted => PrefixOutcome::Digest(digest),
            Ok((_, read)) => PrefixOutcome::LengthMismatch(format!(
                "Size changed during scan: read {} of {} bytes from {}",
                read,
                wanted,
                record.path.display()
            )),
            Err(HashError::Interrupted) => PrefixOutcome::Interrupted,
            Err(e) => PrefixOutcome::ReadFailed(e),
        }
    }

    /// Run the pending tasks on the pool and write their results in order.
    fn flush<W: Write>(
        &self,
        pool: &rayon::ThreadPool,
        tasks: &mut Vec<Task>,
        writer: &mut RecordWriter<W>,
        diagnostics: &mut Diagnostics,
        stats: &mut ScreenStats,
    ) -> Result<(), ScreenError> {
        if tasks.is_empty() {
            return Ok(());
        }

        let outcomes: Vec<Outcome> =
            pool.install(|| tasks.par_iter().map(|task| self.execute(task)).collect());

        for (task, outcome) in tasks.drain(..).zip(outcomes) {
            if let Task::Compare(..) = task {
                stats.pairs_compared += 1;
            }
            match outcome {
                Outcome::Pair(a, b) => {
                    self.completed(task.size(), stats, 2);
                    writer.write(&a)?;
                    writer.write(&b)?;
                    stats.records_emitted += 2;
                }
                Outcome::Single(a) => {
                    if !matches!(task, Task::Emit(_)) {
                        self.completed(task.size(), stats, 1);
                    }
                    writer.write(&a)?;
                    stats.records_emitted += 1;
                }
                Outcome::Differ => {
                    stats.pairs_differ += 1;
                }
                Outcome::HashMismatch => {
                    self.completed(task.size(), stats, 2);
                    stats.hash_mismatches += 1;
                }
                Outcome::LengthMismatch(message) => {
                    log::warn!("{}", message);
                    diagnostics.record(&message)?;
                    stats.compare_errors += 1;
                }
                Outcome::ReadFailed(error, hashed) => {
                    self.completed(task.size(), stats, hashed);
                    log::warn!("Skipping unreadable file: {}", error);
                    stats.read_errors += 1;
                }
                Outcome::Interrupted => return Err(ScreenError::Interrupted),
            }
        }
        Ok(())
    }

    fn completed(&self, size: u64, stats: &mut ScreenStats, files: u64) {
        stats.files_hashed += files;
        stats.bytes_hashed += size * files;
        if let Some(ref progress) = self.progress {
            progress.on_item_completed(size * files);
        }
    }

    fn execute(&self, task: &Task) -> Outcome {
        match task {
            Task::Hash(record) => match self.hasher.full_hash(&record.path) {
                Ok(hash) => Outcome::Single(HashRecord::from_size_record(record, hash)),
                Err(e) => failure(e, 0),
            },
            Task::Compare(a, b) => self.compare_pair(a, b),
            Task::Emit(record) => Outcome::Single(record.clone()),
        }
    }

    fn compare_pair(&self, a: &SizeRecord, b: &SizeRecord) -> Outcome {
        let comparison =
            match self
                .hasher
                .compare_prefix(&a.path, &b.path, a.size, self.config.compare_size)
            {
                Ok(c) => c,
                Err(e) => return failure(e, 0),
            };

        match comparison {
            PrefixComparison::Different => {
                log::trace!(
                    "Prefix differs: {} {}",
                    a.path.display(),
                    b.path.display()
                );
                Outcome::Differ
            }
            PrefixComparison::LengthMismatch { first, second } => Outcome::LengthMismatch(format!(
                "Size changed during scan: read {} bytes from {} and {} bytes from {}",
                first,
                a.path.display(),
                second,
                b.path.display()
            )),
            PrefixComparison::Equal => {
                let hash_a = match self.hasher.full_hash(&a.path) {
                    Ok(h) => h,
                    Err(e) => return failure(e, 0),
                };
                let hash_b = match self.hasher.full_hash(&b.path) {
                    Ok(h) => h,
                    Err(e) => return failure(e, 1),
                };
                if hash_a == hash_b {
                    Outcome::Pair(
                        HashRecord::from_size_record(a, hash_a),
                        HashRecord::from_size_record(b, hash_b),
                    )
                } else {
                    log::debug!(
                        "Prefix matched but content differs: {} {}",
                        a.path.display(),
                        b.path.display()
                    );
                    Outcome::HashMismatch
                }
            }
        }
    }
}

fn failure(error: HashError, hashed: u64) -> Outcome {
    match error {
        HashError::Interrupted => Outcome::Interrupted,
        e => Outcome::ReadFailed(e, hashed),
    }
}

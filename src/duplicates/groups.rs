//! Size grouping and duplicate group representation.
//!
//! # Overview
//!
//! Size grouping is the primary cardinality reduction of the pipeline. Files
//! with different sizes cannot be duplicates, and on typical trees most files
//! have a size no other file shares. [`SizeGrouper`] walks the size-sorted
//! record stream once and passes on only the records whose size matches a
//! neighbour's, marking the first member of each group. It keeps a single
//! record of lookahead, so memory stays constant however large the input is.
//!
//! [`DuplicateGroup`] is the consumer-side view of one cluster of the final
//! report.
//!
//! # Example
//!
//! ```
//! use dupsort::duplicates::SizeGrouper;
//! use dupsort::records::{FileKind, SizeRecord};
//! use dupsort::scanner::FileId;
//! use std::path::PathBuf;
//!
//! let record = |size, ino, path: &str| SizeRecord {
//!     size,
//!     id: FileId::new(1, ino),
//!     path: PathBuf::from(path),
//!     kind: FileKind::Regular,
//! };
//! let sorted = vec![
//!     Ok(record(100, 1, "/a.txt")),
//!     Ok(record(100, 2, "/b.txt")),
//!     Ok(record(200, 3, "/c.txt")),
//! ];
//!
//! let mut grouper = SizeGrouper::new(sorted.into_iter());
//! let members: Vec<_> = grouper.by_ref().collect::<Result<_, _>>().unwrap();
//!
//! assert_eq!(members.len(), 2);
//! assert!(members[0].group_start);
//! assert_eq!(grouper.stats().eliminated_unique, 1); // The 200-byte file
//! ```

use std::path::PathBuf;

use crate::records::{HashRecord, RecordError, SizeRecord};
use crate::scanner::{hash_to_hex, Hash};

/// A record that shares its size with at least one other record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeMember {
    /// The size record
    pub record: SizeRecord,
    /// Whether this is the first member of its size group
    pub group_start: bool,
}

/// Statistics from the size grouping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Records read from the sorted input
    pub total_records: u64,
    /// Records dropped because no other record has their size
    pub eliminated_unique: u64,
    /// Records passed on as members of a size group
    pub potential_duplicates: u64,
    /// Number of size groups (sizes shared by 2+ records)
    pub size_groups: u64,
}

impl GroupingStats {
    /// Percentage of records eliminated by size grouping.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_records as f64) * 100.0
        }
    }
}

/// Single-pass filter over a size-sorted record stream.
pub struct SizeGrouper<I> {
    inner: I,
    prev: Option<SizeRecord>,
    prev_in_group: bool,
    done: bool,
    stats: GroupingStats,
}

impl<I> SizeGrouper<I>
where
    I: Iterator<Item = Result<SizeRecord, RecordError>>,
{
    /// Wrap a record stream sorted by size.
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            prev: None,
            prev_in_group: false,
            done: false,
            stats: GroupingStats::default(),
        }
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> &GroupingStats {
        &self.stats
    }

    fn emit(&mut self, record: SizeRecord, group_start: bool) -> SizeMember {
        self.stats.potential_duplicates += 1;
        if group_start {
            self.stats.size_groups += 1;
            log::trace!("Size group of {} bytes", record.size);
        }
        SizeMember {
            record,
            group_start,
        }
    }

    fn eliminate(&mut self, record: &SizeRecord) {
        self.stats.eliminated_unique += 1;
        log::trace!(
            "Eliminated unique size {}: {}",
            record.size,
            record.path.display()
        );
    }
}

impl<I> Iterator for SizeGrouper<I>
where
    I: Iterator<Item = Result<SizeRecord, RecordError>>,
{
    type Item = Result<SizeMember, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let next = match self.inner.next() {
                Some(Ok(record)) => {
                    self.stats.total_records += 1;
                    Some(record)
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.done = true;
                    None
                }
            };

            let Some(prev) = self.prev.take() else {
                self.prev = next;
                self.prev_in_group = false;
                continue;
            };

            let matches_next = next.as_ref().is_some_and(|n| n.size == prev.size);
            let in_group = self.prev_in_group || matches_next;
            let group_start = !self.prev_in_group && matches_next;
            self.prev_in_group = matches_next;
            self.prev = next;

            if in_group {
                return Some(Ok(self.emit(prev, group_start)));
            }
            self.eliminate(&prev);
        }
        None
    }
}

/// A confirmed set of files with identical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// MD5 digest shared by every file
    pub hash: Hash,
    /// Records in report order; the first is the cluster's representative
    pub files: Vec<HashRecord>,
}

impl DuplicateGroup {
    /// Create a new duplicate group.
    #[must_use]
    pub fn new(hash: Hash, files: Vec<HashRecord>) -> Self {
        Self { hash, files }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of duplicate copies (total - 1 original).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Space held by the copies, given the shared file size.
    #[must_use]
    pub fn wasted_space(&self, file_size: u64) -> u64 {
        file_size * self.duplicate_count() as u64
    }

    /// Hash as hexadecimal string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hash_to_hex(&self.hash)
    }

    /// Get just the paths of files in this group.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Whether every member sits on the same device.
    ///
    /// Consumers use this to choose between hard and symbolic links.
    #[must_use]
    pub fn is_single_device(&self) -> bool {
        self.files
            .windows(2)
            .all(|pair| pair[0].id.device == pair[1].id.device)
    }
}

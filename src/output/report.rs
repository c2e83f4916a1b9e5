//! Report formatter and parser.
//!
//! [`format_report`] turns the label-sorted cluster records into the final
//! report by dropping each line's leading label. [`GroupReader`] reads such a
//! report back, grouping consecutive lines that share a hash.

use std::io::{BufRead, Write};

use crate::duplicates::DuplicateGroup;
use crate::records::{ClusterRecord, HashRecord, RecordError, RecordReader, RecordWriter};

/// Statistics from writing a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStats {
    /// Lines written
    pub lines: u64,
    /// Duplicate groups written
    pub groups: u64,
}

/// Strip cluster labels and write the report.
///
/// # Errors
///
/// Returns [`RecordError`] if a cluster record is malformed or the report
/// cannot be written.
pub fn format_report<R, W>(
    clusters: R,
    out: &mut RecordWriter<W>,
) -> Result<ReportStats, RecordError>
where
    R: BufRead,
    W: Write,
{
    let mut stats = ReportStats::default();
    let mut label: Option<std::path::PathBuf> = None;

    for cluster in RecordReader::<_, ClusterRecord>::new(clusters) {
        let cluster = cluster?;
        if label.as_ref() != Some(&cluster.label) {
            stats.groups += 1;
            label = Some(cluster.label);
        }
        out.write(&cluster.record)?;
        stats.lines += 1;
    }

    log::debug!(
        "Report written: {} line(s) in {} group(s)",
        stats.lines,
        stats.groups
    );
    Ok(stats)
}

/// Iterator over the duplicate groups of a report.
pub struct GroupReader<R> {
    records: RecordReader<R, HashRecord>,
    pending: Option<HashRecord>,
}

impl<R: BufRead> GroupReader<R> {
    /// Read a report from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            records: RecordReader::new(reader),
            pending: None,
        }
    }
}

impl<R: BufRead> Iterator for GroupReader<R> {
    type Item = Result<DuplicateGroup, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.pending.take() {
            Some(record) => record,
            None => match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            },
        };

        let hash = first.hash;
        let mut files = vec![first];
        for record in self.records.by_ref() {
            match record {
                Ok(record) if record.hash == hash => files.push(record),
                Ok(record) => {
                    self.pending = Some(record);
                    break;
                }
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(DuplicateGroup::new(hash, files)))
    }
}

/// Read a whole report into groups.
///
/// # Errors
///
/// Returns [`RecordError`] on the first malformed line.
pub fn read_groups<R: BufRead>(reader: R) -> Result<Vec<DuplicateGroup>, RecordError> {
    GroupReader::new(reader).collect()
}

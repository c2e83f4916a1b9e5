//! Cluster labelling of sorted hash records.
//!
//! Walks the sorted, unique hash record stream as runs of equal hash. Every
//! member of a run of two or more is re-emitted with the run's first path
//! prepended as its cluster label; a run of one is a file whose content
//! nobody else shares and is dropped. Only the first record of the current
//! run is held back, until the run is known to have a second member.

use std::io::Write;

use crate::records::{ClusterRecord, HashRecord, RecordError, RecordWriter};
use crate::scanner::Hash;

/// Statistics from clustering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    /// Hash records read
    pub records_in: u64,
    /// Clusters (duplicate groups) found
    pub clusters: u64,
    /// Records written with a cluster label
    pub clustered_files: u64,
    /// Records dropped because no other file shares their hash
    pub singletons_dropped: u64,
    /// Bytes held by redundant copies
    pub reclaimable_bytes: u64,
}

impl ClusterStats {
    /// Number of redundant copies (members beyond the first of each cluster).
    #[must_use]
    pub fn duplicate_files(&self) -> u64 {
        self.clustered_files.saturating_sub(self.clusters)
    }
}

/// The run being assembled.
struct Run {
    hash: Hash,
    /// First record, until a second member proves the run is a cluster
    pending: Option<HashRecord>,
    label: std::path::PathBuf,
    len: u64,
}

/// Label every multi-member run of `records` and write the cluster records.
///
/// # Errors
///
/// Returns [`RecordError`] if a record cannot be read or written.
pub fn cluster_records<I, W>(
    records: I,
    writer: &mut RecordWriter<W>,
) -> Result<ClusterStats, RecordError>
where
    I: IntoIterator<Item = Result<HashRecord, RecordError>>,
    W: Write,
{
    let mut stats = ClusterStats::default();
    let mut run: Option<Run> = None;

    for record in records {
        let record = record?;
        stats.records_in += 1;

        if let Some(current) = run.as_mut().filter(|r| r.hash == record.hash) {
            if let Some(first) = current.pending.take() {
                write_member(writer, &current.label, first)?;
            }
            write_member(writer, &current.label, record)?;
            current.len += 1;
            continue;
        }

        if let Some(done) = run.take() {
            finish_run(done, &mut stats);
        }
        run = Some(Run {
            hash: record.hash,
            label: record.path.clone(),
            pending: Some(record),
            len: 1,
        });
    }

    if let Some(done) = run {
        finish_run(done, &mut stats);
    }

    log::info!(
        "Clustering complete: {} cluster(s), {} file(s), {} unique dropped",
        stats.clusters,
        stats.clustered_files,
        stats.singletons_dropped
    );
    Ok(stats)
}

fn write_member<W: Write>(
    writer: &mut RecordWriter<W>,
    label: &std::path::Path,
    record: HashRecord,
) -> Result<(), RecordError> {
    writer.write(&ClusterRecord {
        label: label.to_path_buf(),
        record,
    })?;
    Ok(())
}

fn finish_run(run: Run, stats: &mut ClusterStats) {
    if run.len < 2 {
        stats.singletons_dropped += 1;
        return;
    }

    stats.clusters += 1;
    stats.clustered_files += run.len;
    match std::fs::metadata(&run.label) {
        Ok(meta) => stats.reclaimable_bytes += meta.len() * (run.len - 1),
        Err(e) => log::debug!("Cannot stat {}: {}", run.label.display(), e),
    }
}

use crate::ingest::{self, IngestReport};
use crate::normalize::normalize;
use crate::table::Table;

/// Receives the pipeline's checkpoints. Both callbacks default to doing nothing.
pub trait PipelineObserver {
    /// Raw table assembled from the archive.
    fn ingested(&self, _report: &IngestReport, _table: &Table) {}
    /// Cleaned table, ready for consumers.
    fn normalized(&self, _table: &Table) {}
}

/// Reports checkpoints through the `log` facade.
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn ingested(&self, report: &IngestReport, table: &Table) {
        log::info!(
            "Ingested {} records from {} of {} archive entries",
            report.records(),
            report.entries_read.len(),
            report.entries_total
        );
        for (name, count) in &report.entries_read {
            log::debug!("  {name}: {count} records");
        }
        if !report.entries_ignored.is_empty() {
            log::debug!("Ignored {} non-record entries", report.entries_ignored.len());
        }
        log::debug!("Raw columns: {}", table.column_names().join(", "));
    }

    fn normalized(&self, table: &Table) {
        log::info!("Cleaned table: {} rows, {} columns", table.len(), table.width());
        log::debug!("Cleaned columns: {}", table.column_names().join(", "));
    }
}

/// Swallows every checkpoint.
pub struct NullObserver;

impl PipelineObserver for NullObserver {}

/// Ingest an in-memory archive and normalize the result.
///
/// An archive without record entries gives an empty table; the caller is
/// expected to present that differently from an error.
pub fn load_archive(archive_bytes: &[u8], observer: &dyn PipelineObserver) -> ingest::Result<Table> {
    let (raw, report) = ingest::ingest_with_report(archive_bytes)?;
    observer.ingested(&report, &raw);

    let cleaned = normalize(raw);
    observer.normalized(&cleaned);

    Ok(cleaned)
}

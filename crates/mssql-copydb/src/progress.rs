//! Progress callbacks raised by the copier.

use crate::catalog::TableIdentifier;
use tracing::{debug, info};

/// Receives per-table progress from every worker.
///
/// Calls for different tables arrive concurrently from different workers, so
/// implementations must be thread-safe. All methods default to no-ops.
pub trait CopyObserver: Send + Sync {
    /// A worker took the table from the queue.
    fn table_started(&self, _table: &TableIdentifier) {}

    /// Another `notify_after` rows were read; `rows` is the running total.
    fn rows_copied(&self, _table: &TableIdentifier, _rows: u64) {}

    /// Every row of the table was written.
    fn table_completed(&self, _table: &TableIdentifier, _rows: u64) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CopyObserver for NoopObserver {}

/// Observer that reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl CopyObserver for LogObserver {
    fn table_started(&self, table: &TableIdentifier) {
        info!("{}: copying", table);
    }

    fn rows_copied(&self, table: &TableIdentifier, rows: u64) {
        debug!("{}: {} rows", table, rows);
    }

    fn table_completed(&self, table: &TableIdentifier, rows: u64) {
        info!("{}: done ({} rows)", table, rows);
    }
}

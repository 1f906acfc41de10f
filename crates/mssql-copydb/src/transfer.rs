//! Batched bulk transfer of one table's rows.

use crate::catalog::TableDefinition;
use crate::config::CopyConfig;
use crate::connection::{SourceConnection, TargetConnection};
use crate::ddl;
use crate::error::{CopyError, Result};
use crate::progress::CopyObserver;
use futures::TryStreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared stop signal: set on the first failure, or when the run is cancelled.
///
/// A transfer that sees the signal stops without writing the rows read since
/// its last batch, so that destination table is left partially filled.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl AbortSignal {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
            cancel,
        }
    }

    /// Ask every worker to stop.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Row batching settings.
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    /// Rows per bulk load.
    pub batch_size: usize,

    /// Rows between progress notifications and abort checks.
    pub notify_after: u64,
}

impl From<&CopyConfig> for TransferSettings {
    fn from(config: &CopyConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            notify_after: config.notify_after.max(1),
        }
    }
}

/// Stream every transferable row of `table` from `source` into `target`.
///
/// Returns the number of rows written. Stops with [`CopyError::Aborted`] when
/// the abort signal is seen at a notification point; rows of the current
/// partial batch are not written in that case.
pub async fn transfer_table<S, T>(
    source: &mut S,
    target: &mut T,
    table: &TableDefinition,
    settings: TransferSettings,
    abort: &AbortSignal,
    observer: &dyn CopyObserver,
) -> Result<u64>
where
    S: SourceConnection,
    T: TargetConnection,
{
    let name = table.identifier.to_string();
    let Some(query) = ddl::select_rows(table) else {
        debug!("{}: no transferable columns, skipping rows", name);
        return Ok(0);
    };

    let mut rows = source
        .read_rows(&query)
        .await
        .map_err(|e| CopyError::transfer(&name, format!("reading rows: {}", e)))?;

    let mut batch = Vec::with_capacity(settings.batch_size);
    let mut read = 0u64;
    let mut written = 0u64;

    while let Some(row) = rows
        .try_next()
        .await
        .map_err(|e| CopyError::transfer(&name, format!("reading rows: {}", e)))?
    {
        batch.push(row);
        read += 1;

        if batch.len() >= settings.batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(settings.batch_size));
            written += target.write_batch(table, full).await?;
            debug!("{}: wrote batch, {} rows so far", name, written);
        }

        if read % settings.notify_after == 0 {
            observer.rows_copied(&table.identifier, read);
            if abort.is_aborted() {
                return Err(CopyError::Aborted {
                    table: name,
                    rows: read,
                });
            }
        }
    }

    if !batch.is_empty() {
        written += target.write_batch(table, batch).await?;
    }

    Ok(written)
}

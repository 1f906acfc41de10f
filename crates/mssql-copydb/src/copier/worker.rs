//! Worker loop and the per-table pipeline.

use crate::catalog::TableDefinition;
use crate::connection::{Connector, SourceConnection, TargetConnection};
use crate::ddl;
use crate::error::{CopyError, Result};
use crate::progress::CopyObserver;
use crate::transfer::{self, AbortSignal, TransferSettings};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, warn};

/// State shared by every worker of one run.
pub(super) struct RunState {
    queue: Mutex<VecDeque<TableDefinition>>,
    first_error: Mutex<Option<CopyError>>,
    pub(super) abort: AbortSignal,
    tables_copied: AtomicUsize,
    rows_transferred: AtomicU64,
}

impl RunState {
    pub(super) fn new(tables: Vec<TableDefinition>, abort: AbortSignal) -> Self {
        Self {
            queue: Mutex::new(tables.into()),
            first_error: Mutex::new(None),
            abort,
            tables_copied: AtomicUsize::new(0),
            rows_transferred: AtomicU64::new(0),
        }
    }

    fn next_table(&self) -> Option<TableDefinition> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Record `error` if it is the first real failure, then stop every worker.
    pub(super) fn fail(&self, error: CopyError) {
        if !error.is_abort() {
            let mut slot = self
                .first_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                None => *slot = Some(error),
                Some(_) => debug!("Ignoring later failure: {}", error),
            }
        }
        self.abort.abort();
    }

    pub(super) fn take_error(&self) -> Option<CopyError> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn table_done(&self, rows: u64) {
        self.tables_copied.fetch_add(1, Ordering::Relaxed);
        self.rows_transferred.fetch_add(rows, Ordering::Relaxed);
    }

    pub(super) fn tables_copied(&self) -> usize {
        self.tables_copied.load(Ordering::Relaxed)
    }

    pub(super) fn rows_transferred(&self) -> u64 {
        self.rows_transferred.load(Ordering::Relaxed)
    }
}

/// Open this worker's connections, then copy tables until the queue is empty
/// or the run is aborted.
pub(super) async fn run_worker<C: Connector>(
    id: usize,
    connector: Arc<C>,
    state: Arc<RunState>,
    settings: TransferSettings,
    observer: Arc<dyn CopyObserver>,
) {
    if state.abort.is_aborted() {
        return;
    }

    let (mut source, mut target) = match open_connections(connector.as_ref()).await {
        Ok(pair) => pair,
        Err(e) => {
            error!("Worker {}: {}", id, e);
            state.fail(e);
            return;
        }
    };
    debug!("Worker {} connected", id);

    loop {
        if state.abort.is_aborted() {
            debug!("Worker {} stopping: run aborted", id);
            break;
        }
        let Some(table) = state.next_table() else {
            debug!("Worker {} finished: queue empty", id);
            break;
        };

        match copy_table(
            &mut source,
            &mut target,
            &table,
            settings,
            &state.abort,
            observer.as_ref(),
        )
        .await
        {
            Ok(rows) => state.table_done(rows),
            Err(e) => {
                if !e.is_abort() {
                    error!("{}: {}", table.identifier, e);
                }
                state.fail(e);
                break;
            }
        }
    }
}

async fn open_connections<C: Connector>(connector: &C) -> Result<(C::Source, C::Target)> {
    let source = connector.connect_source().await?;
    let target = connector.connect_target().await?;
    Ok((source, target))
}

/// Create every schema the run needs, once each, before any worker starts.
pub(super) async fn create_schemas<C: Connector>(
    connector: &C,
    schemas: &[String],
) -> Result<()> {
    let mut target = connector.connect_target().await?;
    for schema in schemas {
        execute(&mut target, ddl::schema_guard(schema)).await?;
    }
    Ok(())
}

/// Create one table at the destination and fill it. Its schema already exists.
pub(super) async fn copy_table<S, T>(
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
    observer.table_started(&table.identifier);

    execute(target, ddl::create_table(table)).await?;
    if let Some(key) = ddl::create_key(table) {
        execute(target, key).await?;
    }

    let identity = table.has_identity();
    if identity {
        execute(target, ddl::identity_insert(&table.identifier, true)).await?;
    }

    let transferred =
        transfer::transfer_table(source, target, table, settings, abort, observer).await;

    if identity {
        let off = execute(target, ddl::identity_insert(&table.identifier, false)).await;
        match (&transferred, off) {
            (Ok(_), Err(e)) => return Err(e),
            (Err(_), Err(e)) => warn!("{}: {}", table.identifier, e),
            _ => {}
        }
    }

    let rows = transferred?;
    observer.table_completed(&table.identifier, rows);
    Ok(rows)
}

/// Run one generated statement, attaching the statement text to any failure.
async fn execute<T: TargetConnection>(target: &mut T, statement: String) -> Result<()> {
    debug!("{}", statement);
    match target.execute(&statement).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Statement failed: {}\n  Statement: {}", e, statement);
            Err(CopyError::ddl(statement, e))
        }
    }
}

//! Copy orchestrator: fans the catalog's tables out over a fixed worker pool.
//!
//! Schemas are created first over a single connection. Tables then sit in one
//! FIFO queue. Each worker owns a source and a destination
//! connection and takes tables from the queue one at a time until it is empty.
//! The first failure is recorded and raises the shared abort signal; every
//! worker checks it before taking the next table and at each progress
//! notification inside a transfer.

mod worker;

use crate::catalog::SchemaCatalog;
use crate::config::CopyConfig;
use crate::connection::Connector;
use crate::error::{CopyError, Result};
use crate::progress::{CopyObserver, LogObserver};
use crate::transfer::{AbortSignal, TransferSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use worker::RunState;

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every table was copied.
    Completed,

    /// A table or connection failed and the run was aborted.
    Failed,

    /// The run was cancelled before it finished.
    Cancelled,
}

/// Result of a copy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the last worker finished.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables in the catalog.
    pub tables_total: usize,

    /// Tables fully copied.
    pub tables_copied: usize,

    /// Rows written across all copied tables.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,

    /// Message of the error that ended the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CopyResult {
    /// Convert result to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Run summary together with the error that ended it, if any.
#[derive(Debug)]
pub struct CopyReport {
    pub result: CopyResult,
    pub error: Option<CopyError>,
}

impl CopyReport {
    pub fn into_result(self) -> Result<CopyResult> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result),
        }
    }
}

/// Copies every table of a catalog from source to destination.
pub struct Copier<C> {
    connector: Arc<C>,
    config: CopyConfig,
    observer: Arc<dyn CopyObserver>,
}

impl<C: Connector + 'static> Copier<C> {
    pub fn new(connector: C, config: CopyConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            observer: Arc::new(LogObserver),
        }
    }

    /// Replace the default logging observer.
    pub fn with_observer(mut self, observer: Arc<dyn CopyObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Copy the catalog; `Ok` only if every table was copied.
    pub async fn run(
        &self,
        catalog: SchemaCatalog,
        cancel: CancellationToken,
    ) -> Result<CopyResult> {
        self.execute(catalog, cancel).await.into_result()
    }

    /// Copy the catalog and report the outcome, successful or not.
    pub async fn execute(&self, catalog: SchemaCatalog, cancel: CancellationToken) -> CopyReport {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let tables_total = catalog.len();
        let worker_count = self.config.workers.max(1).min(tables_total);

        info!("Starting copy run: {}", run_id);
        info!(
            "Queued {} tables for {} workers",
            tables_total, worker_count
        );

        let schemas: Vec<String> = catalog.schemas().into_iter().map(String::from).collect();
        let state = Arc::new(RunState::new(
            catalog.into_tables(),
            AbortSignal::new(cancel),
        ));
        let settings = TransferSettings::from(&self.config);

        if worker_count > 0 && !state.abort.is_aborted() {
            if let Err(e) = worker::create_schemas(self.connector.as_ref(), &schemas).await {
                error!("Creating schemas failed: {}", e);
                state.fail(e);
            }
        }

        let handles: Vec<_> = (0..worker_count)
            .map(|id| {
                let connector = Arc::clone(&self.connector);
                let state = Arc::clone(&state);
                let observer = Arc::clone(&self.observer);
                tokio::spawn(worker::run_worker(id, connector, state, settings, observer))
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
                state.fail(CopyError::Worker(e.to_string()));
            }
        }

        let mut error = state.take_error();
        if error.is_none() && state.abort.is_cancelled() {
            error = Some(CopyError::Cancelled);
        }

        let status = match &error {
            None => RunStatus::Completed,
            Some(CopyError::Cancelled) => RunStatus::Cancelled,
            Some(_) => RunStatus::Failed,
        };

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let rows_transferred = state.rows_transferred();
        let rows_per_second = if duration > 0.0 {
            (rows_transferred as f64 / duration) as u64
        } else {
            0
        };

        let result = CopyResult {
            run_id,
            status,
            started_at,
            completed_at,
            duration_seconds: duration,
            tables_total,
            tables_copied: state.tables_copied(),
            rows_transferred,
            rows_per_second,
            error: error.as_ref().map(|e| e.to_string()),
        };

        match status {
            RunStatus::Completed => info!(
                "Copy completed: {} tables, {} rows in {:.1}s ({} rows/sec)",
                result.tables_copied, result.rows_transferred, duration, rows_per_second
            ),
            RunStatus::Cancelled => warn!(
                "Copy cancelled after {} of {} tables",
                result.tables_copied, tables_total
            ),
            RunStatus::Failed => error!(
                "Copy failed after {} of {} tables",
                result.tables_copied, tables_total
            ),
        }

        CopyReport { result, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{KeyColumn, KeyDefinition, TableDefinition, TableIdentifier};
    use crate::ddl;
    use crate::testing::{identity_table, plain_table, FakeServer, RecordingObserver};

    fn config(workers: usize) -> CopyConfig {
        CopyConfig {
            workers,
            batch_size: 10,
            notify_after: 10,
        }
    }

    fn catalog(tables: Vec<TableDefinition>) -> SchemaCatalog {
        tables.into_iter().collect()
    }

    fn id(name: &str) -> TableIdentifier {
        TableIdentifier::new("dbo", name)
    }

    fn in_schema(schema: &str, name: &str) -> TableDefinition {
        let mut table = plain_table(name);
        table.identifier = TableIdentifier::new(schema, name);
        table
    }

    /// Cancels the run the first time rows are reported.
    struct CancelOnRows(CancellationToken);

    impl CopyObserver for CancelOnRows {
        fn rows_copied(&self, _table: &TableIdentifier, _rows: u64) {
            self.0.cancel();
        }
    }

    #[tokio::test]
    async fn test_every_table_copied_exactly_once() {
        let names: Vec<String> = (0..12).map(|i| format!("T{:02}", i)).collect();
        let mut server = FakeServer::new();
        for name in &names {
            server = server.with_rows(&id(name), 3);
        }
        let connector = server.into_connector();
        let tables = names.iter().map(|n| plain_table(n)).collect();

        let copier = Copier::new(connector.clone(), config(4));
        let result = copier
            .run(catalog(tables), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.tables_total, 12);
        assert_eq!(result.tables_copied, 12);
        assert_eq!(result.rows_transferred, 36);
        assert!(result.error.is_none());
        assert_eq!(connector.connections(), 9);

        for name in &names {
            let log = connector.log_for(&id(name));
            let creates = log.iter().filter(|l| l.starts_with("CREATE TABLE")).count();
            let reads = log.iter().filter(|l| l.starts_with("READ")).count();
            assert_eq!((creates, reads), (1, 1), "table {}", name);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_workers_copy_every_table_once() {
        let names: Vec<String> = (0..16).map(|i| format!("T{:02}", i)).collect();
        let mut server = FakeServer::new().yielding();
        for name in &names {
            server = server.with_rows(&id(name), 25);
        }
        let connector = server.into_connector();
        let tables = names.iter().map(|n| plain_table(n)).collect();

        let result = Copier::new(connector.clone(), config(4))
            .run(catalog(tables), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.tables_copied, 16);
        assert_eq!(result.rows_transferred, 400);
        for name in &names {
            let log = connector.log_for(&id(name));
            let creates = log.iter().filter(|l| l.starts_with("CREATE TABLE")).count();
            let batches = log.iter().filter(|l| l.starts_with("BATCH")).count();
            assert_eq!((creates, batches), (1, 3), "table {}", name);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_report_exactly_one() {
        let names: Vec<String> = (0..16).map(|i| format!("T{:02}", i)).collect();
        let mut server = FakeServer::new()
            .yielding()
            .failing_on("CREATE TABLE [dbo].[T03]")
            .failing_on("CREATE TABLE [dbo].[T04]");
        for name in &names {
            server = server.with_rows(&id(name), 25);
        }
        let connector = server.into_connector();
        let tables = names.iter().map(|n| plain_table(n)).collect();

        let report = Copier::new(connector, config(4))
            .execute(catalog(tables), CancellationToken::new())
            .await;

        assert_eq!(report.result.status, RunStatus::Failed);
        assert!(report.result.tables_copied <= 14);
        assert_eq!(
            report.result.error,
            report.error.as_ref().map(|e| e.to_string())
        );
        match &report.error {
            Some(CopyError::DdlExecution { statement, .. }) => assert!(
                statement == "CREATE TABLE [dbo].[T03] ( [Value] int NULL )"
                    || statement == "CREATE TABLE [dbo].[T04] ( [Value] int NULL )",
                "unexpected statement {}",
                statement
            ),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_schemas_created_once_before_any_table() {
        let tables = vec![
            plain_table("A"),
            plain_table("B"),
            in_schema("sales", "Orders"),
            in_schema("sales", "Lines"),
            in_schema("sales", "Returns"),
        ];
        let connector = FakeServer::new().into_connector();

        Copier::new(connector.clone(), config(4))
            .run(catalog(tables), CancellationToken::new())
            .await
            .unwrap();

        let log = connector.log();
        let first_create = log
            .iter()
            .position(|l| l.starts_with("CREATE TABLE"))
            .unwrap();
        for schema in ["dbo", "sales"] {
            let guard = ddl::schema_guard(schema);
            let positions: Vec<usize> = log
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == guard)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(positions.len(), 1, "schema {}", schema);
            assert!(positions[0] < first_create, "schema {}", schema);
        }
    }

    #[tokio::test]
    async fn test_schema_failure_creates_no_tables() {
        let connector = FakeServer::new()
            .failing_on("CREATE SCHEMA [sales]")
            .into_connector();

        let err = Copier::new(connector.clone(), config(2))
            .run(
                catalog(vec![plain_table("A"), in_schema("sales", "Orders")]),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            CopyError::DdlExecution { statement, .. } => {
                assert_eq!(statement, ddl::schema_guard("sales"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!connector
            .log()
            .iter()
            .any(|l| l.starts_with("CREATE TABLE")));
    }

    #[tokio::test]
    async fn test_workers_capped_by_table_count() {
        let connector = FakeServer::new().into_connector();
        let copier = Copier::new(connector.clone(), config(8));
        copier
            .run(
                catalog(vec![plain_table("A"), plain_table("B")]),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(connector.connections(), 5);
    }

    #[tokio::test]
    async fn test_empty_catalog_succeeds_without_connecting() {
        let connector = FakeServer::new().into_connector();
        let copier = Copier::new(connector.clone(), config(4));
        let result = copier
            .run(SchemaCatalog::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.tables_total, 0);
        assert_eq!(connector.connections(), 0);
    }

    #[tokio::test]
    async fn test_single_failure_is_the_reported_error() {
        let tables: Vec<_> = ["A", "B", "C", "D", "E", "F"]
            .iter()
            .map(|n| plain_table(n))
            .collect();
        let connector = FakeServer::new()
            .failing_on("CREATE TABLE [dbo].[C]")
            .into_connector();

        let copier = Copier::new(connector, config(3));
        let report = copier
            .execute(catalog(tables), CancellationToken::new())
            .await;

        assert_eq!(report.result.status, RunStatus::Failed);
        match report.error {
            Some(CopyError::DdlExecution { statement, source }) => {
                assert_eq!(
                    statement,
                    "CREATE TABLE [dbo].[C] ( [Value] int NULL )"
                );
                assert!(matches!(*source, CopyError::Database(_)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_tables() {
        let connector = FakeServer::new()
            .failing_on("CREATE TABLE [dbo].[A]")
            .into_connector();
        let copier = Copier::new(connector.clone(), config(1));

        let err = copier
            .run(
                catalog(vec![plain_table("A"), plain_table("B"), plain_table("C")]),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CopyError::DdlExecution { .. }));
        assert!(connector.log_for(&id("B")).is_empty());
        assert!(connector.log_for(&id("C")).is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_order_with_identity() {
        let mut table = identity_table("Orders");
        table.key = Some(KeyDefinition {
            name: "PK_Orders".into(),
            is_clustered: true,
            is_primary_key: true,
            is_unique: true,
            is_constraint: true,
            ignore_dup_key: false,
            fill_factor: 0,
            pad_index: false,
            allow_row_locks: true,
            allow_page_locks: true,
            columns: vec![KeyColumn {
                column: 0,
                is_descending: false,
                key_ordinal: 1,
            }],
        });
        let connector = FakeServer::new()
            .with_rows(&id("Orders"), 3)
            .into_connector();
        let observer = Arc::new(RecordingObserver::default());

        let copier = Copier::new(connector.clone(), config(1)).with_observer(observer.clone());
        copier
            .run(catalog(vec![table]), CancellationToken::new())
            .await
            .unwrap();

        let log = connector.log();
        assert_eq!(log.len(), 7);
        assert_eq!(
            log[0],
            "IF SCHEMA_ID(N'dbo') IS NULL EXEC(N'CREATE SCHEMA [dbo]')"
        );
        assert!(log[1].starts_with("CREATE TABLE [dbo].[Orders]"));
        assert!(log[2].starts_with("ALTER TABLE [dbo].[Orders] ADD CONSTRAINT [PK_Orders]"));
        assert_eq!(log[3], "SET IDENTITY_INSERT [dbo].[Orders] ON");
        assert_eq!(log[4], "READ SELECT [Id], [Value] FROM [dbo].[Orders]");
        assert_eq!(log[5], "BATCH [dbo].[Orders] 3");
        assert_eq!(log[6], "SET IDENTITY_INSERT [dbo].[Orders] OFF");

        assert_eq!(
            observer.events(),
            vec!["start [dbo].[Orders]", "done [dbo].[Orders] 3"]
        );
    }

    #[tokio::test]
    async fn test_identity_off_after_failed_transfer() {
        let connector = FakeServer::new()
            .with_rows(&id("Orders"), 3)
            .failing_on("BATCH [dbo].[Orders]")
            .into_connector();
        let copier = Copier::new(connector.clone(), config(1));

        let err = copier
            .run(catalog(vec![identity_table("Orders")]), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CopyError::Database(_)));
        let log = connector.log_for(&id("Orders"));
        assert_eq!(
            log.last().map(String::as_str),
            Some("SET IDENTITY_INSERT [dbo].[Orders] OFF")
        );
    }

    #[tokio::test]
    async fn test_identity_off_failure_reported_after_good_transfer() {
        let connector = FakeServer::new()
            .failing_on("IDENTITY_INSERT [dbo].[Orders] OFF")
            .into_connector();
        let copier = Copier::new(connector, config(1));

        let err = copier
            .run(catalog(vec![identity_table("Orders")]), CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            CopyError::DdlExecution { statement, .. } => {
                assert_eq!(statement, "SET IDENTITY_INSERT [dbo].[Orders] OFF")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_identity_toggle_for_plain_table() {
        let connector = FakeServer::new().with_rows(&id("T"), 2).into_connector();
        let copier = Copier::new(connector.clone(), config(1));
        copier
            .run(catalog(vec![plain_table("T")]), CancellationToken::new())
            .await
            .unwrap();

        assert!(!connector
            .log()
            .iter()
            .any(|l| l.contains("IDENTITY_INSERT")));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let connector = FakeServer::new().into_connector();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let copier = Copier::new(connector.clone(), config(2));
        let report = copier
            .execute(catalog(vec![plain_table("A"), plain_table("B")]), cancel)
            .await;

        assert_eq!(report.result.status, RunStatus::Cancelled);
        assert!(matches!(report.error, Some(CopyError::Cancelled)));
        assert!(connector.log().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_during_transfer() {
        let connector = FakeServer::new()
            .with_rows(&id("A"), 100)
            .with_rows(&id("B"), 100)
            .into_connector();
        let cancel = CancellationToken::new();
        let observer = Arc::new(CancelOnRows(cancel.clone()));

        let copier = Copier::new(connector.clone(), config(1)).with_observer(observer);
        let err = copier
            .run(catalog(vec![plain_table("A"), plain_table("B")]), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, CopyError::Cancelled));
        assert!(connector.log_for(&id("B")).is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure_fails_run() {
        let connector = FakeServer::new().refusing_connections().into_connector();
        let copier = Copier::new(connector.clone(), config(2));

        let report = copier
            .execute(catalog(vec![plain_table("A")]), CancellationToken::new())
            .await;

        assert_eq!(report.result.status, RunStatus::Failed);
        assert_eq!(report.result.tables_copied, 0);
        assert!(matches!(report.error, Some(CopyError::Connection { .. })));
        assert!(connector.log().is_empty());
    }

    #[tokio::test]
    async fn test_result_json() {
        let connector = FakeServer::new().with_rows(&id("A"), 5).into_connector();
        let copier = Copier::new(connector, config(1));
        let result = copier
            .run(catalog(vec![plain_table("A")]), CancellationToken::new())
            .await
            .unwrap();

        let json = result.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["rows_transferred"], 5);
        assert_eq!(value["run_id"], result.run_id.as_str());
        assert!(value.get("error").is_none());
    }
}

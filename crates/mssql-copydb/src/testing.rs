//! In-memory connections and helpers for exercising the copier without a server.

use crate::catalog::{ColumnDefinition, SqlType, TableDefinition, TableIdentifier};
use crate::connection::{Connector, RowStream, SourceConnection, TargetConnection};
use crate::error::{CopyError, Result};
use crate::progress::CopyObserver;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tiberius::{ColumnData, TokenRow};

/// Shared state of the fake server: row counts per table, injected failures
/// and a log of everything the connections were asked to do.
#[derive(Default)]
pub struct FakeServer {
    rows: HashMap<String, u64>,
    fail_on: Vec<String>,
    refuse_connections: bool,
    yielding: bool,
    log: Mutex<Vec<String>>,
    connections: AtomicUsize,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `count` rows when `table` is read.
    pub fn with_rows(mut self, table: &TableIdentifier, count: u64) -> Self {
        self.rows.insert(table.to_string(), count);
        self
    }

    /// Fail any statement, read or batch whose log line contains `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    /// Yield to the scheduler on every call so workers interleave.
    pub fn yielding(mut self) -> Self {
        self.yielding = true;
        self
    }

    pub fn into_connector(self) -> FakeConnector {
        FakeConnector {
            server: Arc::new(self),
        }
    }

    async fn pause(&self) {
        if self.yielding {
            tokio::task::yield_now().await;
        }
    }

    fn record(&self, line: String) -> Result<()> {
        let failed = self.fail_on.iter().any(|needle| line.contains(needle.as_str()));
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.clone());
        if failed {
            return Err(CopyError::Database(tiberius::error::Error::Protocol(
                format!("injected failure: {}", line).into(),
            )));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeConnector {
    server: Arc<FakeServer>,
}

impl FakeConnector {
    /// Everything recorded so far, in order.
    pub fn log(&self) -> Vec<String> {
        self.server
            .log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Log lines that mention `table`.
    pub fn log_for(&self, table: &TableIdentifier) -> Vec<String> {
        let name = table.to_string();
        self.log()
            .into_iter()
            .filter(|line| line.contains(&name))
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.server.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Source = FakeSource;
    type Target = FakeTarget;

    async fn connect_source(&self) -> Result<FakeSource> {
        self.connect()?;
        Ok(FakeSource {
            server: Arc::clone(&self.server),
        })
    }

    async fn connect_target(&self) -> Result<FakeTarget> {
        self.connect()?;
        Ok(FakeTarget {
            server: Arc::clone(&self.server),
        })
    }
}

impl FakeConnector {
    fn connect(&self) -> Result<()> {
        if self.server.refuse_connections {
            return Err(CopyError::connection(
                "connecting to fake,1433/db",
                tiberius::error::Error::Io {
                    kind: std::io::ErrorKind::ConnectionRefused,
                    message: "connection refused".into(),
                },
            ));
        }
        self.server.connections.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeSource {
    server: Arc<FakeServer>,
}

#[async_trait]
impl SourceConnection for FakeSource {
    async fn read_rows<'a>(&'a mut self, query: &str) -> Result<RowStream<'a>> {
        self.server.pause().await;
        self.server.record(format!("READ {}", query))?;
        let table = query.rsplit(" FROM ").next().unwrap_or_default();
        let count = self.server.rows.get(table).copied().unwrap_or(0);
        Ok(stream::iter((0..count).map(|i| Ok(int_row(i as i32)))).boxed())
    }
}

pub struct FakeTarget {
    server: Arc<FakeServer>,
}

#[async_trait]
impl TargetConnection for FakeTarget {
    async fn execute(&mut self, statement: &str) -> Result<()> {
        self.server.pause().await;
        self.server.record(statement.to_string())
    }

    async fn write_batch(
        &mut self,
        table: &TableDefinition,
        rows: Vec<TokenRow<'static>>,
    ) -> Result<u64> {
        let count = rows.len() as u64;
        self.server.pause().await;
        self.server
            .record(format!("BATCH {} {}", table.identifier, count))?;
        Ok(count)
    }
}

/// Observer that records every event as a line of text.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn push(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl CopyObserver for RecordingObserver {
    fn table_started(&self, table: &TableIdentifier) {
        self.push(format!("start {}", table));
    }

    fn rows_copied(&self, table: &TableIdentifier, rows: u64) {
        self.push(format!("rows {} {}", table, rows));
    }

    fn table_completed(&self, table: &TableIdentifier, rows: u64) {
        self.push(format!("done {} {}", table, rows));
    }
}

pub fn int_row(value: i32) -> TokenRow<'static> {
    let mut row = TokenRow::new();
    row.push(ColumnData::I32(Some(value)));
    row
}

/// `dbo.<name>` with a single nullable int column.
pub fn plain_table(name: &str) -> TableDefinition {
    let mut table = TableDefinition::new(TableIdentifier::new("dbo", name));
    table.columns.push(ColumnDefinition::new("Value", SqlType::Int, 1));
    table
}

/// `dbo.<name>` with an identity key column and a value column.
pub fn identity_table(name: &str) -> TableDefinition {
    let mut id = ColumnDefinition::new("Id", SqlType::Int, 1);
    id.is_nullable = false;
    id.is_identity = true;
    id.identity_seed = 1;
    id.identity_increment = 1;

    let mut table = TableDefinition::new(TableIdentifier::new("dbo", name));
    table.columns.push(id);
    table.columns.push(ColumnDefinition::new("Value", SqlType::Int, 2));
    table
}

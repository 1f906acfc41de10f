//! SQL Server destination: statement execution, bulk load and database preparation.

use crate::catalog::{quote_ident, quote_literal, TableDefinition, TableIdentifier};
use crate::config::{ConnectionOptions, DatabaseSpec};
use crate::connection::{connect, MssqlClient, TargetConnection};
use crate::ddl;
use crate::error::{CopyError, Result};
use async_trait::async_trait;
use tiberius::TokenRow;
use tracing::{debug, info};

/// Write-side connection to the destination database.
pub struct MssqlTarget {
    client: MssqlClient,

    /// Table the session staging table is currently shaped for.
    staged_for: Option<TableIdentifier>,
}

impl MssqlTarget {
    pub fn new(client: MssqlClient) -> Self {
        Self {
            client,
            staged_for: None,
        }
    }

    /// Bulk load rows into `destination`, which may be a table or the staging table.
    async fn bulk_load(
        &mut self,
        destination: &str,
        table: &TableDefinition,
        rows: Vec<TokenRow<'static>>,
    ) -> Result<u64> {
        let count = rows.len() as u64;
        let name = table.identifier.to_string();

        let mut bulk_load = self
            .client
            .bulk_insert(destination)
            .await
            .map_err(|e| CopyError::transfer(&name, format!("bulk insert init: {}", e)))?;

        for row in rows {
            bulk_load
                .send(row)
                .await
                .map_err(|e| CopyError::transfer(&name, format!("bulk insert send: {}", e)))?;
        }

        bulk_load
            .finalize()
            .await
            .map_err(|e| CopyError::transfer(&name, format!("bulk insert finalize: {}", e)))?;

        Ok(count)
    }

    /// Make sure the staging table matches `table`.
    async fn ensure_staging(&mut self, table: &TableDefinition) -> Result<()> {
        if self.staged_for.as_ref() == Some(&table.identifier) {
            return Ok(());
        }
        let create = ddl::create_staging_table(table).ok_or_else(|| {
            CopyError::transfer(table.identifier.to_string(), "no transferable columns")
        })?;
        self.execute(&create).await.map_err(|e| {
            CopyError::transfer(table.identifier.to_string(), format!("creating staging table: {}", e))
        })?;
        debug!("Staging table ready for {}", table.identifier);
        self.staged_for = Some(table.identifier.clone());
        Ok(())
    }
}

#[async_trait]
impl TargetConnection for MssqlTarget {
    async fn execute(&mut self, statement: &str) -> Result<()> {
        self.client.simple_query(statement).await?.into_results().await?;
        Ok(())
    }

    async fn write_batch(
        &mut self,
        table: &TableDefinition,
        rows: Vec<TokenRow<'static>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        if !table.has_identity() {
            let destination = table.identifier.to_string();
            return self.bulk_load(&destination, table, rows).await;
        }

        self.ensure_staging(table).await?;
        let count = self.bulk_load(ddl::STAGING_TABLE, table, rows).await?;
        let flush = ddl::flush_staging_table(table).ok_or_else(|| {
            CopyError::transfer(table.identifier.to_string(), "no transferable columns")
        })?;
        self.execute(&flush).await.map_err(|e| {
            CopyError::transfer(table.identifier.to_string(), format!("moving staged rows: {}", e))
        })?;
        Ok(count)
    }
}

/// Create the destination database, dropping it first when `force` is set.
///
/// Runs against `master` on the destination server.
pub async fn prepare_database(
    destination: &DatabaseSpec,
    options: &ConnectionOptions,
    force: bool,
) -> Result<()> {
    let master = destination.with_database("master");
    let mut client = connect(&master, options).await?;

    for statement in database_statements(&destination.database, force) {
        debug!("{}", statement);
        client
            .simple_query(statement.as_str())
            .await
            .map_err(|e| CopyError::ddl(&statement, e.into()))?
            .into_results()
            .await
            .map_err(|e| CopyError::ddl(&statement, e.into()))?;
    }

    info!("Created database {}", quote_ident(&destination.database));
    Ok(())
}

/// Statements that (re)create the destination database.
pub fn database_statements(database: &str, force: bool) -> Vec<String> {
    let mut statements = Vec::with_capacity(2);
    if force {
        statements.push(format!(
            "IF DB_ID({}) IS NOT NULL DROP DATABASE {}",
            quote_literal(database),
            quote_ident(database)
        ));
    }
    statements.push(format!("CREATE DATABASE {}", quote_ident(database)));
    statements
}

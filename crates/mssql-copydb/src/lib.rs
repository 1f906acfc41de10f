//! # mssql-copydb
//!
//! Copies the schema and data of one SQL Server database into another.
//!
//! The library provides:
//!
//! - **Schema catalog** built from one introspection batch: tables, columns,
//!   computed and identity columns, and each table's clustered key or index
//! - **DDL generation** that recreates those tables at the destination
//! - **Parallel copy** over a fixed pool of workers sharing one table queue,
//!   with identity values preserved and cooperative abort on the first failure
//! - **Bulk transfer** using the TDS bulk load protocol
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_copydb::{connect, Copier, CopyConfig, ConnectionOptions, MssqlConnector, MssqlSource};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mssql_copydb::Result<()> {
//! let source = "sql01;Sales;sa;secret".parse()?;
//! let destination = "sql02;SalesCopy;sa;secret".parse()?;
//! let options = ConnectionOptions::default();
//!
//! let catalog = MssqlSource::new(connect(&source, &options).await?)
//!     .load_catalog()
//!     .await?;
//!
//! let connector = MssqlConnector::new(source, destination, options);
//! let result = Copier::new(connector, CopyConfig::default())
//!     .run(catalog, CancellationToken::new())
//!     .await?;
//! println!("Copied {} rows", result.rows_transferred);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod connection;
pub mod copier;
pub mod ddl;
pub mod error;
pub mod progress;
pub mod source;
pub mod target;
pub mod transfer;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use catalog::{SchemaCatalog, TableDefinition, TableIdentifier};
pub use config::{Config, ConnectionOptions, CopyConfig, Credentials, DatabaseSpec};
pub use connection::{connect, Connector, MssqlConnector, SourceConnection, TargetConnection};
pub use copier::{Copier, CopyReport, CopyResult, RunStatus};
pub use error::{CopyError, Result};
pub use progress::{CopyObserver, LogObserver, NoopObserver};
pub use source::MssqlSource;
pub use target::{prepare_database, MssqlTarget};

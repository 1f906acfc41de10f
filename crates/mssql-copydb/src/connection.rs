//! Connection traits and tiberius client construction.
//!
//! The copier never touches tiberius directly. It asks a [`Connector`] for one
//! source and one destination connection per worker and drives them through
//! [`SourceConnection`] and [`TargetConnection`], which lets tests run the
//! whole pipeline against in-memory fakes.

use crate::catalog::TableDefinition;
use crate::config::{ConnectionOptions, DatabaseSpec};
use crate::error::{CopyError, Result};
use crate::source::MssqlSource;
use crate::target::MssqlTarget;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, TokenRow};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

/// A tiberius client over a tokio TCP stream.
pub type MssqlClient = Client<Compat<TcpStream>>;

/// Stream of source rows, already converted for bulk load.
pub type RowStream<'a> = BoxStream<'a, Result<TokenRow<'static>>>;

/// Read side of a worker.
#[async_trait]
pub trait SourceConnection: Send {
    /// Run `query` and stream its rows.
    async fn read_rows<'a>(&'a mut self, query: &str) -> Result<RowStream<'a>>;
}

/// Write side of a worker.
#[async_trait]
pub trait TargetConnection: Send {
    /// Execute one statement, discarding any results.
    async fn execute(&mut self, statement: &str) -> Result<()>;

    /// Bulk load one batch of rows into `table`.
    ///
    /// Rows carry one value per transferable column, in column order.
    async fn write_batch(
        &mut self,
        table: &TableDefinition,
        rows: Vec<TokenRow<'static>>,
    ) -> Result<u64>;
}

/// Opens the connections each worker owns.
#[async_trait]
pub trait Connector: Send + Sync {
    type Source: SourceConnection + 'static;
    type Target: TargetConnection + 'static;

    async fn connect_source(&self) -> Result<Self::Source>;

    async fn connect_target(&self) -> Result<Self::Target>;
}

/// Connector for a pair of SQL Server databases.
#[derive(Debug, Clone)]
pub struct MssqlConnector {
    source: DatabaseSpec,
    destination: DatabaseSpec,
    options: ConnectionOptions,
}

impl MssqlConnector {
    pub fn new(source: DatabaseSpec, destination: DatabaseSpec, options: ConnectionOptions) -> Self {
        Self {
            source,
            destination,
            options,
        }
    }

    pub fn source(&self) -> &DatabaseSpec {
        &self.source
    }

    pub fn destination(&self) -> &DatabaseSpec {
        &self.destination
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    type Source = MssqlSource;
    type Target = MssqlTarget;

    async fn connect_source(&self) -> Result<MssqlSource> {
        let client = connect(&self.source, &self.options).await?;
        Ok(MssqlSource::new(client))
    }

    async fn connect_target(&self) -> Result<MssqlTarget> {
        let client = connect(&self.destination, &self.options).await?;
        Ok(MssqlTarget::new(client))
    }
}

/// Build the tiberius configuration for `spec`.
pub fn build_config(spec: &DatabaseSpec, options: &ConnectionOptions) -> Result<Config> {
    let mut config = Config::new();
    config.host(&spec.host);
    config.port(spec.port);
    config.database(&spec.database);
    config.application_name("mssql-copydb");
    config.authentication(auth_method(spec)?);

    if options.encrypt {
        config.encryption(EncryptionLevel::Required);
    } else {
        config.encryption(EncryptionLevel::NotSupported);
    }
    if options.trust_server_cert {
        config.trust_cert();
    }

    Ok(config)
}

fn auth_method(spec: &DatabaseSpec) -> Result<AuthMethod> {
    match &spec.credentials {
        Some(credentials) => Ok(AuthMethod::sql_server(
            &credentials.username,
            &credentials.password,
        )),
        None => integrated_auth(spec),
    }
}

#[cfg(any(windows, all(unix, feature = "kerberos")))]
fn integrated_auth(_spec: &DatabaseSpec) -> Result<AuthMethod> {
    Ok(AuthMethod::Integrated)
}

#[cfg(not(any(windows, all(unix, feature = "kerberos"))))]
fn integrated_auth(spec: &DatabaseSpec) -> Result<AuthMethod> {
    Err(CopyError::Argument(format!(
        "{}: integrated authentication requires Windows or the 'kerberos' feature; \
         supply username and password",
        spec
    )))
}

/// Open a client for `spec`, bounded by the configured connect timeout.
pub async fn connect(spec: &DatabaseSpec, options: &ConnectionOptions) -> Result<MssqlClient> {
    let config = build_config(spec, options)?;
    let timeout = Duration::from_secs(options.connect_timeout_secs);
    let context = format!("connecting to {}", spec);

    let client = tokio::time::timeout(timeout, open(config))
        .await
        .map_err(|_| {
            CopyError::connection(
                context.clone(),
                tiberius::error::Error::Io {
                    kind: std::io::ErrorKind::TimedOut,
                    message: format!("no response within {}s", options.connect_timeout_secs),
                },
            )
        })?
        .map_err(|e| CopyError::connection(context, e))?;

    debug!("Connected to {}", spec);
    Ok(client)
}

async fn open(config: Config) -> std::result::Result<MssqlClient, tiberius::error::Error> {
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| tiberius::error::Error::Io {
            kind: e.kind(),
            message: e.to_string(),
        })?;

    tcp.set_nodelay(true).ok();

    Client::connect(config, tcp.compat_write()).await
}

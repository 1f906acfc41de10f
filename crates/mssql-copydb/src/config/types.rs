//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration structure.
///
/// Every section is optional in YAML; the endpoints are usually supplied on
/// the command line and merged in before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database to copy from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DatabaseSpec>,

    /// Database to create and copy into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<DatabaseSpec>,

    /// Transport settings shared by every connection.
    #[serde(default)]
    pub connection: ConnectionOptions,

    /// Copy behavior.
    #[serde(default)]
    pub copy: CopyConfig,

    /// Drop the destination database first if it exists (default: false).
    #[serde(default)]
    pub force: bool,
}

/// One SQL Server database endpoint.
///
/// Parsed from `server;database[;username;password]` where `server` is
/// `host` or `host,port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    /// Server host name or address.
    pub host: String,

    /// TCP port (default: 1433).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// SQL Server login. Integrated authentication is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

/// SQL Server login name and password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// TLS and timeout settings for tiberius connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Require an encrypted connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Accept the server certificate without validation (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Seconds allowed for TCP connect plus login (default: 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            encrypt: true,
            trust_server_cert: false,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Copy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Number of parallel workers, each with its own pair of connections (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Rows sent per bulk load (default: 10000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Rows between progress notifications and abort checks (default: 1000).
    #[serde(default = "default_notify_after")]
    pub notify_after: u64,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
            notify_after: default_notify_after(),
        }
    }
}

// Default value functions for serde
fn default_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    10_000
}

fn default_notify_after() -> u64 {
    1_000
}

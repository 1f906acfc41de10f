//! Configuration loading, endpoint parsing and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{CopyError, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl DatabaseSpec {
    /// Same server and login, different database.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }

    /// Whether integrated (Windows or Kerberos) authentication is used.
    pub fn is_integrated(&self) -> bool {
        self.credentials.is_none()
    }
}

impl FromStr for DatabaseSpec {
    type Err = CopyError;

    /// Parse `server;database[;username;password]`.
    ///
    /// Without a password part the login is integrated and a lone username is
    /// ignored. The password is everything after the third `;`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.splitn(4, ';').collect();
        let (server, database, credentials) = match parts.as_slice() {
            [server, database] | [server, database, _] => (*server, *database, None),
            [server, database, username, password] => {
                if username.trim().is_empty() {
                    return Err(CopyError::Argument(format!(
                        "'{}': username must not be empty",
                        s
                    )));
                }
                let credentials = Credentials {
                    username: username.trim().to_string(),
                    password: password.to_string(),
                };
                (*server, *database, Some(credentials))
            }
            _ => {
                return Err(CopyError::Argument(format!(
                    "'{}': expected server;database[;username;password]",
                    s
                )))
            }
        };

        let (host, port) = parse_server(server)?;
        let database = database.trim();
        if database.is_empty() {
            return Err(CopyError::Argument(format!(
                "'{}': database must not be empty",
                s
            )));
        }

        Ok(Self {
            host,
            port,
            database: database.to_string(),
            credentials,
        })
    }
}

/// Split `host[,port]`.
fn parse_server(server: &str) -> Result<(String, u16)> {
    let server = server.trim();
    let (host, port) = match server.split_once(',') {
        Some((host, port)) => {
            let port = port.trim().parse::<u16>().map_err(|_| {
                CopyError::Argument(format!("'{}': invalid port '{}'", server, port.trim()))
            })?;
            (host.trim(), port)
        }
        None => (server, 1433),
    };

    if host.is_empty() {
        return Err(CopyError::Argument("server must not be empty".into()));
    }
    if host.contains('\\') {
        return Err(CopyError::Argument(format!(
            "'{}': named instances are not supported, use host,port",
            server
        )));
    }
    Ok((host.to_string(), port))
}

impl fmt::Display for DatabaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}/{}", self.host, self.port, self.database)
    }
}

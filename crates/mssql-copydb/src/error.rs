//! Error types for the copy library.

use thiserror::Error;

/// Main error type for copy operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Malformed command-line argument (connection spec, option value).
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Configuration error (invalid YAML, out-of-range values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Introspection query failed or returned inconsistent rows
    #[error("Schema catalog error: {0}")]
    Catalog(String),

    /// A generated statement failed against the destination
    #[error("Statement failed: {source}\n  Statement: {statement}")]
    DdlExecution {
        statement: String,
        #[source]
        source: Box<CopyError>,
    },

    /// Bulk row transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Bulk row transfer stopped because the run was aborted
    #[error("Transfer of table {table} aborted after {rows} rows")]
    Aborted { table: String, rows: u64 },

    /// A connection could not be opened
    #[error("Connection error: {context}")]
    Connection {
        context: String,
        #[source]
        source: tiberius::error::Error,
    },

    /// Raw database driver error
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// A worker task panicked
    #[error("Worker failed: {0}")]
    Worker(String),

    /// Copy was cancelled (SIGINT, etc.)
    #[error("Copy cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CopyError {
    /// Create a Catalog error
    pub fn catalog(message: impl Into<String>) -> Self {
        CopyError::Catalog(message.into())
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        CopyError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Wrap an error raised while executing `statement`.
    pub fn ddl(statement: impl Into<String>, source: CopyError) -> Self {
        CopyError::DdlExecution {
            statement: statement.into(),
            source: Box::new(source),
        }
    }

    /// Create a Connection error with context about which endpoint failed
    pub fn connection(context: impl Into<String>, source: tiberius::error::Error) -> Self {
        CopyError::Connection {
            context: context.into(),
            source,
        }
    }

    /// Whether this error only reports that the run was already stopping.
    pub fn is_abort(&self) -> bool {
        matches!(self, CopyError::Aborted { .. } | CopyError::Cancelled)
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Argument(_) | CopyError::Config(_) => 1,
            CopyError::Cancelled => 130,
            _ => 2,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_error_keeps_statement_and_cause() {
        let err = CopyError::ddl(
            "CREATE TABLE [dbo].[T] ( [a] int NULL )",
            CopyError::Worker("boom".into()),
        );
        let detailed = err.format_detailed();
        assert!(detailed.contains("CREATE TABLE [dbo].[T]"));
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("boom"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CopyError::Argument("x".into()).exit_code(), 1);
        assert_eq!(CopyError::Config("x".into()).exit_code(), 1);
        assert_eq!(CopyError::Cancelled.exit_code(), 130);
        assert_eq!(CopyError::transfer("t", "m").exit_code(), 2);
        assert_eq!(CopyError::catalog("m").exit_code(), 2);
    }

    #[test]
    fn test_is_abort() {
        let aborted = CopyError::Aborted {
            table: "[dbo].[T]".into(),
            rows: 10,
        };
        assert!(aborted.is_abort());
        assert!(CopyError::Cancelled.is_abort());
        assert!(!CopyError::transfer("t", "m").is_abort());
    }
}

//! Configuration validation.

use super::{Config, DatabaseSpec};
use crate::error::{CopyError, Result};

/// Databases that must never be used as a copy destination.
const SYSTEM_DATABASES: &[&str] = &["master", "model", "msdb", "tempdb"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if let Some(source) = &config.source {
        validate_spec("source", source)?;
    }
    if let Some(destination) = &config.destination {
        validate_spec("destination", destination)?;
        if SYSTEM_DATABASES
            .iter()
            .any(|db| db.eq_ignore_ascii_case(&destination.database))
        {
            return Err(CopyError::Config(format!(
                "destination.database cannot be the system database '{}'",
                destination.database
            )));
        }
    }

    // Cannot copy a database onto itself
    if let (Some(source), Some(destination)) = (&config.source, &config.destination) {
        if source.host.eq_ignore_ascii_case(&destination.host)
            && source.port == destination.port
            && source.database.eq_ignore_ascii_case(&destination.database)
        {
            return Err(CopyError::Config(
                "source and destination cannot be the same database".into(),
            ));
        }
    }

    if config.copy.workers == 0 {
        return Err(CopyError::Config("copy.workers must be at least 1".into()));
    }
    if config.copy.batch_size == 0 {
        return Err(CopyError::Config(
            "copy.batch_size must be at least 1".into(),
        ));
    }
    if config.copy.notify_after == 0 {
        return Err(CopyError::Config(
            "copy.notify_after must be at least 1".into(),
        ));
    }
    if config.connection.connect_timeout_secs == 0 {
        return Err(CopyError::Config(
            "connection.connect_timeout_secs must be at least 1".into(),
        ));
    }

    Ok(())
}

fn validate_spec(section: &str, spec: &DatabaseSpec) -> Result<()> {
    if spec.host.is_empty() {
        return Err(CopyError::Config(format!("{}.host is required", section)));
    }
    if spec.host.contains('\\') {
        return Err(CopyError::Config(format!(
            "{}.host: named instances are not supported, set port instead",
            section
        )));
    }
    if spec.port == 0 {
        return Err(CopyError::Config(format!("{}.port must not be 0", section)));
    }
    if spec.database.is_empty() {
        return Err(CopyError::Config(format!(
            "{}.database is required",
            section
        )));
    }
    if let Some(credentials) = &spec.credentials {
        if credentials.username.is_empty() {
            return Err(CopyError::Config(format!(
                "{}.credentials.username is required",
                section
            )));
        }
    }
    Ok(())
}

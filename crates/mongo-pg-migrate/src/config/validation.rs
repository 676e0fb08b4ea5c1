//! Configuration validation rules.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate a parsed configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.source.r#type != "jsonl" {
        return Err(MigrateError::Config(format!(
            "Unsupported source type: {}",
            config.source.r#type
        )));
    }

    if config.target.r#type != "postgres" {
        return Err(MigrateError::Config(format!(
            "Unsupported target type: {}",
            config.target.r#type
        )));
    }

    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host must not be empty".into()));
    }

    if config.target.database.is_empty() {
        return Err(MigrateError::Config(
            "target.database must not be empty".into(),
        ));
    }

    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }

    if config.migration.checkpoint_interval == 0 {
        return Err(MigrateError::Config(
            "migration.checkpoint_interval must be at least 1".into(),
        ));
    }

    if config.migration.sample_size == 0 {
        return Err(MigrateError::Config(
            "migration.sample_size must be at least 1".into(),
        ));
    }

    Ok(())
}

//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Import validation
    if config.import.batch_size == 0 {
        return Err(MigrateError::Config(
            "import.batch_size must be at least 1".into(),
        ));
    }
    if let Some(name) = &config.import.serializer {
        if name.trim().is_empty() {
            return Err(MigrateError::Config(
                "import.serializer cannot be empty".into(),
            ));
        }
    }
    if let Some(name) = &config.import.plan {
        if name.trim().is_empty() {
            return Err(MigrateError::Config("import.plan cannot be empty".into()));
        }
    }

    // Export validation
    if let Some(name) = &config.export.serializer {
        if name.trim().is_empty() {
            return Err(MigrateError::Config(
                "export.serializer cannot be empty".into(),
            ));
        }
    }

    // CSV validation
    let delimiter = config.csv.delimiter.as_bytes();
    if delimiter.len() != 1 {
        return Err(MigrateError::Config(format!(
            "csv.delimiter must be a single byte, got '{}'",
            config.csv.delimiter
        )));
    }
    if matches!(delimiter[0], b'"' | b'\r' | b'\n') {
        return Err(MigrateError::Config(format!(
            "csv.delimiter cannot be {:?}",
            config.csv.delimiter
        )));
    }

    // Field selection validation
    if config.migration.fields.iter().any(|f| f.trim().is_empty()) {
        return Err(MigrateError::Config(
            "migration.fields cannot contain empty names".into(),
        ));
    }
    if let Some(overlap) = config
        .migration
        .fields
        .iter()
        .find(|f| config.migration.exclude.contains(f))
    {
        return Err(MigrateError::Config(format!(
            "'{}' is both selected in migration.fields and listed in migration.exclude",
            overlap
        )));
    }

    Ok(())
}

//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, inconsistent options, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No serializer registered under the requested name
    #[error("Serializer '{0}' could not be found.")]
    UnknownSerializer(String),

    /// No importation plan registered under the requested name
    #[error("Importation plan '{0}' could not be found.")]
    UnknownPlan(String),

    /// The plan inserts rows but the migration cannot create records
    #[error("Migration does not support creating new objects.")]
    UnableToCreate,

    /// The plan updates rows but the migration has no key to match them
    #[error("Migration does not support updating objects.")]
    UnableToUpdate,

    /// The migration has no importable fields or no write capability
    #[error("Migration does not allow imports.")]
    UnableToImport,

    /// The migration has no fields to export
    #[error("Migration does not allow exports.")]
    UnableToExport,

    /// A value could not be converted to the field's native type
    #[error("Cannot coerce {value:?} for field {field}: {message}")]
    Coercion {
        field: String,
        value: String,
        message: String,
    },

    /// A native value of the wrong dynamic type reached a field
    #[error("Field {field} expects {expected}, got {found}")]
    UnexpectedType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A natural key could not be mapped to a record of the related entity
    #[error("Unresolved foreign key for field {field}: no {entity} matches {value}")]
    UnresolvedForeignKey {
        field: String,
        entity: String,
        value: String,
    },

    /// Record store failure (uniqueness violation, unknown entity, etc.)
    #[error("Store error on {entity}: {message}")]
    Store { entity: String, message: String },

    /// Malformed serialized input
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading/writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Store error for an entity
    pub fn store(entity: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Store {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a Coercion error
    pub fn coercion(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::Coercion {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// Whether the error was raised before touching any stream or store.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MigrateError::Config(_)
                | MigrateError::UnknownSerializer(_)
                | MigrateError::UnknownPlan(_)
                | MigrateError::UnableToCreate
                | MigrateError::UnableToUpdate
                | MigrateError::UnableToImport
                | MigrateError::UnableToExport
        )
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

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

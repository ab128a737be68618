//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::serializers::{Quoting, DEFAULT_NONE_REPLACEMENT};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Field discovery for every migrated entity.
    #[serde(default)]
    pub migration: MigrationOptions,

    /// Import behavior.
    #[serde(default)]
    pub import: ImportOptions,

    /// Export behavior.
    #[serde(default)]
    pub export: ExportConfig,

    /// Parameters of the `csv` and `tsv` serializers.
    #[serde(default)]
    pub csv: CsvConfig,

    /// Parameters of the `json` serializer.
    #[serde(default)]
    pub json: JsonConfig,
}

/// How a migration discovers its fields from the entity schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Explicit attribute names or `__` paths; `pk` aliases the identity
    /// attribute. Empty means every attribute.
    #[serde(default)]
    pub fields: Vec<String>,

    /// Attribute names to leave out.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Drop the identity attribute when the entity has a natural key.
    #[serde(default)]
    pub use_natural_primary_keys: bool,

    /// Reference related entities by their natural key.
    #[serde(default)]
    pub use_natural_foreign_keys: bool,

    /// Drop rows whose natural foreign key matches nothing instead of
    /// failing the import.
    #[serde(default)]
    pub ignore_missing_foreign_keys: bool,
}

impl MigrationOptions {
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn natural_keys(mut self) -> Self {
        self.use_natural_primary_keys = true;
        self.use_natural_foreign_keys = true;
        self
    }

    #[must_use]
    pub fn natural_foreign_keys(mut self) -> Self {
        self.use_natural_foreign_keys = true;
        self
    }

    #[must_use]
    pub fn ignore_missing_foreign_keys(mut self) -> Self {
        self.ignore_missing_foreign_keys = true;
        self
    }
}

/// Options of one import call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Serializer name (default: json).
    #[serde(default)]
    pub serializer: Option<String>,

    /// Importation plan name (default: picked from the migration's
    /// capabilities).
    #[serde(default)]
    pub plan: Option<String>,

    /// Rows per batch (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            serializer: None,
            plan: None,
            batch_size: default_batch_size(),
        }
    }
}

impl ImportOptions {
    #[must_use]
    pub fn with_serializer(mut self, name: impl Into<String>) -> Self {
        self.serializer = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_plan(mut self, name: impl Into<String>) -> Self {
        self.plan = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Export configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Serializer name (default: json).
    #[serde(default)]
    pub serializer: Option<String>,
}

/// Delimited text parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvConfig {
    /// Single-byte field delimiter of the `csv` serializer (default: ",").
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Quoting rule (default: minimal).
    #[serde(default)]
    pub quoting: Quoting,

    /// Null token (default: `\N`); `null` in YAML disables it.
    #[serde(default = "default_none_replacement")]
    pub none_replacement: Option<String>,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            quoting: Quoting::default(),
            none_replacement: default_none_replacement(),
        }
    }
}

/// JSON parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonConfig {
    /// Row line prefix (default: empty); `null` writes a single line.
    #[serde(default = "default_indent")]
    pub indent: Option<String>,

    #[serde(default)]
    pub none_replacement: Option<String>,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            none_replacement: None,
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_none_replacement() -> Option<String> {
    Some(DEFAULT_NONE_REPLACEMENT.to_string())
}

fn default_indent() -> Option<String> {
    Some(String::new())
}

//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use crate::serializers::CsvSerializer;
use std::path::Path;

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

impl CsvConfig {
    /// Build the `csv` serializer these parameters describe.
    pub fn serializer(&self) -> CsvSerializer {
        let mut serializer = CsvSerializer::new()
            .with_quoting(self.quoting)
            .with_none_replacement(self.none_replacement.clone());
        if let [delimiter] = self.delimiter.as_bytes() {
            serializer = serializer.with_delimiter(*delimiter);
        }
        serializer
    }
}

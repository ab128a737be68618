//! YAML list of mappings.

use std::io::{Read, Write};

use serde_yaml::{Mapping, Value as YamlValue};

use crate::core::{Cell, DataType, Value};
use crate::error::{MigrateError, Result};

use super::{check_row_len, RowIter, Serializer};

const NATIVE_DATA_TYPES: &[DataType] = &[
    DataType::Text,
    DataType::Integer,
    DataType::Float,
    DataType::Boolean,
];

/// YAML serializer.
///
/// Rows are emitted one sequence item at a time, so the output never holds
/// more than one row in memory. Lines are not wrapped.
#[derive(Debug, Clone, Default)]
pub struct YamlSerializer {
    none_replacement: Option<String>,
}

impl YamlSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_none_replacement(mut self, token: Option<String>) -> Self {
        self.none_replacement = token;
        self
    }

    fn encode(value: &Value) -> YamlValue {
        match value {
            Value::Null => YamlValue::Null,
            Value::Bool(v) => YamlValue::Bool(*v),
            Value::Int(v) => YamlValue::Number((*v).into()),
            Value::Float(v) => YamlValue::Number((*v).into()),
            other => YamlValue::String(other.to_string()),
        }
    }

    fn decode(value: YamlValue) -> Value {
        match value {
            YamlValue::Null => Value::Null,
            YamlValue::Bool(v) => Value::Bool(v),
            YamlValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            YamlValue::String(s) => Value::Text(s),
            YamlValue::Tagged(tagged) => Self::decode(tagged.value),
            nested => Value::Text(serde_yaml::to_string(&nested).unwrap_or_default()),
        }
    }
}

impl Serializer for YamlSerializer {
    fn name(&self) -> &str {
        "yaml"
    }

    fn exportation_data_types(&self) -> &[DataType] {
        NATIVE_DATA_TYPES
    }

    fn importation_data_types(&self) -> &[DataType] {
        NATIVE_DATA_TYPES
    }

    fn none_replacement(&self) -> Option<&str> {
        self.none_replacement.as_deref()
    }

    fn dump(
        &self,
        headers: &[String],
        rows: &mut dyn Iterator<Item = Result<Vec<Value>>>,
        writer: &mut dyn Write,
    ) -> Result<()> {
        let mut empty = true;
        for row in rows {
            let row = row?;
            check_row_len(headers, &row)?;
            let mut mapping = Mapping::new();
            for (header, value) in headers.iter().zip(&row) {
                mapping.insert(YamlValue::String(header.clone()), Self::encode(value));
            }
            // A one-item sequence renders as `- key: value` lines, so the
            // concatenation of items is itself a valid sequence.
            let item = serde_yaml::to_string(&[mapping])?;
            writer.write_all(item.as_bytes())?;
            empty = false;
        }
        if empty {
            writer.write_all(b"[]\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    fn load<'a>(&self, headers: &[String], mut reader: Box<dyn Read + 'a>) -> Result<RowIter<'a>> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        if text.trim().is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }

        let document: YamlValue = serde_yaml::from_str(&text)?;
        let items = match document {
            YamlValue::Sequence(items) => items,
            YamlValue::Null => Vec::new(),
            _ => {
                return Err(MigrateError::Serialization(
                    "YAML document is not a list of mappings".into(),
                ))
            }
        };
        let headers = headers.to_vec();

        Ok(Box::new(items.into_iter().map(move |item| -> Result<Vec<Cell>> {
            let YamlValue::Mapping(mut mapping) = item else {
                return Err(MigrateError::Serialization(
                    "YAML list item is not a mapping".into(),
                ));
            };
            Ok(headers
                .iter()
                .map(|header| match mapping.remove(header.as_str()) {
                    Some(value) => Cell::Present(Self::decode(value)),
                    None => Cell::Absent,
                })
                .collect())
        })))
    }
}

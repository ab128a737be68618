//! JSON array of objects.

use std::io::{Read, Write};

use crate::core::{Cell, DataType, Value};
use crate::error::{MigrateError, Result};

use super::{check_row_len, RowIter, Serializer};

const NATIVE_DATA_TYPES: &[DataType] = &[
    DataType::Text,
    DataType::Integer,
    DataType::Float,
    DataType::Boolean,
];

const ITEM_SEPARATOR: &str = ", ";
const KEY_SEPARATOR: &str = ": ";

/// JSON serializer.
///
/// With the default empty indent each row object sits on its own line:
///
/// ```text
/// [
/// {"id": 1, "name": "Alice"},
/// {"id": 2, "name": "Bob"}
/// ]
/// ```
///
/// Without indent the whole array is written on one line. Non-ASCII text
/// is written as is.
#[derive(Debug, Clone)]
pub struct JsonSerializer {
    indent: Option<String>,
    none_replacement: Option<String>,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self {
            indent: Some(String::new()),
            none_replacement: None,
        }
    }

    /// Prefix of each row line; `None` writes a single line.
    #[must_use]
    pub fn with_indent(mut self, indent: Option<String>) -> Self {
        self.indent = indent;
        self
    }

    #[must_use]
    pub fn with_none_replacement(mut self, token: Option<String>) -> Self {
        self.none_replacement = token;
        self
    }

    fn encode(value: &Value) -> Result<String> {
        let json = match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    MigrateError::Serialization(format!("{} cannot be written as JSON", v))
                })?,
            other => serde_json::Value::String(other.to_string()),
        };
        Ok(serde_json::to_string(&json)?)
    }

    fn decode(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(v),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Text(s),
            nested => Value::Text(nested.to_string()),
        }
    }
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
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
        let (newline_indent, row_separator) = match &self.indent {
            Some(indent) => (format!("\n{}", indent), ITEM_SEPARATOR.trim_end()),
            None => (String::new(), ITEM_SEPARATOR),
        };
        let keys = headers
            .iter()
            .map(|h| serde_json::to_string(h))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        writer.write_all(b"[")?;
        let mut first_row = true;
        for row in rows {
            let row = row?;
            check_row_len(headers, &row)?;
            if !first_row {
                writer.write_all(row_separator.as_bytes())?;
            }
            writer.write_all(newline_indent.as_bytes())?;
            writer.write_all(b"{")?;
            for (i, (key, value)) in keys.iter().zip(&row).enumerate() {
                if i > 0 {
                    writer.write_all(ITEM_SEPARATOR.as_bytes())?;
                }
                writer.write_all(key.as_bytes())?;
                writer.write_all(KEY_SEPARATOR.as_bytes())?;
                writer.write_all(Self::encode(value)?.as_bytes())?;
            }
            writer.write_all(b"}")?;
            first_row = false;
        }
        if self.indent.is_some() {
            writer.write_all(b"\n")?;
        }
        writer.write_all(b"]")?;
        writer.flush()?;
        Ok(())
    }

    fn load<'a>(&self, headers: &[String], reader: Box<dyn Read + 'a>) -> Result<RowIter<'a>> {
        let objects: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_reader(reader)?;
        let headers = headers.to_vec();

        Ok(Box::new(objects.into_iter().map(move |mut object| -> Result<Vec<Cell>> {
            Ok(headers
                .iter()
                .map(|header| match object.remove(header) {
                    Some(value) => Cell::Present(Self::decode(value)),
                    None => Cell::Absent,
                })
                .collect())
        })))
    }
}

//! Serialization formats.
//!
//! A [`Serializer`] turns an ordered header list plus positionally aligned
//! rows into a byte stream and back. It knows nothing about fields: values
//! arrive already converted to the data types the format carries natively,
//! everything else as text.
//!
//! - **csv** / **tsv**: [`CsvSerializer`] in `csv.rs`
//! - **json**: [`JsonSerializer`] in `json.rs`
//! - **yaml**: [`YamlSerializer`] in `yaml.rs`

mod csv;
mod json;
mod yaml;

pub use self::csv::{CsvSerializer, Quoting, DEFAULT_NONE_REPLACEMENT};
pub use self::json::JsonSerializer;
pub use self::yaml::YamlSerializer;

use std::io::{Read, Write};

use crate::core::{Cell, DataType, Value};
use crate::error::{MigrateError, Result};

/// Lazy sequence of deserialized rows aligned to the requested headers.
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Vec<Cell>>> + 'a>;

/// Trait for serialization formats.
///
/// # Thread Safety
///
/// Serializers hold only format parameters and are shared behind `Arc`
/// by the [`Catalog`](crate::core::Catalog), so they must be `Send + Sync`.
pub trait Serializer: Send + Sync {
    /// Registry name, also used as file extension by the directory facade.
    fn name(&self) -> &str;

    /// Data types written without stringification.
    fn exportation_data_types(&self) -> &[DataType];

    /// Data types read without string parsing.
    fn importation_data_types(&self) -> &[DataType];

    /// Token standing for null in both directions, if the format needs one.
    fn none_replacement(&self) -> Option<&str>;

    /// Write `headers` and then every row of `rows`.
    fn dump(
        &self,
        headers: &[String],
        rows: &mut dyn Iterator<Item = Result<Vec<Value>>>,
        writer: &mut dyn Write,
    ) -> Result<()>;

    /// Read rows from `reader`, one [`Cell`] per requested header.
    ///
    /// Headers missing from the source produce [`Cell::Absent`].
    fn load<'a>(&self, headers: &[String], reader: Box<dyn Read + 'a>) -> Result<RowIter<'a>>;

    fn exports_natively(&self, data_type: DataType) -> bool {
        self.exportation_data_types().contains(&data_type)
    }

    fn imports_natively(&self, data_type: DataType) -> bool {
        self.importation_data_types().contains(&data_type)
    }

    /// Dump to a string.
    fn dumps(&self, headers: &[String], rows: Vec<Vec<Value>>) -> Result<String> {
        let mut buffer = Vec::new();
        let mut rows = rows.into_iter().map(Ok::<Vec<Value>, MigrateError>);
        self.dump(headers, &mut rows, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MigrateError::Serialization(e.to_string()))
    }

    /// Load from a string.
    fn loads<'a>(&self, headers: &[String], text: &'a str) -> Result<RowIter<'a>> {
        self.load(headers, Box::new(text.as_bytes()))
    }
}

/// Reject a row whose length differs from the header list.
pub(crate) fn check_row_len(headers: &[String], row: &[Value]) -> Result<()> {
    if row.len() != headers.len() {
        return Err(MigrateError::Serialization(format!(
            "row has {} values for {} headers",
            row.len(),
            headers.len()
        )));
    }
    Ok(())
}

/// Input of an import: raw text, raw bytes or an open reader.
pub enum Source<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
    Reader(Box<dyn Read + 'a>),
}

impl<'a> Source<'a> {
    /// Wrap any reader.
    pub fn reader(reader: impl Read + 'a) -> Self {
        Source::Reader(Box::new(reader))
    }

    pub fn into_reader(self) -> Box<dyn Read + 'a> {
        match self {
            Source::Text(text) => Box::new(text.as_bytes()),
            Source::Bytes(bytes) => Box::new(bytes),
            Source::Reader(reader) => reader,
        }
    }
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(text: &'a str) -> Self {
        Source::Text(text)
    }
}

impl<'a> From<&'a String> for Source<'a> {
    fn from(text: &'a String) -> Self {
        Source::Text(text)
    }
}

impl<'a> From<&'a [u8]> for Source<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Source::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Source<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Source::Bytes(bytes)
    }
}

impl From<std::fs::File> for Source<'static> {
    fn from(file: std::fs::File) -> Self {
        Source::reader(std::io::BufReader::new(file))
    }
}

/// Map a header request onto the columns found in the source.
///
/// Returns one source position per requested header; identical header lists
/// map straight through.
pub(crate) fn column_positions(requested: &[String], stored: &[String]) -> Vec<Option<usize>> {
    if requested == stored {
        return (0..requested.len()).map(Some).collect();
    }
    requested
        .iter()
        .map(|header| stored.iter().position(|s| s == header))
        .collect()
}

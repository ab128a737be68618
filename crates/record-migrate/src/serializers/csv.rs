//! Delimited text (CSV, TSV).

use std::io::{Read, Write};

use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::core::{Cell, DataType, Value};
use crate::error::Result;

use super::{check_row_len, column_positions, RowIter, Serializer};

const EXPORTATION_DATA_TYPES: &[DataType] = &[DataType::Text, DataType::Integer, DataType::Float];
const IMPORTATION_DATA_TYPES: &[DataType] = &[DataType::Text];

/// Default null token, the same one `COPY` uses.
pub const DEFAULT_NONE_REPLACEMENT: &str = "\\N";

/// When fields are wrapped in quote characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quoting {
    /// Only fields containing the delimiter, quote or line breaks.
    #[default]
    Minimal,
    /// Every field that does not look like a number.
    NonNumeric,
    /// Every field.
    All,
}

impl Quoting {
    fn style(self) -> QuoteStyle {
        match self {
            Quoting::Minimal => QuoteStyle::Necessary,
            Quoting::NonNumeric => QuoteStyle::NonNumeric,
            Quoting::All => QuoteStyle::Always,
        }
    }
}

/// CSV serializer; the header line comes first and every value is text on
/// the way back in.
///
/// # Example
///
/// ```rust
/// use record_migrate::core::Value;
/// use record_migrate::serializers::{CsvSerializer, Serializer};
///
/// let csv = CsvSerializer::new();
/// let headers = vec!["id".to_string(), "name".to_string()];
/// let text = csv.dumps(&headers, vec![vec![Value::Int(1), Value::from("Alice")]])?;
/// assert_eq!(text, "id,name\r\n1,Alice\r\n");
/// # Ok::<(), record_migrate::MigrateError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CsvSerializer {
    name: String,
    delimiter: u8,
    quote: u8,
    quoting: Quoting,
    none_replacement: Option<String>,
}

impl CsvSerializer {
    /// Comma separated, minimal quoting, `\N` for null.
    pub fn new() -> Self {
        Self {
            name: "csv".to_string(),
            delimiter: b',',
            quote: b'"',
            quoting: Quoting::Minimal,
            none_replacement: Some(DEFAULT_NONE_REPLACEMENT.to_string()),
        }
    }

    /// Tab separated variant registered as `tsv`.
    pub fn tsv() -> Self {
        Self::new().with_name("tsv").with_delimiter(b'\t')
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    #[must_use]
    pub fn with_quoting(mut self, quoting: Quoting) -> Self {
        self.quoting = quoting;
        self
    }

    #[must_use]
    pub fn with_none_replacement(mut self, token: Option<String>) -> Self {
        self.none_replacement = token;
        self
    }

    fn cells(record: &StringRecord, positions: &[Option<usize>]) -> Vec<Cell> {
        positions
            .iter()
            .map(|position| match position.and_then(|i| record.get(i)) {
                Some(text) => Cell::Present(Value::Text(text.to_string())),
                None => Cell::Absent,
            })
            .collect()
    }
}

impl Default for CsvSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer for CsvSerializer {
    fn name(&self) -> &str {
        &self.name
    }

    fn exportation_data_types(&self) -> &[DataType] {
        EXPORTATION_DATA_TYPES
    }

    fn importation_data_types(&self) -> &[DataType] {
        IMPORTATION_DATA_TYPES
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
        let mut out = WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(true)
            .quote_style(self.quoting.style())
            .terminator(Terminator::CRLF)
            .from_writer(writer);

        out.write_record(headers)?;
        for row in rows {
            let row = row?;
            check_row_len(headers, &row)?;
            out.write_record(row.iter().map(ToString::to_string))?;
        }
        out.flush()?;
        Ok(())
    }

    fn load<'a>(&self, headers: &[String], reader: Box<dyn Read + 'a>) -> Result<RowIter<'a>> {
        let reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(true)
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = reader.into_records();
        let stored: Vec<String> = match records.next() {
            Some(first) => first?.iter().map(str::to_string).collect(),
            None => return Ok(Box::new(std::iter::empty())),
        };
        let positions = column_positions(headers, &stored);

        Ok(Box::new(records.map(move |record| -> Result<Vec<Cell>> {
            let record = record?;
            Ok(Self::cells(&record, &positions))
        })))
    }
}

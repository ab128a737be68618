//! Value types carried between fields, serializers and record stores.
//!
//! [`Value`] is both the native representation of a record attribute and the
//! external representation handed to serializers; serializers only ever see
//! the subset of variants listed in their exportation data types.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;

use super::temporal;

/// A single attribute value.
///
/// Floats compare and hash by bit pattern so that values can be used as
/// lookup keys. Both zeros are one key, and so are all `NaN`s.
///
/// # Example
///
/// ```rust
/// use record_migrate::core::Value;
///
/// let id = Value::from(7i64);
/// assert_eq!(id, Value::Int(7));
/// assert_eq!(Value::from("Pets").to_string(), "Pets");
/// assert!(Value::Null.is_null());
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// Missing value.
    Null,

    Bool(bool),

    Int(i64),

    Float(f64),

    Text(String),

    /// Exact decimal value.
    Decimal(Decimal),

    Date(NaiveDate),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with a UTC offset.
    DateTimeTz(DateTime<FixedOffset>),

    /// Time of day without timezone.
    Time(NaiveTime),

    /// A bare UTC offset, as produced by the `tzinfo` attribute.
    TimeZone(FixedOffset),
}

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Decimal(_) => "decimal",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::DateTimeTz(_) => "datetime",
            Value::Time(_) => "time",
            Value::TimeZone(_) => "timezone",
        }
    }

    /// Borrow the text payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Resolve a derived attribute of a temporal value.
    ///
    /// Supported attributes are `year`, `month`, `day`, `hour`, `minute`,
    /// `second`, `microsecond`, `date`, `time` and `tzinfo`. Anything else,
    /// or an attribute the variant does not carry, yields `None`.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        let date = match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::DateTimeTz(dt) => Some(dt.date_naive()),
            _ => None,
        };
        let time = match self {
            Value::Time(t) => Some(*t),
            Value::DateTime(dt) => Some(dt.time()),
            Value::DateTimeTz(dt) => Some(dt.time()),
            _ => None,
        };

        match name {
            "year" => date.map(|d| Value::Int(i64::from(d.year()))),
            "month" => date.map(|d| Value::Int(i64::from(d.month()))),
            "day" => date.map(|d| Value::Int(i64::from(d.day()))),
            "hour" => time.map(|t| Value::Int(i64::from(t.hour()))),
            "minute" => time.map(|t| Value::Int(i64::from(t.minute()))),
            "second" => time.map(|t| Value::Int(i64::from(t.second()))),
            "microsecond" => {
                time.map(|t| Value::Int(i64::from((t.nanosecond() % 1_000_000_000) / 1_000)))
            }
            "date" => match self {
                Value::DateTime(_) | Value::DateTimeTz(_) => date.map(Value::Date),
                _ => None,
            },
            "time" => match self {
                Value::DateTime(_) | Value::DateTimeTz(_) => time.map(Value::Time),
                _ => None,
            },
            "tzinfo" => match self {
                Value::DateTimeTz(dt) => Some(Value::TimeZone(*dt.offset())),
                Value::DateTime(_) | Value::Time(_) => Some(Value::Null),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Text form used whenever a value has to travel as a string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            // Debug keeps the trailing `.0` on integral floats.
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Text(v) => f.write_str(v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Date(v) => f.write_str(&temporal::format_date(v)),
            Value::DateTime(v) => f.write_str(&temporal::format_datetime(v)),
            Value::DateTimeTz(v) => f.write_str(&temporal::format_datetime_tz(v)),
            Value::Time(v) => f.write_str(&temporal::format_time(v)),
            Value::TimeZone(v) => f.write_str(&temporal::format_offset(v)),
        }
    }
}

/// Bit pattern of a float used for equality and hashing.
fn float_key(v: f64) -> u64 {
    if v == 0.0 {
        0
    } else if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_key(*a) == float_key(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::DateTimeTz(a), Value::DateTimeTz(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::TimeZone(a), Value::TimeZone(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => float_key(*v).hash(state),
            Value::Text(v) => v.hash(state),
            Value::Decimal(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::DateTime(v) => v.hash(state),
            Value::DateTimeTz(v) => v.hash(state),
            Value::Time(v) => v.hash(state),
            Value::TimeZone(v) => v.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTimeTz(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One deserialized column of a source row.
///
/// `Absent` means the column does not exist in the source at all and must
/// be left out of the row; a null column is `Present(Value::Null)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Present(Value),
    Absent,
}

impl Cell {
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Cell::Absent)
    }

    /// Convert into the carried value, `None` when absent.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Cell::Present(value) => Some(value),
            Cell::Absent => None,
        }
    }
}

impl From<Value> for Cell {
    fn from(v: Value) -> Self {
        Cell::Present(v)
    }
}

/// Attribute name to value mapping for one record.
pub type Row = BTreeMap<String, Value>;

/// Build a [`Row`] from `(attribute, value)` pairs.
pub fn row<K, V, I>(pairs: I) -> Row
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A materialized record: its own stored values plus related records
/// reachable through relation attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub values: Row,
    pub related: BTreeMap<String, Record>,
}

impl Record {
    pub fn new(values: Row) -> Self {
        Self {
            values,
            related: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_related(mut self, name: impl Into<String>, record: Record) -> Self {
        self.related.insert(name.into(), record);
        self
    }

    /// Resolve a `__`-separated path by successive attribute hops.
    ///
    /// Inner hops walk related records, then stored values, then derived
    /// attributes of temporal values. The last hop always reads a value, so
    /// a path never resolves to a whole record. Any missing hop yields `None`.
    pub fn resolve(&self, path: &str) -> Option<Value> {
        let hops: Vec<&str> = path.split("__").collect();
        let mut record = self;
        let mut current: Option<Value> = None;

        for (i, hop) in hops.iter().enumerate() {
            let last = i + 1 == hops.len();
            current = match current {
                None => match record.related.get(*hop) {
                    Some(next) if !last => {
                        record = next;
                        None
                    }
                    _ => Some(record.values.get(*hop)?.clone()),
                },
                Some(value) => Some(value.attribute(hop)?),
            };
        }

        current
    }
}

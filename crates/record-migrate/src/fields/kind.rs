//! Per-kind coercion rules.

use std::str::FromStr;

use chrono::NaiveTime;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::temporal;
use crate::core::{DataType, Value};
use crate::error::{MigrateError, Result};

const TRUE_TOKENS: [&str; 4] = ["true", "yes", "on", "1"];
const FALSE_TOKENS: [&str; 4] = ["false", "no", "off", "0"];

/// The type of a [`Field`](super::Field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Boolean,
    Integer,
    Float,
    Text,
    Date,
    DateTime,
    Time,
    /// Day of month of a date or datetime.
    Day,
    Month,
    Year,
    /// Hour of a time or datetime.
    Hour,
    Minute,
    Second,
    Microsecond,
    /// UTC offset of an aware datetime, rendered `Z` or `±HH:MM`.
    TimeZone,
    Decimal,
    /// Decimal travelling as a plain number.
    Number,
    /// Stored file reference, carried as its name.
    File,
}

impl FieldKind {
    /// Field kind used for a schema attribute of the given type.
    pub fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Text => FieldKind::Text,
            DataType::Integer => FieldKind::Integer,
            DataType::Float => FieldKind::Float,
            DataType::Boolean => FieldKind::Boolean,
            DataType::Date => FieldKind::Date,
            DataType::DateTime => FieldKind::DateTime,
            DataType::Time => FieldKind::Time,
            DataType::Decimal => FieldKind::Number,
        }
    }

    /// Field kind of a derived temporal attribute (`year`, `tzinfo`, ...).
    pub fn for_attribute(name: &str) -> Option<Self> {
        let kind = match name {
            "date" => FieldKind::Date,
            "time" => FieldKind::Time,
            "year" => FieldKind::Year,
            "month" => FieldKind::Month,
            "day" => FieldKind::Day,
            "hour" => FieldKind::Hour,
            "minute" => FieldKind::Minute,
            "second" => FieldKind::Second,
            "microsecond" => FieldKind::Microsecond,
            "tzinfo" => FieldKind::TimeZone,
            _ => return None,
        };
        Some(kind)
    }

    pub fn data_type(self) -> DataType {
        match self {
            FieldKind::Boolean => DataType::Boolean,
            FieldKind::Integer
            | FieldKind::Day
            | FieldKind::Month
            | FieldKind::Year
            | FieldKind::Hour
            | FieldKind::Minute
            | FieldKind::Second
            | FieldKind::Microsecond => DataType::Integer,
            FieldKind::Float | FieldKind::Number => DataType::Float,
            FieldKind::Text | FieldKind::TimeZone | FieldKind::File => DataType::Text,
            FieldKind::Date => DataType::Date,
            FieldKind::DateTime => DataType::DateTime,
            FieldKind::Time => DataType::Time,
            FieldKind::Decimal => DataType::Decimal,
        }
    }

    fn expected(self) -> &'static str {
        match self {
            FieldKind::Boolean => "a boolean",
            FieldKind::Integer => "an integer",
            FieldKind::Float => "a float",
            FieldKind::Text | FieldKind::File => "text",
            FieldKind::Date => "a date",
            FieldKind::DateTime => "a datetime",
            FieldKind::Time => "a time",
            FieldKind::Day | FieldKind::Month | FieldKind::Year => "a date",
            FieldKind::Hour | FieldKind::Minute | FieldKind::Second | FieldKind::Microsecond => {
                "a time"
            }
            FieldKind::TimeZone => "an aware datetime",
            FieldKind::Decimal | FieldKind::Number => "a decimal",
        }
    }

    fn component(self) -> Option<&'static str> {
        match self {
            FieldKind::Day => Some("day"),
            FieldKind::Month => Some("month"),
            FieldKind::Year => Some("year"),
            FieldKind::Hour => Some("hour"),
            FieldKind::Minute => Some("minute"),
            FieldKind::Second => Some("second"),
            FieldKind::Microsecond => Some("microsecond"),
            _ => None,
        }
    }

    /// Normalize an already-native value.
    pub(crate) fn clean(self, field: &str, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let unexpected = |value: &Value| MigrateError::UnexpectedType {
            field: field.to_string(),
            expected: self.expected(),
            found: value.type_name(),
        };

        let cleaned = match (self, value) {
            (FieldKind::Boolean, Value::Bool(v)) => Value::Bool(v),
            (FieldKind::Boolean, Value::Int(v)) => Value::Bool(v != 0),
            (FieldKind::Boolean, Value::Float(v)) => Value::Bool(v != 0.0),
            (FieldKind::Boolean, Value::Decimal(v)) => Value::Bool(!v.is_zero()),

            (FieldKind::Integer, Value::Int(v)) => Value::Int(v),
            (FieldKind::Integer, Value::Bool(v)) => Value::Int(i64::from(v)),
            (FieldKind::Integer, Value::Float(v)) => match v.trunc().to_i64() {
                Some(i) if v.is_finite() => Value::Int(i),
                _ => return Err(MigrateError::coercion(field, v.to_string(), "out of range")),
            },
            (FieldKind::Integer, Value::Decimal(v)) => match v.trunc().to_i64() {
                Some(i) => Value::Int(i),
                None => return Err(MigrateError::coercion(field, v.to_string(), "out of range")),
            },
            (FieldKind::Integer, Value::Text(s)) => parse_integer(field, &s)?,

            (FieldKind::Float, Value::Float(v)) => Value::Float(v),
            (FieldKind::Float, Value::Int(v)) => Value::Float(v as f64),
            (FieldKind::Float, Value::Bool(v)) => Value::Float(if v { 1.0 } else { 0.0 }),
            (FieldKind::Float, Value::Decimal(v)) => match v.to_f64() {
                Some(f) => Value::Float(f),
                None => return Err(MigrateError::coercion(field, v.to_string(), "out of range")),
            },
            (FieldKind::Float, Value::Text(s)) => parse_float(field, &s)?,

            (FieldKind::Text | FieldKind::File, Value::Text(s)) => Value::Text(s),
            (FieldKind::Text | FieldKind::File, other) => Value::Text(other.to_string()),

            (FieldKind::Date, Value::Date(d)) => Value::Date(d),
            (FieldKind::Date, Value::DateTime(dt)) => Value::Date(dt.date()),
            (FieldKind::Date, Value::DateTimeTz(dt)) => Value::Date(dt.date_naive()),

            (FieldKind::DateTime, Value::DateTime(dt)) => Value::DateTime(dt),
            (FieldKind::DateTime, Value::DateTimeTz(dt)) => Value::DateTimeTz(dt),
            (FieldKind::DateTime, Value::Date(d)) => Value::DateTime(d.and_time(NaiveTime::MIN)),

            (FieldKind::Time, Value::Time(t)) => Value::Time(t),
            (FieldKind::Time, Value::DateTime(dt)) => Value::Time(dt.time()),
            (FieldKind::Time, Value::DateTimeTz(dt)) => Value::Time(dt.time()),

            (FieldKind::TimeZone, Value::TimeZone(offset)) => Value::TimeZone(offset),
            (FieldKind::TimeZone, Value::DateTimeTz(dt)) => Value::TimeZone(*dt.offset()),
            (FieldKind::TimeZone, Value::DateTime(_) | Value::Time(_)) => Value::Null,

            (FieldKind::Decimal | FieldKind::Number, Value::Decimal(d)) => Value::Decimal(d),
            (FieldKind::Decimal | FieldKind::Number, Value::Int(i)) => Value::Decimal(i.into()),
            (FieldKind::Decimal | FieldKind::Number, Value::Float(f)) => decimal_from_float(field, f)?,
            (FieldKind::Decimal | FieldKind::Number, Value::Text(s)) => parse_decimal(field, &s)?,

            (kind, Value::Int(i)) if kind.component().is_some() => Value::Int(i),
            (kind, value) => match kind.component() {
                Some(name) => match value.attribute(name) {
                    Some(component) if !component.is_null() => component,
                    _ => return Err(unexpected(&value)),
                },
                None => return Err(unexpected(&value)),
            },
        };
        Ok(cleaned)
    }

    /// Render a cleaned, non-null value as text.
    pub(crate) fn to_text(self, value: &Value) -> Value {
        Value::Text(value.to_string())
    }

    /// Parse text produced by [`FieldKind::to_text`] or an equivalent source.
    pub(crate) fn from_text(self, field: &str, text: &str) -> Result<Value> {
        match self {
            FieldKind::Boolean => Ok(parse_boolean(text)),
            FieldKind::Integer
            | FieldKind::Day
            | FieldKind::Month
            | FieldKind::Year
            | FieldKind::Hour
            | FieldKind::Minute
            | FieldKind::Second
            | FieldKind::Microsecond => parse_integer(field, text),
            FieldKind::Float => parse_float(field, text),
            FieldKind::Text | FieldKind::File => Ok(Value::Text(text.to_string())),
            FieldKind::Date => temporal::parse_date(text)
                .map(Value::Date)
                .ok_or_else(|| MigrateError::coercion(field, text, "expected YYYY-MM-DD")),
            FieldKind::DateTime => temporal::parse_datetime(text).ok_or_else(|| {
                MigrateError::coercion(field, text, "expected an ISO-8601 datetime")
            }),
            FieldKind::Time => temporal::parse_time(text)
                .map(Value::Time)
                .ok_or_else(|| MigrateError::coercion(field, text, "expected HH:MM[:SS[.ffffff]]")),
            FieldKind::TimeZone => temporal::parse_offset(text)
                .map(Value::TimeZone)
                .ok_or_else(|| MigrateError::coercion(field, text, "expected Z or ±HH:MM")),
            FieldKind::Decimal | FieldKind::Number => parse_decimal(field, text),
        }
    }
}

/// Case-insensitive boolean token; unknown tokens are null.
fn parse_boolean(text: &str) -> Value {
    let token = text.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Value::Bool(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Value::Bool(false)
    } else {
        Value::Null
    }
}

fn parse_integer(field: &str, text: &str) -> Result<Value> {
    text.trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|e| MigrateError::coercion(field, text, e.to_string()))
}

fn parse_float(field: &str, text: &str) -> Result<Value> {
    text.trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|e| MigrateError::coercion(field, text, e.to_string()))
}

fn parse_decimal(field: &str, text: &str) -> Result<Value> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map(Value::Decimal)
        .map_err(|e| MigrateError::coercion(field, text, e.to_string()))
}

/// Build a decimal from the shortest text form of a float so that `0.1`
/// becomes exactly `0.1`.
fn decimal_from_float(field: &str, value: f64) -> Result<Value> {
    if !value.is_finite() {
        return Err(MigrateError::coercion(field, value.to_string(), "not a finite number"));
    }
    match parse_decimal(field, &value.to_string()) {
        Ok(decimal) => Ok(decimal),
        Err(_) => Decimal::from_f64(value)
            .map(Value::Decimal)
            .ok_or_else(|| MigrateError::coercion(field, value.to_string(), "out of range")),
    }
}

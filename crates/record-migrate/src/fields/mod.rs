//! Typed columns.
//!
//! A [`Field`] converts one attribute between its native [`Value`] and the
//! external representation a [`Serializer`] can carry. Export cleans the
//! native value, stringifies it when the serializer cannot carry the field's
//! data type (or `force_string` is set) and finally swaps null for the
//! serializer's placeholder token. Import runs the same steps backwards.

mod kind;

pub use kind::FieldKind;

use std::fmt;

use rust_decimal::prelude::ToPrimitive;

use crate::core::{DataType, Value};
use crate::error::Result;
use crate::serializers::Serializer;

/// One exported or imported column.
///
/// # Example
///
/// ```rust
/// use record_migrate::core::Value;
/// use record_migrate::fields::Field;
/// use record_migrate::serializers::CsvSerializer;
///
/// let csv = CsvSerializer::new();
/// let active = Field::boolean("active");
/// assert_eq!(active.export_value(Value::Bool(true), &csv)?, Value::from("true"));
/// assert_eq!(active.import_value(Value::from("Yes"), &csv)?, Value::Bool(true));
/// assert_eq!(active.export_value(Value::Null, &csv)?, Value::from("\\N"));
/// # Ok::<(), record_migrate::MigrateError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    path: String,
    name: String,
    attname: String,
    kind: FieldKind,
    force_string: bool,
}

macro_rules! kind_constructors {
    ($($(#[$doc:meta])* $fn_name:ident => $kind:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $fn_name(path: impl Into<String>) -> Self {
                Self::new(FieldKind::$kind, path)
            }
        )*
    };
}

impl Field {
    /// Create a field; `name` defaults to `path` and `attname` to `path`,
    /// or to `<first hop>_id` for relation-traversing paths.
    pub fn new(kind: FieldKind, path: impl Into<String>) -> Self {
        let path = path.into();
        let attname = match path.split_once("__") {
            Some((first, _)) => format!("{}_id", first),
            None => path.clone(),
        };
        Self {
            name: path.clone(),
            path,
            attname,
            kind,
            force_string: false,
        }
    }

    kind_constructors! {
        boolean => Boolean,
        integer => Integer,
        float => Float,
        text => Text,
        date => Date,
        datetime => DateTime,
        time => Time,
        day => Day,
        month => Month,
        year => Year,
        hour => Hour,
        minute => Minute,
        second => Second,
        microsecond => Microsecond,
        timezone => TimeZone,
        decimal => Decimal,
        /// Decimal exported as an integer when exact, a float otherwise.
        number => Number,
        file => File,
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_attname(mut self, attname: impl Into<String>) -> Self {
        self.attname = attname.into();
        self
    }

    /// Always externalize values as text.
    #[must_use]
    pub fn force_string(mut self) -> Self {
        self.force_string = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attname(&self) -> &str {
        &self.attname
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn data_type(&self) -> DataType {
        self.kind.data_type()
    }

    pub fn is_force_string(&self) -> bool {
        self.force_string
    }

    /// Whether the path crosses at least one relation.
    pub fn is_relation_path(&self) -> bool {
        self.path.contains("__")
    }

    /// Normalize an already-native value.
    pub fn clean(&self, value: Value) -> Result<Value> {
        self.kind.clean(&self.name, value)
    }

    /// Convert a native value into what `serializer` writes.
    pub fn export_value(&self, value: Value, serializer: &dyn Serializer) -> Result<Value> {
        let value = self.clean(value)?;
        let value = match self.kind {
            FieldKind::Text | FieldKind::File => value,
            _ if value.is_null() => value,
            FieldKind::Number if !self.stringify(serializer.exports_natively(DataType::Float)) => {
                Self::decimal_as_number(value)
            }
            _ if self.stringify(serializer.exports_natively(self.data_type())) => {
                self.kind.to_text(&value)
            }
            _ => value,
        };
        Ok(self.prepare_to_export(value, serializer))
    }

    /// Convert what `serializer` read back into a native value.
    pub fn import_value(&self, value: Value, serializer: &dyn Serializer) -> Result<Value> {
        let value = self.prepare_to_import(value, serializer);
        match self.kind {
            FieldKind::Text | FieldKind::File => self.clean(value),
            _ if value.is_null() => Ok(Value::Null),
            _ if self.stringify(serializer.imports_natively(self.data_type())) => {
                let text = match value {
                    Value::Text(text) => text,
                    other => other.to_string(),
                };
                self.kind.from_text(&self.name, &text)
            }
            _ => self.clean(value),
        }
    }

    fn stringify(&self, native: bool) -> bool {
        self.force_string || !native || self.kind == FieldKind::TimeZone
    }

    fn prepare_to_export(&self, value: Value, serializer: &dyn Serializer) -> Value {
        match (value, serializer.none_replacement()) {
            (Value::Null, Some(token)) => Value::Text(token.to_string()),
            (value, _) => value,
        }
    }

    fn prepare_to_import(&self, value: Value, serializer: &dyn Serializer) -> Value {
        match (&value, serializer.none_replacement()) {
            (Value::Text(text), Some(token)) if text == token => Value::Null,
            _ => value,
        }
    }

    /// Integer when the decimal is whole, float parsed from its digits
    /// otherwise.
    fn decimal_as_number(value: Value) -> Value {
        let Value::Decimal(decimal) = value else {
            return value;
        };
        let normalized = decimal.normalize();
        if normalized.scale() == 0 {
            if let Some(int) = normalized.to_i64() {
                return Value::Int(int);
            }
        }
        match normalized.to_string().parse::<f64>() {
            Ok(float) => Value::Float(float),
            Err(_) => Value::Text(normalized.to_string()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.path {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.path)
        }
    }
}

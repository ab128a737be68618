//! Entity metadata as reported by a record store.
//!
//! These types describe what the migration engine needs to know about an
//! entity: its attributes, their data types, identity and uniqueness, and the
//! relations pointing at other entities.

use serde::{Deserialize, Serialize};

/// Data types a field can carry.
///
/// Serializers declare which of these they transport natively; every other
/// type travels as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Time,
    Decimal,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "TEXT",
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::Boolean => "BOOLEAN",
            DataType::Date => "DATE",
            DataType::DateTime => "DATETIME",
            DataType::Time => "TIME",
            DataType::Decimal => "DECIMAL",
        }
    }
}

/// Relation from one attribute to the identity of another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Target entity name.
    pub target: String,

    /// Attribute of the target the relation stores (normally its identity).
    pub target_attname: String,
}

/// Attribute metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Logical name (`blog`).
    pub name: String,

    /// Storage attribute (`blog_id` for relations, `name` otherwise).
    pub attname: String,

    pub data_type: DataType,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default)]
    pub unique: bool,

    /// Identity attribute of the entity.
    #[serde(default)]
    pub primary_key: bool,

    /// Has a default (or is generated by the store), so rows may omit it.
    #[serde(default)]
    pub has_default: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<Relation>,
}

impl SchemaField {
    /// Create a required, non-unique attribute.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            attname: name.clone(),
            name,
            data_type,
            nullable: false,
            unique: false,
            primary_key: false,
            has_default: false,
            relation: None,
        }
    }

    /// Create a store-generated integer identity attribute.
    pub fn auto_id(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Integer).primary_key().with_default()
    }

    /// Create a relation stored as `<name>_id` pointing at `target_attname`
    /// of `target`.
    pub fn foreign_key(
        name: impl Into<String>,
        target: impl Into<String>,
        target_attname: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        let name = name.into();
        let mut field = Self::new(name.clone(), data_type);
        field.attname = format!("{}_id", name);
        field.relation = Some(Relation {
            target: target.into(),
            target_attname: target_attname.into(),
        });
        field
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    /// Rows must carry this attribute to be insertable.
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.has_default
    }

    /// Unique and required, usable as a single-attribute key.
    pub fn is_candidate_key(&self) -> bool {
        self.unique && !self.nullable
    }

    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }
}

/// Entity metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entity name.
    pub name: String,

    /// Attribute definitions in declaration order.
    pub fields: Vec<SchemaField>,

    /// Unique-together attribute sets, by field name.
    #[serde(default)]
    pub unique_together: Vec<Vec<String>>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            unique_together: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn with_unique_together<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_together
            .push(names.into_iter().map(Into::into).collect());
        self
    }

    /// Look up an attribute by name or storage attribute; `pk` aliases the
    /// identity attribute.
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        if name == "pk" {
            return self.primary_key();
        }
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.attname == name))
    }

    pub fn primary_key(&self) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.primary_key)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| f.is_required())
    }

    /// Entities this one points at through relations, in declaration order.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        for field in &self.fields {
            if let Some(relation) = &field.relation {
                if relation.target != self.name && !targets.contains(&relation.target.as_str()) {
                    targets.push(&relation.target);
                }
            }
        }
        targets
    }

    /// The first non-relation unique attribute other than the identity, or
    /// failing that the first unique-together set.
    pub fn natural_key(&self) -> Option<Vec<&SchemaField>> {
        if let Some(field) = self
            .fields
            .iter()
            .find(|f| !f.is_relation() && f.unique && !f.primary_key)
        {
            return Some(vec![field]);
        }

        self.unique_together.iter().find_map(|names| {
            names
                .iter()
                .map(|name| self.field(name))
                .collect::<Option<Vec<_>>>()
        })
    }
}

//! In-memory record store.
//!
//! Keeps rows per entity in insertion order, enforces identity, unique and
//! unique-together constraints, generates integer identities and implements
//! transactions by snapshot and restore.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::core::{DataType, EntitySchema, Record, Row, SchemaField, Value};
use crate::error::{MigrateError, Result};

use super::RecordStore;

/// Depth limit when materializing related records.
const MAX_RELATED_DEPTH: usize = 4;

/// Counters of write operations, kept across rollbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Rows written by `insert_one` and `insert_many`.
    pub inserted: u64,
    /// Rows changed by `update_one`.
    pub updated: u64,
    /// Rows removed by `delete_matching` and `delete_all`.
    pub deleted: u64,
    pub insert_one_calls: u64,
    pub insert_many_calls: u64,
}

impl WriteStats {
    pub fn writes(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }
}

#[derive(Debug, Clone)]
struct Table {
    schema: EntitySchema,
    rows: Vec<Row>,
    next_id: i64,
}

impl Table {
    fn new(schema: EntitySchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn key_of(row: &Row, attrs: &[String]) -> Vec<Value> {
        attrs
            .iter()
            .map(|a| row.get(a).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Fill generated and nullable attributes, reject unknown or missing ones.
    fn complete(&mut self, mut row: Row) -> Result<Row> {
        for key in row.keys() {
            if !self.schema.fields.iter().any(|f| &f.attname == key) {
                return Err(MigrateError::store(
                    &self.schema.name,
                    format!("unknown attribute '{}'", key),
                ));
            }
        }

        for field in &self.schema.fields {
            let missing = row.get(&field.attname).map_or(true, Value::is_null);
            if !missing {
                continue;
            }
            if field.primary_key && field.has_default && field.data_type == DataType::Integer {
                row.insert(field.attname.clone(), Value::Int(self.next_id));
            } else if field.nullable || field.has_default {
                row.entry(field.attname.clone()).or_insert(Value::Null);
            } else {
                return Err(MigrateError::store(
                    &self.schema.name,
                    format!("missing value for required attribute '{}'", field.attname),
                ));
            }
        }

        if let Some(pk) = self.schema.primary_key() {
            if let Some(Value::Int(id)) = row.get(&pk.attname) {
                let next = id.checked_add(1).ok_or_else(|| {
                    MigrateError::store(
                        &self.schema.name,
                        format!("identity {} leaves no room for generated ids", id),
                    )
                })?;
                self.next_id = self.next_id.max(next);
            }
        }

        Ok(row)
    }

    fn unique_sets(&self) -> Vec<Vec<String>> {
        let mut sets: Vec<Vec<String>> = self
            .schema
            .fields
            .iter()
            .filter(|f| f.unique)
            .map(|f| vec![f.attname.clone()])
            .collect();
        for names in &self.schema.unique_together {
            let attrs: Option<Vec<String>> = names
                .iter()
                .map(|n| self.schema.field(n).map(|f| f.attname.clone()))
                .collect();
            if let Some(attrs) = attrs {
                sets.push(attrs);
            }
        }
        sets
    }

    fn check_unique(&self, row: &Row, skip: Option<usize>) -> Result<()> {
        for attrs in self.unique_sets() {
            let key = Self::key_of(row, &attrs);
            if key.iter().any(Value::is_null) {
                continue;
            }
            let clash = self
                .rows
                .iter()
                .enumerate()
                .any(|(i, other)| Some(i) != skip && Self::key_of(other, &attrs) == key);
            if clash {
                let rendered: Vec<String> = key.iter().map(ToString::to_string).collect();
                return Err(MigrateError::store(
                    &self.schema.name,
                    format!(
                        "duplicate key ({})=({})",
                        attrs.join(", "),
                        rendered.join(", ")
                    ),
                ));
            }
        }
        Ok(())
    }

    fn insert(&mut self, row: Row) -> Result<()> {
        let row = self.complete(row)?;
        self.check_unique(&row, None)?;
        self.rows.push(row);
        Ok(())
    }

    fn position_of(&self, record: &Row) -> Option<usize> {
        match self.schema.primary_key() {
            Some(pk) => {
                let id = record.get(&pk.attname)?;
                self.rows.iter().position(|r| r.get(&pk.attname) == Some(id))
            }
            None => self.rows.iter().position(|r| r == record),
        }
    }
}

/// In-memory [`RecordStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, Table>,
    stats: WriteStats,
}

impl MemoryStore {
    /// Create an empty store with no entities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, builder style.
    #[must_use]
    pub fn with_entity(mut self, schema: EntitySchema) -> Self {
        self.register(schema);
        self
    }

    /// Register (or replace) an entity.
    pub fn register(&mut self, schema: EntitySchema) {
        debug!("Registering entity {}", schema.name);
        self.tables.insert(schema.name.clone(), Table::new(schema));
    }

    /// Names of the registered entities.
    pub fn entities(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Stored rows of an entity, in insertion order.
    pub fn rows(&self, entity: &str) -> Result<&[Row]> {
        Ok(self.table(entity)?.rows.as_slice())
    }

    pub fn write_stats(&self) -> WriteStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = WriteStats::default();
    }

    fn table(&self, entity: &str) -> Result<&Table> {
        self.tables
            .get(entity)
            .ok_or_else(|| MigrateError::store(entity, "unknown entity"))
    }

    fn table_mut(&mut self, entity: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(entity)
            .ok_or_else(|| MigrateError::store(entity, "unknown entity"))
    }

    fn related_row<'a>(
        &'a self,
        field: &SchemaField,
        row: &Row,
    ) -> Result<Option<(&'a Table, &'a Row)>> {
        let Some(relation) = &field.relation else {
            return Ok(None);
        };
        let value = match row.get(&field.attname) {
            Some(v) if !v.is_null() => v,
            _ => return Ok(None),
        };
        let target = self.table(&relation.target)?;
        Ok(target
            .rows
            .iter()
            .find(|r| r.get(&relation.target_attname) == Some(value))
            .map(|r| (target, r)))
    }

    fn project(&self, table: &Table, row: &Row, path: &[String]) -> Result<Value> {
        let Some((hop, rest)) = path.split_first() else {
            return Ok(Value::Null);
        };
        let field = table.schema.field(hop).ok_or_else(|| {
            MigrateError::store(&table.schema.name, format!("unknown attribute '{}'", hop))
        })?;

        if rest.is_empty() {
            return Ok(row.get(&field.attname).cloned().unwrap_or(Value::Null));
        }
        if !field.is_relation() {
            return Err(MigrateError::store(
                &table.schema.name,
                format!("attribute '{}' is not a relation", hop),
            ));
        }
        match self.related_row(field, row)? {
            Some((target, related)) => self.project(target, related, rest),
            None => Ok(Value::Null),
        }
    }

    fn materialize(&self, table: &Table, row: &Row, depth: usize) -> Result<Record> {
        let mut record = Record::new(row.clone());
        if depth >= MAX_RELATED_DEPTH {
            return Ok(record);
        }
        for field in table.schema.fields.iter().filter(|f| f.is_relation()) {
            if let Some((target, related)) = self.related_row(field, row)? {
                let nested = self.materialize(target, related, depth + 1)?;
                record.related.insert(field.name.clone(), nested);
            }
        }
        Ok(record)
    }

    fn attnames(&self, entity: &str, attrs: &[String]) -> Result<Vec<String>> {
        let schema = &self.table(entity)?.schema;
        attrs
            .iter()
            .map(|a| {
                schema.field(a).map(|f| f.attname.clone()).ok_or_else(|| {
                    MigrateError::store(entity, format!("unknown attribute '{}'", a))
                })
            })
            .collect()
    }
}

impl RecordStore for MemoryStore {
    fn schema(&self, entity: &str) -> Result<EntitySchema> {
        Ok(self.table(entity)?.schema.clone())
    }

    fn fetch_values(&self, entity: &str, paths: &[Vec<String>]) -> Result<Vec<Vec<Value>>> {
        let table = self.table(entity)?;
        table
            .rows
            .iter()
            .map(|row| {
                paths
                    .iter()
                    .map(|path| self.project(table, row, path))
                    .collect()
            })
            .collect()
    }

    fn fetch_records(&self, entity: &str) -> Result<Vec<Record>> {
        let table = self.table(entity)?;
        table
            .rows
            .iter()
            .map(|row| self.materialize(table, row, 0))
            .collect()
    }

    fn fetch_by_key(&self, entity: &str, key_attr: &str, values: &[Value]) -> Result<Vec<Row>> {
        let attr = self.attnames(entity, &[key_attr.to_string()])?.remove(0);
        let wanted: HashSet<&Value> = values.iter().collect();
        Ok(self
            .table(entity)?
            .rows
            .iter()
            .filter(|r| r.get(&attr).map_or(false, |v| wanted.contains(v)))
            .cloned()
            .collect())
    }

    fn fetch_by_composite_key(
        &self,
        entity: &str,
        key_attrs: &[String],
        keys: &[Vec<Value>],
    ) -> Result<Vec<Row>> {
        let attrs = self.attnames(entity, key_attrs)?;
        let wanted: HashSet<&Vec<Value>> = keys.iter().collect();
        Ok(self
            .table(entity)?
            .rows
            .iter()
            .filter(|r| wanted.contains(&Table::key_of(r, &attrs)))
            .cloned()
            .collect())
    }

    fn insert_many(&mut self, entity: &str, rows: Vec<Row>) -> Result<u64> {
        let table = self.table_mut(entity)?;
        let mut count = 0;
        for row in rows {
            table.insert(row)?;
            count += 1;
        }
        self.stats.insert_many_calls += 1;
        self.stats.inserted += count;
        Ok(count)
    }

    fn insert_one(&mut self, entity: &str, row: Row) -> Result<()> {
        self.table_mut(entity)?.insert(row)?;
        self.stats.insert_one_calls += 1;
        self.stats.inserted += 1;
        Ok(())
    }

    fn update_one(&mut self, entity: &str, record: &Row, changes: Row) -> Result<()> {
        let table = self.table_mut(entity)?;
        let index = table
            .position_of(record)
            .ok_or_else(|| MigrateError::store(entity, "record to update no longer exists"))?;

        let mut updated = table.rows[index].clone();
        for (attr, value) in changes {
            if !table.schema.fields.iter().any(|f| f.attname == attr) {
                return Err(MigrateError::store(
                    entity,
                    format!("unknown attribute '{}'", attr),
                ));
            }
            updated.insert(attr, value);
        }
        table.check_unique(&updated, Some(index))?;
        table.rows[index] = updated;
        self.stats.updated += 1;
        Ok(())
    }

    fn delete_matching(
        &mut self,
        entity: &str,
        key_attrs: &[String],
        keys: &[Vec<Value>],
    ) -> Result<u64> {
        let attrs = self.attnames(entity, key_attrs)?;
        let wanted: HashSet<&Vec<Value>> = keys.iter().collect();
        let table = self.table_mut(entity)?;
        let before = table.rows.len();
        table
            .rows
            .retain(|r| !wanted.contains(&Table::key_of(r, &attrs)));
        let deleted = (before - table.rows.len()) as u64;
        self.stats.deleted += deleted;
        Ok(deleted)
    }

    fn delete_all(&mut self, entity: &str) -> Result<u64> {
        let table = self.table_mut(entity)?;
        let deleted = table.rows.len() as u64;
        table.rows.clear();
        self.stats.deleted += deleted;
        Ok(deleted)
    }

    fn atomic(&mut self, work: &mut dyn FnMut(&mut dyn RecordStore) -> Result<()>) -> Result<()> {
        let snapshot = self.tables.clone();
        let result = work(self);
        if let Err(e) = &result {
            warn!("Rolling back transaction: {}", e);
            self.tables = snapshot;
        }
        result
    }
}

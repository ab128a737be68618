//! Natural foreign key resolution.
//!
//! A relation imported as `blog__name` carries the related record's natural
//! key instead of its identity. Before a batch reaches the store, every such
//! key is looked up on the related entity and replaced by the value the
//! relation stores.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::core::{Batch, EntitySchema, Row, SchemaField, Value};
use crate::error::{MigrateError, Result};
use crate::fields::Field;
use crate::plans::LOOKUP_CHUNK_SIZE;
use crate::store::RecordStore;

use super::Migration;

/// A relation imported through the natural key of its target.
#[derive(Debug, Clone)]
pub struct NaturalForeignKey {
    relation: String,
    attname: String,
    target: String,
    target_attname: String,
    fields: Vec<Field>,
    lookup_attnames: Vec<String>,
}

/// What a row carries for one natural foreign key.
enum KeyCell {
    Absent,
    Null,
    Key(Vec<Value>),
}

impl NaturalForeignKey {
    pub(super) fn new(
        relation: &SchemaField,
        target: &EntitySchema,
        field: Field,
        lookup: &SchemaField,
    ) -> Self {
        let stored = relation
            .relation
            .as_ref()
            .map(|r| r.target_attname.as_str())
            .unwrap_or("pk");
        let target_attname = target
            .field(stored)
            .map_or_else(|| stored.to_string(), |f| f.attname.clone());

        Self {
            relation: relation.name.clone(),
            attname: relation.attname.clone(),
            target: target.name.clone(),
            target_attname,
            fields: vec![field],
            lookup_attnames: vec![lookup.attname.clone()],
        }
    }

    /// Add another sub-field of the same relation.
    pub(super) fn push(&mut self, field: Field, lookup: &SchemaField) {
        self.fields.push(field);
        self.lookup_attnames.push(lookup.attname.clone());
    }

    /// Logical name of the relation.
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Storage attribute receiving the resolved value.
    pub fn attname(&self) -> &str {
        &self.attname
    }

    /// Entity the natural key is looked up on.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Sub-fields carrying the natural key, one per looked-up attribute.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn key_of(&self, row: &Row) -> KeyCell {
        let values: Vec<Option<&Value>> = self.fields.iter().map(|f| row.get(f.path())).collect();
        if values.iter().all(Option::is_none) {
            return KeyCell::Absent;
        }
        if values.iter().any(|v| v.map_or(true, Value::is_null)) {
            return KeyCell::Null;
        }
        KeyCell::Key(values.into_iter().flatten().cloned().collect())
    }

    /// Map every distinct key to the value the relation stores.
    fn lookup(
        &self,
        store: &dyn RecordStore,
        keys: &[Vec<Value>],
    ) -> Result<HashMap<Vec<Value>, Value>> {
        let mut resolved = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(LOOKUP_CHUNK_SIZE) {
            let found = match self.lookup_attnames.as_slice() {
                [attr] => {
                    let values: Vec<Value> = chunk.iter().map(|key| key[0].clone()).collect();
                    store.fetch_by_key(&self.target, attr, &values)?
                }
                attrs => store.fetch_by_composite_key(&self.target, attrs, chunk)?,
            };
            for record in found {
                let key: Vec<Value> = self
                    .lookup_attnames
                    .iter()
                    .map(|attr| record.get(attr).cloned().unwrap_or(Value::Null))
                    .collect();
                let stored = record
                    .get(&self.target_attname)
                    .cloned()
                    .unwrap_or(Value::Null);
                resolved.insert(key, stored);
            }
        }
        debug!(
            "{}: resolved {} of {} natural keys on {}",
            self.relation,
            resolved.len(),
            keys.len(),
            self.target
        );
        Ok(resolved)
    }
}

fn render_key(key: &[Value]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Migration {
    /// Replace natural key sub-fields of every row by the value their relation
    /// stores.
    ///
    /// Returns a new batch; the store is only read. A key without a match is
    /// an [`MigrateError::UnresolvedForeignKey`] unless missing keys are
    /// ignored, in which case the row is dropped.
    pub fn resolve_natural_foreign_keys(
        &self,
        store: &dyn RecordStore,
        batch: Batch,
    ) -> Result<Batch> {
        if self.natural_foreign_keys.is_empty() {
            return Ok(batch);
        }

        let index = batch.index;
        let mut rows = batch.rows;
        let mut keep = vec![true; rows.len()];

        for nfk in &self.natural_foreign_keys {
            let mut seen = HashSet::new();
            let keys: Vec<Vec<Value>> = rows
                .iter()
                .filter_map(|row| match nfk.key_of(row) {
                    KeyCell::Key(key) => Some(key),
                    _ => None,
                })
                .filter(|key| seen.insert(key.clone()))
                .collect();
            let resolved = nfk.lookup(store, &keys)?;

            for (row, keep) in rows.iter_mut().zip(keep.iter_mut()) {
                let cell = nfk.key_of(row);
                for field in &nfk.fields {
                    row.remove(field.path());
                }
                match cell {
                    KeyCell::Absent => {}
                    KeyCell::Null => {
                        row.insert(nfk.attname.clone(), Value::Null);
                    }
                    KeyCell::Key(key) => match resolved.get(&key) {
                        Some(value) => {
                            row.insert(nfk.attname.clone(), value.clone());
                        }
                        None if self.ignore_missing_foreign_keys => {
                            if *keep {
                                warn!(
                                    "{}: dropping row, no {} matches {} = {}",
                                    self.entity,
                                    nfk.target,
                                    nfk.relation,
                                    render_key(&key)
                                );
                            }
                            *keep = false;
                        }
                        None => {
                            return Err(MigrateError::UnresolvedForeignKey {
                                field: nfk.relation.clone(),
                                entity: nfk.target.clone(),
                                value: render_key(&key),
                            })
                        }
                    },
                }
            }
        }

        let rows = rows
            .into_iter()
            .zip(keep)
            .filter_map(|(row, keep)| keep.then_some(row))
            .collect();
        Ok(Batch::new(rows, index))
    }
}

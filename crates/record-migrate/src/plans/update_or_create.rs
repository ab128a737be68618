//! Update matching rows, insert the rest.

use std::collections::HashMap;

use crate::core::{Batch, Row, Value};
use crate::error::Result;
use crate::orchestrator::Migration;
use crate::store::RecordStore;

use super::{changes, fetch_existing, row_key, BatchOutcome, ImportationPlan};

/// Updates rows whose key exists and inserts the others, either one at a
/// time (`update_or_create`) or in a single call per batch
/// (`update_or_bulk_create`).
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOrCreatePlan {
    bulk: bool,
}

impl UpdateOrCreatePlan {
    /// Insert new rows one by one.
    pub fn new() -> Self {
        Self { bulk: false }
    }

    /// Insert all new rows of a batch in one call.
    pub fn bulk() -> Self {
        Self { bulk: true }
    }
}

impl ImportationPlan for UpdateOrCreatePlan {
    fn name(&self) -> &str {
        if self.bulk {
            "update_or_bulk_create"
        } else {
            "update_or_create"
        }
    }

    fn needs_create(&self) -> bool {
        true
    }

    fn needs_update(&self) -> bool {
        true
    }

    fn import_batch(
        &self,
        migration: &Migration,
        store: &mut dyn RecordStore,
        batch: Batch,
    ) -> Result<BatchOutcome> {
        let entity = migration.entity();
        let key_attrs = migration.key_attnames();
        let mut existing = fetch_existing(migration, &*store, &batch.rows)?;
        let mut outcome = BatchOutcome::default();

        // New rows waiting for the bulk insert, by key when they have one.
        let mut pending: Vec<Row> = Vec::new();
        let mut pending_keys: HashMap<Vec<Value>, usize> = HashMap::new();

        for row in batch.rows {
            let key = row_key(key_attrs, &row);

            let record = match &key {
                Some(k) => existing.get_mut(k),
                None => None,
            };
            if let Some(record) = record {
                let diff = changes(record, &row);
                if diff.is_empty() {
                    outcome.skipped += 1;
                } else {
                    store.update_one(entity, record, diff.clone())?;
                    record.extend(diff);
                    outcome.updated += 1;
                }
                continue;
            }

            if !self.bulk {
                if let Some(key) = key {
                    existing.insert(key, row.clone());
                }
                store.insert_one(entity, row)?;
                outcome.inserted += 1;
                continue;
            }

            let merged_into = match key {
                Some(k) => match pending_keys.get(&k) {
                    Some(&index) => Some(index),
                    None => {
                        pending_keys.insert(k, pending.len());
                        None
                    }
                },
                None => None,
            };
            match merged_into {
                Some(index) => {
                    pending[index].extend(row);
                    outcome.skipped += 1;
                }
                None => pending.push(row),
            }
        }

        if !pending.is_empty() {
            outcome.inserted += store.insert_many(entity, pending)?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    fn batch() -> Batch {
        Batch::new(vec![person(2, "Robert"), person(3, "Carol"), person(1, "Alice")], 0)
    }

    #[test]
    fn test_names() {
        assert_eq!(UpdateOrCreatePlan::new().name(), "update_or_create");
        assert_eq!(UpdateOrCreatePlan::bulk().name(), "update_or_bulk_create");
    }

    #[test]
    fn test_update_or_create() {
        let mut store = people();
        let migration = migration(&store);

        let outcome = UpdateOrCreatePlan::new()
            .import_batch(&migration, &mut store, batch())
            .unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(store.write_stats().insert_one_calls, 1);
        assert_eq!(
            names(&store),
            vec![
                (1, "Alice".to_string()),
                (2, "Robert".to_string()),
                (3, "Carol".to_string())
            ]
        );
    }

    #[test]
    fn test_update_or_bulk_create() {
        let mut store = people();
        let migration = migration(&store);

        let outcome = UpdateOrCreatePlan::bulk()
            .import_batch(
                &migration,
                &mut store,
                Batch::new(
                    vec![person(2, "Robert"), person(3, "Carol"), person(4, "Dan"), person(3, "Caroline")],
                    0,
                ),
            )
            .unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(store.write_stats().insert_many_calls, 1);
        assert_eq!(store.write_stats().insert_one_calls, 0);
        assert_eq!(names(&store)[2], (3, "Caroline".to_string()));
    }

    #[test]
    fn test_repeated_key_is_inserted_then_updated() {
        let mut store = people();
        let migration = migration(&store);
        let outcome = UpdateOrCreatePlan::new()
            .import_batch(
                &migration,
                &mut store,
                Batch::new(vec![person(5, "Eve"), person(5, "Evelyn")], 0),
            )
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.updated, 1);
        assert_eq!(names(&store)[2], (5, "Evelyn".to_string()));
    }
}

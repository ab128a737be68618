//! Insert rows whose key is not stored yet.

use crate::core::{Batch, Row};
use crate::error::Result;
use crate::orchestrator::Migration;
use crate::store::RecordStore;

use super::{fetch_existing, row_key, BatchOutcome, ImportationPlan};

/// Split a batch into rows to insert and the count of rows already present.
///
/// A key seen earlier in the same batch counts as present.
fn absent_rows(
    migration: &Migration,
    store: &dyn RecordStore,
    rows: Vec<Row>,
) -> Result<(Vec<Row>, u64)> {
    let mut existing = fetch_existing(migration, store, &rows)?;
    let key_attrs = migration.key_attnames();
    let mut absent = Vec::with_capacity(rows.len());
    let mut skipped = 0;

    for row in rows {
        match row_key(key_attrs, &row) {
            Some(key) if existing.contains_key(&key) => skipped += 1,
            Some(key) => {
                existing.insert(key, row.clone());
                absent.push(row);
            }
            None => absent.push(row),
        }
    }
    Ok((absent, skipped))
}

/// Inserts, one by one, the rows whose key does not exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreatePlan;

impl ImportationPlan for CreatePlan {
    fn name(&self) -> &str {
        "create"
    }

    fn needs_create(&self) -> bool {
        true
    }

    fn import_batch(
        &self,
        migration: &Migration,
        store: &mut dyn RecordStore,
        batch: Batch,
    ) -> Result<BatchOutcome> {
        let (absent, skipped) = absent_rows(migration, &*store, batch.rows)?;
        let mut outcome = BatchOutcome {
            skipped,
            ..BatchOutcome::default()
        };
        for row in absent {
            store.insert_one(migration.entity(), row)?;
            outcome.inserted += 1;
        }
        Ok(outcome)
    }
}

/// Same as [`CreatePlan`] but inserts all new rows in one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkCreatePlan;

impl ImportationPlan for BulkCreatePlan {
    fn name(&self) -> &str {
        "bulk_create"
    }

    fn needs_create(&self) -> bool {
        true
    }

    fn import_batch(
        &self,
        migration: &Migration,
        store: &mut dyn RecordStore,
        batch: Batch,
    ) -> Result<BatchOutcome> {
        let (absent, skipped) = absent_rows(migration, &*store, batch.rows)?;
        let inserted = if absent.is_empty() {
            0
        } else {
            store.insert_many(migration.entity(), absent)?
        };
        Ok(BatchOutcome {
            inserted,
            skipped,
            ..BatchOutcome::default()
        })
    }
}

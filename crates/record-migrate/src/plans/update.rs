//! Update rows whose key is already stored.

use crate::core::Batch;
use crate::error::Result;
use crate::orchestrator::Migration;
use crate::store::RecordStore;

use super::{changes, fetch_existing, row_key, BatchOutcome, ImportationPlan};

/// Applies each row onto the stored record with the same key.
///
/// Rows without a match are skipped, and so are matches whose values are
/// all unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdatePlan;

impl ImportationPlan for UpdatePlan {
    fn name(&self) -> &str {
        "update"
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
        let mut existing = fetch_existing(migration, &*store, &batch.rows)?;
        let key_attrs = migration.key_attnames();
        let mut outcome = BatchOutcome::default();

        for row in batch.rows {
            let record = match row_key(key_attrs, &row) {
                Some(key) => existing.get_mut(&key),
                None => None,
            };
            let Some(record) = record else {
                outcome.skipped += 1;
                continue;
            };
            let diff = changes(record, &row);
            if diff.is_empty() {
                outcome.skipped += 1;
                continue;
            }
            store.update_one(migration.entity(), record, diff.clone())?;
            record.extend(diff);
            outcome.updated += 1;
        }
        Ok(outcome)
    }
}

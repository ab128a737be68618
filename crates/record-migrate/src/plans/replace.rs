//! Delete, then insert.

use tracing::info;

use crate::core::Batch;
use crate::error::Result;
use crate::orchestrator::Migration;
use crate::store::RecordStore;

use super::{batch_keys, BatchOutcome, ImportationPlan, LOOKUP_CHUNK_SIZE};

/// Deletes every stored record sharing a key with the batch, then inserts
/// the whole batch in one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplacePlan;

impl ImportationPlan for ReplacePlan {
    fn name(&self) -> &str {
        "replace"
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
        let key_attrs = migration.key_attnames();
        let mut outcome = BatchOutcome::default();

        let keys = batch_keys(key_attrs, &batch.rows);
        for chunk in keys.chunks(LOOKUP_CHUNK_SIZE) {
            outcome.deleted += store.delete_matching(migration.entity(), key_attrs, chunk)?;
        }
        if !batch.is_empty() {
            outcome.inserted = store.insert_many(migration.entity(), batch.rows)?;
        }
        Ok(outcome)
    }
}

/// Empties the entity before the first batch, then inserts every batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceAllPlan;

impl ImportationPlan for ReplaceAllPlan {
    fn name(&self) -> &str {
        "replace_all"
    }

    fn needs_create(&self) -> bool {
        true
    }

    fn prepare_importation(&self, migration: &Migration, store: &mut dyn RecordStore) -> Result<()> {
        let deleted = store.delete_all(migration.entity())?;
        info!("{}: removed {} existing records", migration.entity(), deleted);
        Ok(())
    }

    fn import_batch(
        &self,
        migration: &Migration,
        store: &mut dyn RecordStore,
        batch: Batch,
    ) -> Result<BatchOutcome> {
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let inserted = store.insert_many(migration.entity(), batch.rows)?;
        Ok(BatchOutcome {
            inserted,
            ..BatchOutcome::default()
        })
    }
}

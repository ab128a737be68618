//! Unconditional bulk insert.

use crate::core::Batch;
use crate::error::Result;
use crate::orchestrator::Migration;
use crate::store::RecordStore;

use super::{BatchOutcome, ImportationPlan};

/// Inserts every row without looking for existing keys.
///
/// The fastest plan; duplicate keys surface as store errors and abort the
/// whole import.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectPlan;

impl ImportationPlan for DirectPlan {
    fn name(&self) -> &str {
        "direct"
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

//! Importation plans.
//!
//! An [`ImportationPlan`] decides how one batch of coerced rows reaches the
//! record store. Every plan answers the same question differently: does the
//! row's key already exist?
//!
//! - **direct**: [`DirectPlan`], insert without looking
//! - **create** / **bulk_create**: [`CreatePlan`], [`BulkCreatePlan`]
//! - **update**: [`UpdatePlan`]
//! - **update_or_create** / **update_or_bulk_create**: [`UpdateOrCreatePlan`]
//! - **replace** / **replace_all**: [`ReplacePlan`], [`ReplaceAllPlan`]
//!
//! [`ImportationPlan::run`] drives the batches of one import inside a single
//! store transaction.

mod create;
mod direct;
mod replace;
mod update;
mod update_or_create;

pub use create::{BulkCreatePlan, CreatePlan};
pub use direct::DirectPlan;
pub use replace::{ReplaceAllPlan, ReplacePlan};
pub use update::UpdatePlan;
pub use update_or_create::UpdateOrCreatePlan;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Batch, Batches, Row, Value};
use crate::error::{MigrateError, Result};
use crate::orchestrator::Migration;
use crate::store::RecordStore;

/// Maximum number of keys per existence lookup.
pub const LOOKUP_CHUNK_SIZE: usize = 500;

/// What one plan invocation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    /// Rows left untouched (already present, unmatched or unchanged).
    pub skipped: u64,
}

/// Totals of one import call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    /// Rows read from the source.
    pub rows_read: u64,

    /// Plan invocations.
    pub batches: u64,

    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub skipped: u64,

    /// Rows dropped for unresolved natural foreign keys.
    pub dropped: u64,
}

impl ImportStats {
    fn record(&mut self, read: usize, dropped: usize, outcome: BatchOutcome) {
        self.rows_read += read as u64;
        self.dropped += dropped as u64;
        self.batches += 1;
        self.inserted += outcome.inserted;
        self.updated += outcome.updated;
        self.deleted += outcome.deleted;
        self.skipped += outcome.skipped;
    }
}

/// Trait for importation strategies.
///
/// Plans are stateless; everything they need comes from the
/// [`Migration`] they are given.
///
/// # Thread Safety
///
/// Plans are shared behind `Arc` by the [`Catalog`](crate::core::Catalog),
/// so they must be `Send + Sync`.
pub trait ImportationPlan: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    /// Whether the plan inserts rows.
    fn needs_create(&self) -> bool {
        false
    }

    /// Whether the plan matches rows against existing records.
    fn needs_update(&self) -> bool {
        false
    }

    /// Fail when the plan needs a capability the migration lacks.
    fn check(&self, migration: &Migration) -> Result<()> {
        if self.needs_create() && !migration.can_create() {
            return Err(MigrateError::UnableToCreate);
        }
        if self.needs_update() && !migration.can_update() {
            return Err(MigrateError::UnableToUpdate);
        }
        Ok(())
    }

    /// Runs inside the transaction before the first batch.
    fn prepare_importation(
        &self,
        _migration: &Migration,
        _store: &mut dyn RecordStore,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs inside the transaction after the last batch.
    fn finalize_importation(
        &self,
        _migration: &Migration,
        _store: &mut dyn RecordStore,
    ) -> Result<()> {
        Ok(())
    }

    /// Turn a batch read from the source into one ready for the store.
    fn prepare_batch(
        &self,
        migration: &Migration,
        store: &dyn RecordStore,
        batch: Batch,
    ) -> Result<Batch> {
        migration.resolve_natural_foreign_keys(store, batch)
    }

    /// Apply one prepared batch.
    fn import_batch(
        &self,
        migration: &Migration,
        store: &mut dyn RecordStore,
        batch: Batch,
    ) -> Result<BatchOutcome>;

    /// Import every row of `rows` in batches of `batch_size`, all inside one
    /// transaction.
    fn run(
        &self,
        migration: &Migration,
        store: &mut dyn RecordStore,
        rows: &mut dyn Iterator<Item = Result<Row>>,
        batch_size: usize,
    ) -> Result<ImportStats> {
        let mut stats = ImportStats::default();
        store.atomic(&mut |tx| {
            self.prepare_importation(migration, tx)?;
            for batch in Batches::new(&mut *rows, batch_size) {
                let batch = batch?;
                let read = batch.len();
                let index = batch.index;

                let batch = self.prepare_batch(migration, &*tx, batch)?;
                let dropped = read - batch.len();
                let outcome = self.import_batch(migration, tx, batch)?;

                debug!(
                    "{}: batch {} ({} rows) via {}: {} inserted, {} updated, {} deleted, {} skipped",
                    migration.entity(),
                    index,
                    read,
                    self.name(),
                    outcome.inserted,
                    outcome.updated,
                    outcome.deleted,
                    outcome.skipped
                );
                stats.record(read, dropped, outcome);
            }
            self.finalize_importation(migration, tx)
        })?;
        Ok(stats)
    }
}

/// Key of a prepared row, or `None` when a key attribute is missing or null.
pub(crate) fn row_key(key_attrs: &[String], row: &Row) -> Option<Vec<Value>> {
    key_attrs
        .iter()
        .map(|attr| row.get(attr).filter(|v| !v.is_null()).cloned())
        .collect()
}

/// Distinct keys of a batch, in first-seen order.
pub(crate) fn batch_keys(key_attrs: &[String], rows: &[Row]) -> Vec<Vec<Value>> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row_key(key_attrs, row))
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Existing records matching the keys of `rows`, keyed by their key.
pub(crate) fn fetch_existing(
    migration: &Migration,
    store: &dyn RecordStore,
    rows: &[Row],
) -> Result<HashMap<Vec<Value>, Row>> {
    let key_attrs = migration.key_attnames();
    let keys = batch_keys(key_attrs, rows);
    let mut existing = HashMap::with_capacity(keys.len());

    for chunk in keys.chunks(LOOKUP_CHUNK_SIZE) {
        let found = match key_attrs {
            [attr] => {
                let values: Vec<Value> = chunk.iter().map(|key| key[0].clone()).collect();
                store.fetch_by_key(migration.entity(), attr, &values)?
            }
            _ => store.fetch_by_composite_key(migration.entity(), key_attrs, chunk)?,
        };
        for record in found {
            if let Some(key) = row_key(key_attrs, &record) {
                existing.insert(key, record);
            }
        }
    }

    debug!(
        "{}: {} of {} keys already exist",
        migration.entity(),
        existing.len(),
        keys.len()
    );
    Ok(existing)
}

/// Attributes of `row` whose value differs from `record`.
pub(crate) fn changes(record: &Row, row: &Row) -> Row {
    row.iter()
        .filter(|(attr, value)| record.get(*attr) != Some(*value))
        .map(|(attr, value)| (attr.clone(), value.clone()))
        .collect()
}

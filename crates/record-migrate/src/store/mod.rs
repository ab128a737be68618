//! Record store interface consumed by the migration engine.
//!
//! The [`RecordStore`] trait is the only way the engine touches persistent
//! data. Implementations own storage, indexing and transactions; the engine
//! only issues keyed lookups, projections and row-level writes.
//!
//! - **Memory**: [`MemoryStore`] in `memory.rs`, used for tests and embedding

mod memory;

pub use memory::{MemoryStore, WriteStats};

use crate::core::{EntitySchema, Record, Row, Value};
use crate::error::Result;

/// Trait for schema-aware record stores.
///
/// Relation hops in projection paths and key attributes are given by
/// attribute name or storage attribute, exactly as reported by
/// [`RecordStore::schema`].
///
/// # Transactions
///
/// [`RecordStore::atomic`] runs a unit of work in one transaction: when the
/// work returns an error, every write it made is discarded and the error is
/// returned unchanged. Calls nest.
///
/// # Example
///
/// ```rust
/// use record_migrate::core::{row, DataType, EntitySchema, SchemaField, Value};
/// use record_migrate::store::{MemoryStore, RecordStore};
///
/// let mut store = MemoryStore::new().with_entity(
///     EntitySchema::new("person")
///         .with_field(SchemaField::auto_id("id"))
///         .with_field(SchemaField::new("name", DataType::Text)),
/// );
/// store.insert_one("person", row([("name", "Alice")]))?;
/// let found = store.fetch_by_key("person", "id", &[Value::Int(1)])?;
/// assert_eq!(found[0]["name"], Value::from("Alice"));
/// # Ok::<(), record_migrate::MigrateError>(())
/// ```
pub trait RecordStore: Send {
    /// Describe an entity.
    fn schema(&self, entity: &str) -> Result<EntitySchema>;

    /// Flat projection: one value per path for every record of the entity.
    ///
    /// Each path is a chain of attribute names; all but the last must be
    /// relations. Broken relations project as null.
    fn fetch_values(&self, entity: &str, paths: &[Vec<String>]) -> Result<Vec<Vec<Value>>>;

    /// Every record of the entity with related records materialized.
    fn fetch_records(&self, entity: &str) -> Result<Vec<Record>>;

    /// Records whose `key_attr` is one of `values`.
    fn fetch_by_key(&self, entity: &str, key_attr: &str, values: &[Value]) -> Result<Vec<Row>>;

    /// Records whose `key_attrs` tuple equals one of `keys`.
    fn fetch_by_composite_key(
        &self,
        entity: &str,
        key_attrs: &[String],
        keys: &[Vec<Value>],
    ) -> Result<Vec<Row>>;

    /// Insert several rows in one call, returning how many were written.
    fn insert_many(&mut self, entity: &str, rows: Vec<Row>) -> Result<u64>;

    fn insert_one(&mut self, entity: &str, row: Row) -> Result<()>;

    /// Apply `changes` to the stored record previously fetched as `record`.
    fn update_one(&mut self, entity: &str, record: &Row, changes: Row) -> Result<()>;

    /// Delete records whose `key_attrs` tuple equals one of `keys`.
    fn delete_matching(
        &mut self,
        entity: &str,
        key_attrs: &[String],
        keys: &[Vec<Value>],
    ) -> Result<u64>;

    /// Delete every record of the entity.
    fn delete_all(&mut self, entity: &str) -> Result<u64>;

    /// Run `work` in a single transaction.
    fn atomic(&mut self, work: &mut dyn FnMut(&mut dyn RecordStore) -> Result<()>) -> Result<()>;
}

//! # record-migrate
//!
//! Record-level export and import between a record store and serialized
//! streams.
//!
//! This library moves entity records in and out of CSV, TSV, JSON and YAML
//! with support for:
//!
//! - **Typed fields** coercing values between native and external forms
//! - **Natural keys** replacing internal identifiers on both ends
//! - **Importation plans** (direct, create, update, update-or-create,
//!   replace, ...) chosen by name
//! - **Batched, all-or-nothing imports** inside one store transaction
//! - **Directory and file facades** exporting and importing related entities
//!   in dependency order, optionally gzip-compressed
//!
//! ## Example
//!
//! ```rust
//! use record_migrate::core::{DataType, EntitySchema, SchemaField};
//! use record_migrate::{ImportOptions, MemoryStore, Migration, MigrationOptions};
//!
//! let mut store = MemoryStore::new().with_entity(
//!     EntitySchema::new("person")
//!         .with_field(SchemaField::new("id", DataType::Integer).primary_key())
//!         .with_field(SchemaField::new("name", DataType::Text)),
//! );
//!
//! let migration = Migration::for_entity(&store, "person", &MigrationOptions::default())?;
//! let options = ImportOptions::default().with_serializer("csv").with_plan("direct");
//! let stats = migration.import_data(&mut store, "id,name\n1,Alice\n2,Bob\n", &options)?;
//! assert_eq!(stats.inserted, 2);
//!
//! let json = migration.export_to_string(&store, None)?;
//! assert!(json.contains("Alice"));
//! # Ok::<(), record_migrate::MigrateError>(())
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod facade;
pub mod fields;
pub mod orchestrator;
pub mod plans;
pub mod serializers;
pub mod store;

// Re-exports for convenient access
pub use config::{Config, ImportOptions, MigrationOptions};
pub use self::core::{Catalog, Value};
pub use error::{MigrateError, Result};
pub use facade::{
    export_compressed_file, export_directory, export_entity_file, export_file,
    import_compressed_file, import_directory, import_entity_file, import_file, sort_dependencies,
};
pub use fields::{Field, FieldKind};
pub use orchestrator::{Migration, PrimaryKey};
pub use plans::{ImportStats, ImportationPlan};
pub use serializers::{Serializer, Source};
pub use store::{MemoryStore, RecordStore};

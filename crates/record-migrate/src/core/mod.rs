//! Core abstractions shared by every layer of the engine.
//!
//! - [`schema`]: entity and attribute metadata reported by record stores
//! - [`value`]: attribute values, source cells, rows and materialized records
//! - [`temporal`]: ISO-8601 rendering and parsing
//! - [`batch`]: fixed-size chunking of lazy row sequences
//! - [`catalog`]: name registry for serializers and importation plans

pub mod batch;
pub mod catalog;
pub mod schema;
pub mod temporal;
pub mod value;

pub use batch::{Batch, Batches};
pub use catalog::Catalog;
pub use schema::{DataType, EntitySchema, Relation, SchemaField};
pub use value::{row, Cell, Record, Row, Value};

//! # Ferrite - Embedded Object-Relational Mapping
//!
//! Ferrite is a lightweight, embedded object-to-relational mapping layer
//! written in Rust. Register a plain data type once and Ferrite derives its
//! table schema, converts instances to and from rows, and preserves existing
//! data across schema version changes without hand-written migration SQL.
//!
//! ## Key Features
//!
//! - **Embedded**: no separate server process, a single in-process store
//! - **Derived Schemas**: explicit field registration yields an ordered,
//!   deterministic column layout with a conventional `id` primary key
//! - **Bidirectional Mapping**: one mapper per type converts instance to row
//!   and back, including nested one-to-one relations stored as `<field>_id`
//! - **Migration**: a version bump on open recovers the previous schema from
//!   persisted text, extracts every row, recreates tables and replays data
//!   through caller hooks
//! - **Self-describing Metadata**: schema history is kept in a table mapped
//!   through the very same machinery as user types
//! - **Clean API**: PIMPL pattern provides a stable, encapsulated interface
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferrite::{Entity, EntityFields, Ferrite};
//!
//! #[derive(Clone, Default)]
//! struct Person {
//!     id: i64,
//!     name: String,
//!     age: i32,
//! }
//!
//! impl Entity for Person {
//!     fn table_name() -> &'static str {
//!         "person"
//!     }
//!
//!     fn fields(fields: &mut EntityFields<Self>) {
//!         fields
//!             .int64("id", |p| p.id, |p, v| p.id = v)
//!             .text("name", |p| p.name.clone(), |p, v| p.name = v)
//!             .int32("age", |p| p.age, |p, v| p.age = v);
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Ferrite::builder()
//!     .store_name("mydb")
//!     .schema_version(1)
//!     .register::<Person>()?
//!     .open_in_memory()?;
//!
//! let people = db.repository::<Person>()?;
//! let mut alice = Person { id: 0, name: "Alice".into(), age: 30 };
//! people.insert(&mut alice)?;
//!
//! let found = people.find_by_id(alice.id)?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`common`] - Shared value types and constants
//! - [`connection`] - The serialized, ref-counted store connection
//! - [`errors`] - Error types and result definitions
//! - [`ferrite`] - Core store interface
//! - [`ferrite_builder`] - Store builder for initialization
//! - [`ferrite_config`] - Store configuration
//! - [`mapper`] - Entity registration and row mapping
//! - [`metadata`] - Schema version history
//! - [`migration`] - Data-preserving schema migration
//! - [`registry`] - The explicit schema registry
//! - [`repository`] - Typed CRUD repositories
//! - [`schema`] - Derived table schemas
//! - [`store`] - Storage backend abstractions

pub mod common;
pub mod connection;
pub mod errors;
pub mod ferrite;
pub mod ferrite_builder;
pub mod ferrite_config;
pub mod mapper;
pub mod metadata;
pub mod migration;
pub mod registry;
pub mod repository;
pub mod schema;
pub mod store;

pub use common::Value;
pub use connection::StoreConnection;
pub use errors::{ErrorKind, FerriteError, FerriteResult};
pub use ferrite::Ferrite;
pub use ferrite_builder::FerriteBuilder;
pub use ferrite_config::FerriteConfig;
pub use mapper::{Entity, EntityFields, EntityMapper, RowValues};
pub use migration::{GenericRow, MigrationHooks, MigrationStore};
pub use registry::SchemaRegistry;
pub use repository::Repository;
pub use schema::{ColumnDef, ColumnKind, TableSchema};
pub use store::{MemoryEngine, StoreEngine, StoreRow};

//! Schema migration support for store evolution.
//!
//! As applications evolve, their registered types change shape. A version bump
//! triggers the [MigrationEngine] on the next open, before any CRUD operation
//! can reach the store:
//!
//! 1. The stored version is compared against the registered target version
//! 2. The previous schema is recovered purely from the metadata store's
//!    persisted creation text; the old typed descriptors may no longer compile
//! 3. Every existing row is extracted into schema-agnostic [GenericRow]
//!    holders
//! 4. All tables are destroyed and recreated for the current schemas
//! 5. The caller's [MigrationHooks] replay the extracted data into the new
//!    shape, with its own up-to-date type knowledge
//!
//! A failing step aborts the whole pass and leaves the stored version
//! unchanged, so the migration retries on the next open. With no hooks
//! registered the fallback is the trivial migration: drop everything and
//! recreate empty, logged loudly.

mod engine;
mod holder;
mod hooks;
mod parser;

pub use engine::{MigrationEngine, MigrationOutcome, MigrationState};
pub use holder::{GenericField, GenericRow, RecoveredTable};
pub use hooks::{MigrationHooks, MigrationStore};
pub use parser::parse_creation_text;

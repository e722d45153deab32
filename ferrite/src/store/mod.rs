//! Storage backend abstractions.
//!
//! The mapping and migration core consumes the relational engine through the
//! [StoreEngine] trait and nothing else. The crate ships one backend,
//! [memory::MemoryEngine], which is sufficient to drive the whole layer in a
//! single process; other backends can implement the same trait.

pub mod memory;

use crate::common::Value;
use crate::errors::FerriteResult;
use crate::mapper::RowValues;
use indexmap::IndexMap;

pub use memory::MemoryEngine;

/// A physical row as returned by a query: ordered column name to value.
pub type StoreRow = IndexMap<String, Value>;

/// Low-level interface to the underlying relational engine.
///
/// # Purpose
/// Defines the contract every storage backend must follow. The core requires
/// exactly these primitives, each transactional-capable: statement execution,
/// predicate queries, row insert/update/delete, transaction demarcation, and
/// an atomically settable schema version.
///
/// # Where clauses
/// `where_clause` is a conjunction of equality tests of the shape
/// `col = ? [AND col = ?]...`; `where_args` supplies the placeholder values in
/// order. `None` selects every row. This is the only predicate form the
/// mapping layer emits.
///
/// # Thread Safety
/// Implementers must be `Send + Sync`; callers serialize access through the
/// connection lock, but an engine must tolerate being shared.
pub trait StoreEngine: Send + Sync {
    /// Opens the engine, creating its backing storage on first use.
    fn open(&self) -> FerriteResult<()>;

    /// Closes the engine. Data survives a close/open cycle.
    fn close(&self) -> FerriteResult<()>;

    /// Returns whether the engine is currently open.
    fn is_open(&self) -> bool;

    /// Executes a DDL statement.
    ///
    /// Only `CREATE TABLE IF NOT EXISTS ...` and `DROP TABLE [IF EXISTS] ...`
    /// are required; the mapping layer emits nothing else.
    fn execute(&self, sql: &str) -> FerriteResult<()>;

    /// Queries rows from a table.
    ///
    /// `columns` restricts the returned columns; `None` returns all of them.
    fn query(
        &self,
        table: &str,
        columns: Option<&[String]>,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> FerriteResult<Vec<StoreRow>>;

    /// Inserts a row and returns the newly assigned identity.
    fn insert(&self, table: &str, values: &RowValues) -> FerriteResult<i64>;

    /// Updates matching rows and returns the affected count.
    fn update(
        &self,
        table: &str,
        values: &RowValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> FerriteResult<usize>;

    /// Deletes matching rows and returns the affected count.
    fn delete(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> FerriteResult<usize>;

    /// Returns the names of all existing tables, in creation order.
    fn table_names(&self) -> FerriteResult<Vec<String>>;

    /// Begins a transaction. Transactions nest; only the outermost demarcation
    /// takes effect.
    fn begin(&self) -> FerriteResult<()>;

    /// Commits the current transaction level.
    fn commit(&self) -> FerriteResult<()>;

    /// Rolls back to the state at the outermost `begin`.
    fn rollback(&self) -> FerriteResult<()>;

    /// Reads the persisted schema version. A fresh store reports 0.
    fn version(&self) -> FerriteResult<i32>;

    /// Sets the persisted schema version. Takes effect atomically with the
    /// enclosing transaction, if any.
    fn set_version(&self, version: i32) -> FerriteResult<()>;
}

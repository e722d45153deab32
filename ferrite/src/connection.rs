use crate::common::Value;
use crate::errors::{FerriteError, FerriteResult};
use crate::mapper::RowValues;
use crate::store::{StoreEngine, StoreRow};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Serialized access to one store engine.
///
/// # Purpose
/// `StoreConnection` is the single gate every operation goes through. It
/// enforces the concurrency model of the layer: one reentrant mutual-exclusion
/// lock totally orders mapping, migration, and CRUD operations against the same
/// physical engine, and a reference-counted open discipline physically closes
/// the engine only when the outermost operation finishes.
///
/// # Characteristics
/// - **Reentrant**: an operation issued from inside another one (for example
///   CRUD from a migration hook) re-acquires the lock on the same thread
///   without deadlocking
/// - **Ref-counted**: each operation bumps an open count on entry and drops it
///   on exit; nested calls never double-close
/// - **Blocking**: all engine I/O is synchronous under the lock; no operation
///   suspends cooperatively
#[derive(Clone)]
pub struct StoreConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    engine: Box<dyn StoreEngine>,
    lock: ReentrantMutex<()>,
    open_count: AtomicI32,
}

/// RAII scope for one operation against the connection.
///
/// Holds the connection lock and one open-count reference; dropping it releases
/// both, closing the engine when the count returns to zero.
pub struct ConnectionGuard<'a> {
    inner: &'a ConnectionInner,
    _lock: ReentrantMutexGuard<'a, ()>,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        let remaining = self.inner.open_count.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining <= 0 {
            if let Err(err) = self.inner.engine.close() {
                log::error!("Problems closing engine: {}", err);
            }
        }
    }
}

impl StoreConnection {
    pub fn new(engine: Box<dyn StoreEngine>) -> Self {
        StoreConnection {
            inner: Arc::new(ConnectionInner {
                engine,
                lock: ReentrantMutex::new(()),
                open_count: AtomicI32::new(0),
            }),
        }
    }

    /// Acquires the connection lock and opens the engine if this is the
    /// outermost operation.
    ///
    /// Connection establishment failure is fatal for this attempt and
    /// propagates as a [crate::errors::ErrorKind::StoreError].
    pub fn guard(&self) -> FerriteResult<ConnectionGuard<'_>> {
        let lock = self.inner.lock.lock();
        let previous = self.inner.open_count.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            if let Err(err) = self.inner.engine.open() {
                self.inner.open_count.fetch_sub(1, Ordering::SeqCst);
                return Err(FerriteError::new_with_cause(
                    "Problems opening store engine",
                    crate::errors::ErrorKind::StoreError,
                    err,
                ));
            }
        }
        Ok(ConnectionGuard {
            inner: &self.inner,
            _lock: lock,
        })
    }

    /// Runs `f` inside a transaction: begin on entry, commit on success,
    /// rollback on failure.
    ///
    /// Nests freely; the engine only demarcates at the outermost level.
    pub fn with_transaction<R>(
        &self,
        f: impl FnOnce() -> FerriteResult<R>,
    ) -> FerriteResult<R> {
        let _guard = self.guard()?;
        self.inner.engine.begin()?;
        match f() {
            Ok(result) => {
                self.inner.engine.commit()?;
                Ok(result)
            }
            Err(err) => {
                // a nested failure may already have rolled the state back
                if let Err(rollback_err) = self.inner.engine.rollback() {
                    log::debug!("rollback after failure: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    pub fn execute(&self, sql: &str) -> FerriteResult<()> {
        let _guard = self.guard()?;
        self.inner.engine.execute(sql)
    }

    pub fn query(
        &self,
        table: &str,
        columns: Option<&[String]>,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> FerriteResult<Vec<StoreRow>> {
        let _guard = self.guard()?;
        self.inner
            .engine
            .query(table, columns, where_clause, where_args)
    }

    pub fn insert(&self, table: &str, values: &RowValues) -> FerriteResult<i64> {
        let _guard = self.guard()?;
        self.inner.engine.insert(table, values)
    }

    pub fn update(
        &self,
        table: &str,
        values: &RowValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> FerriteResult<usize> {
        let _guard = self.guard()?;
        self.inner
            .engine
            .update(table, values, where_clause, where_args)
    }

    pub fn delete(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> FerriteResult<usize> {
        let _guard = self.guard()?;
        self.inner.engine.delete(table, where_clause, where_args)
    }

    pub fn table_names(&self) -> FerriteResult<Vec<String>> {
        let _guard = self.guard()?;
        self.inner.engine.table_names()
    }

    pub fn version(&self) -> FerriteResult<i32> {
        let _guard = self.guard()?;
        self.inner.engine.version()
    }

    pub fn set_version(&self, version: i32) -> FerriteResult<()> {
        let _guard = self.guard()?;
        self.inner.engine.set_version(version)
    }

    /// Current open-count, mostly useful in tests.
    pub fn open_count(&self) -> i32 {
        self.inner.open_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEngine;

    fn connection() -> (StoreConnection, MemoryEngine) {
        let engine = MemoryEngine::new();
        let conn = StoreConnection::new(Box::new(engine.clone()));
        conn.execute(
            "CREATE TABLE IF NOT EXISTS person (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)",
        )
        .unwrap();
        (conn, engine)
    }

    #[test]
    fn test_engine_closes_when_count_reaches_zero() {
        let (conn, engine) = connection();
        assert!(!engine.is_open());
        {
            let _outer = conn.guard().unwrap();
            assert!(engine.is_open());
            {
                let _inner = conn.guard().unwrap();
                assert_eq!(conn.open_count(), 2);
            }
            // still open, the outer guard holds a reference
            assert!(engine.is_open());
        }
        assert!(!engine.is_open());
        assert_eq!(conn.open_count(), 0);
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let (conn, _engine) = connection();
        let mut values = RowValues::new();
        values.put("name", Value::from("Alice"));
        conn.with_transaction(|| conn.insert("person", &values))
            .unwrap();
        assert_eq!(conn.query("person", None, None, &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_failure() {
        let (conn, _engine) = connection();
        let mut values = RowValues::new();
        values.put("name", Value::from("Alice"));
        let result: FerriteResult<()> = conn.with_transaction(|| {
            conn.insert("person", &values)?;
            Err(FerriteError::new(
                "hook refused",
                crate::errors::ErrorKind::MigrationError,
            ))
        });
        assert!(result.is_err());
        assert_eq!(conn.query("person", None, None, &[]).unwrap().len(), 0);
    }

    #[test]
    fn test_nested_transactions() {
        let (conn, _engine) = connection();
        let mut values = RowValues::new();
        values.put("name", Value::from("Alice"));
        conn.with_transaction(|| {
            conn.with_transaction(|| conn.insert("person", &values))?;
            conn.insert("person", &values)
        })
        .unwrap();
        assert_eq!(conn.query("person", None, None, &[]).unwrap().len(), 2);
    }

    #[test]
    fn test_version_round_trip() {
        let (conn, _engine) = connection();
        assert_eq!(conn.version().unwrap(), 0);
        conn.set_version(3).unwrap();
        assert_eq!(conn.version().unwrap(), 3);
    }
}

use crate::common::Value;
use crate::connection::StoreConnection;
use crate::errors::FerriteResult;
use crate::mapper::{Entity, EntityMapper};
use crate::schema::TableSchema;
use std::sync::Arc;

/// Typed CRUD façade over one mapped table.
///
/// # Purpose
/// The thin forwarding layer the application works with: insert, get, update
/// and delete by identity or by column predicate. Every operation is expressed
/// purely through the entity's [EntityMapper]; the repository adds transaction
/// demarcation around writes and nothing else.
///
/// # Cascades
/// Inserts cascade into relation children through the mapper's write path.
/// Deletes cascade through the relation graph using the *stored* relation
/// columns of each row, never the in-memory snapshot, so children cannot be
/// orphaned by a stale instance.
#[derive(Clone)]
pub struct Repository<T: Entity> {
    mapper: EntityMapper<T>,
    conn: StoreConnection,
}

impl<T: Entity> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &T::table_name())
            .finish()
    }
}

impl<T: Entity> Repository<T> {
    pub(crate) fn new(mapper: EntityMapper<T>, conn: StoreConnection) -> Self {
        Repository { mapper, conn }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        self.mapper.schema()
    }

    /// Inserts an entity, assigning the generated identity back onto it.
    ///
    /// The whole cascade, children included, runs in one transaction.
    pub fn insert(&self, entity: &mut T) -> FerriteResult<i64> {
        self.conn
            .with_transaction(|| self.mapper.insert(entity, &self.conn))
    }

    /// Fetches the entity with the given identity, fully materialized.
    pub fn find_by_id(&self, id: i64) -> FerriteResult<Option<T>> {
        self.mapper.fetch(id, &self.conn)
    }

    /// Fetches every entity of the table.
    pub fn find_all(&self) -> FerriteResult<Vec<T>> {
        let rows = self.conn.query(self.schema().name(), None, None, &[])?;
        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut entity = T::default();
            self.mapper.read(row, &mut entity, &self.conn)?;
            result.push(entity);
        }
        Ok(result)
    }

    /// Fetches every entity whose column equals the given value.
    ///
    /// The value is adapted to the column's kind first, so a caller may pass
    /// e.g. an `i64` against an Int32 column.
    pub fn find_where(&self, column: &str, value: impl Into<Value>) -> FerriteResult<Vec<T>> {
        let (clause, arg) = self.equality(column, value)?;
        let rows = self
            .conn
            .query(self.schema().name(), None, Some(&clause), &[arg])?;
        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut entity = T::default();
            self.mapper.read(row, &mut entity, &self.conn)?;
            result.push(entity);
        }
        Ok(result)
    }

    /// Updates the row identified by the entity's own identity.
    pub fn update(&self, entity: &T) -> FerriteResult<usize> {
        self.conn
            .with_transaction(|| self.mapper.update(entity, &self.conn))
    }

    /// Deletes by identity, cascading into relation children first.
    pub fn delete(&self, id: i64) -> FerriteResult<usize> {
        self.conn
            .with_transaction(|| self.mapper.delete(id, &self.conn))
    }

    /// Deletes every row whose column equals the given value, cascading into
    /// relation children of each matched row.
    pub fn delete_where(&self, column: &str, value: impl Into<Value>) -> FerriteResult<usize> {
        let (clause, arg) = self.equality(column, value)?;
        self.conn.with_transaction(|| {
            let rows = self
                .conn
                .query(self.schema().name(), None, Some(&clause), &[arg.clone()])?;
            for row in &rows {
                self.mapper.delete_children(row, &self.conn)?;
            }
            self.conn
                .delete(self.schema().name(), Some(&clause), &[arg.clone()])
        })
    }

    /// Deletes every row of the table, cascading into relation children.
    pub fn delete_all(&self) -> FerriteResult<usize> {
        self.conn.with_transaction(|| {
            let rows = self.conn.query(self.schema().name(), None, None, &[])?;
            for row in &rows {
                self.mapper.delete_children(row, &self.conn)?;
            }
            self.conn.delete(self.schema().name(), None, &[])
        })
    }

    /// Counts the rows of the table.
    pub fn count(&self) -> FerriteResult<usize> {
        Ok(self.conn.query(self.schema().name(), None, None, &[])?.len())
    }

    fn equality(&self, column: &str, value: impl Into<Value>) -> FerriteResult<(String, Value)> {
        let value = value.into();
        let value = match self.schema().column(column) {
            Some(def) => value.coerce(def.kind())?,
            None => value,
        };
        Ok((format!("{} = ?", column), value))
    }
}

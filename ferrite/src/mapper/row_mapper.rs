use crate::common::Value;
use crate::connection::StoreConnection;
use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::mapper::entity::{Entity, EntityDescriptor, FieldBinding};
use crate::mapper::RowValues;
use crate::schema::TableSchema;
use crate::store::StoreRow;
use std::sync::Arc;

/// The bidirectional converter between a typed instance and its row
/// representation.
///
/// # Purpose
/// Owns the built [EntityDescriptor] and implements the two mirror operations
/// of the mapping contract, plus the store-facing paths (`insert`, `fetch`,
/// `update`, `delete`) every façade forwards to.
///
/// # Contract
/// - `write` never includes the primary key column; the identity is supplied
///   separately
/// - relation columns cascade: `write` dispatches into the child type's own
///   mapper first and stores the child's identity, `read` fully materializes
///   the child instance
/// - a single top-level insert can therefore fan out into several physical
///   inserts; callers wrap the whole call in one transaction for atomicity
/// - `read(write(x))` reproduces every scalar field and every reachable
///   relation field of `x`, given a stable schema
#[derive(Clone)]
pub struct EntityMapper<T> {
    descriptor: EntityDescriptor<T>,
}

impl<T: Entity> EntityMapper<T> {
    /// Builds the mapper for `T`, deriving its schema descriptor.
    pub fn new() -> FerriteResult<EntityMapper<T>> {
        Ok(EntityMapper {
            descriptor: EntityDescriptor::build()?,
        })
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        self.descriptor.schema()
    }

    pub fn descriptor(&self) -> &EntityDescriptor<T> {
        &self.descriptor
    }

    /// Converts an instance into the value set for an insert or update.
    ///
    /// The primary key column is never part of the produced set. Relation
    /// fields are persisted first through the child mapper; a `None` child
    /// stores NULL.
    pub fn write(&self, instance: &T, conn: &StoreConnection) -> FerriteResult<RowValues> {
        let primary_key = self.schema().primary_key().to_string();
        let mut values = RowValues::new();
        for accessor in self.descriptor.accessors() {
            if accessor.column.eq_ignore_ascii_case(&primary_key) {
                continue;
            }
            match &accessor.binding {
                FieldBinding::Scalar { get, .. } => {
                    values.put(&accessor.column, get(instance));
                }
                FieldBinding::Relation { save, .. } => {
                    let child_id = save(instance, conn)?;
                    values.put(
                        &accessor.column,
                        child_id.map(Value::I64).unwrap_or(Value::Null),
                    );
                }
            }
        }
        Ok(values)
    }

    /// Assigns a physical row's values onto an instance.
    ///
    /// Columns are matched by name. A value that cannot convert to the target
    /// field is logged and leaves the field at its default; the rest of the
    /// row still maps. Relation columns fetch and assign the full child
    /// instance.
    pub fn read(&self, row: &StoreRow, instance: &mut T, conn: &StoreConnection) -> FerriteResult<()> {
        for accessor in self.descriptor.accessors() {
            match &accessor.binding {
                FieldBinding::Scalar { set, .. } => match row.get(&accessor.column) {
                    Some(value) => {
                        if let Err(err) = set(instance, value.clone()) {
                            log::warn!(
                                "Problems mapping column {} of {}: {}",
                                accessor.column,
                                self.schema().name(),
                                err
                            );
                        }
                    }
                    None => {
                        log::warn!(
                            "Column {} does not exist in row of {}",
                            accessor.column,
                            self.schema().name()
                        );
                    }
                },
                FieldBinding::Relation { load, .. } => {
                    let child_id = row.get(&accessor.column).and_then(|v| v.as_i64());
                    load(instance, child_id, conn)?;
                }
            }
        }
        Ok(())
    }

    /// Inserts an instance and assigns the generated identity back onto it.
    pub fn insert(&self, instance: &mut T, conn: &StoreConnection) -> FerriteResult<i64> {
        let values = self.write(instance, conn)?;
        let id = conn.insert(self.schema().name(), &values)?;
        self.descriptor.assign_identity(instance, id)?;
        Ok(id)
    }

    /// Inserts a fresh instance or updates an already-identified one.
    ///
    /// This is the path relation cascades go through: children fetched from
    /// the store keep their identity and update in place instead of
    /// duplicating.
    pub fn save(&self, instance: &mut T, conn: &StoreConnection) -> FerriteResult<i64> {
        let id = self.descriptor.identity_of(instance);
        if id == 0 {
            self.insert(instance, conn)
        } else {
            self.update(instance, conn)?;
            Ok(id)
        }
    }

    /// Fetches and fully materializes the instance with the given identity.
    pub fn fetch(&self, id: i64, conn: &StoreConnection) -> FerriteResult<Option<T>> {
        let clause = format!("{} = ?", self.schema().primary_key());
        let rows = conn.query(self.schema().name(), None, Some(&clause), &[Value::I64(id)])?;
        match rows.first() {
            Some(row) => {
                let mut instance = T::default();
                self.read(row, &mut instance, conn)?;
                Ok(Some(instance))
            }
            None => Ok(None),
        }
    }

    /// Updates the row identified by the instance's own identity.
    pub fn update(&self, instance: &T, conn: &StoreConnection) -> FerriteResult<usize> {
        let id = self.descriptor.identity_of(instance);
        if id == 0 {
            return Err(FerriteError::new(
                &format!("Cannot update unsaved {} instance", self.schema().name()),
                ErrorKind::NotFound,
            ));
        }
        let values = self.write(instance, conn)?;
        let clause = format!("{} = ?", self.schema().primary_key());
        conn.update(self.schema().name(), &values, Some(&clause), &[Value::I64(id)])
    }

    /// Deletes the row with the given identity, cascading into relation
    /// children first.
    ///
    /// Children are resolved from the stored relation columns of the row, not
    /// from any in-memory snapshot.
    pub fn delete(&self, id: i64, conn: &StoreConnection) -> FerriteResult<usize> {
        let clause = format!("{} = ?", self.schema().primary_key());
        let rows = conn.query(self.schema().name(), None, Some(&clause), &[Value::I64(id)])?;
        if let Some(row) = rows.first() {
            self.delete_children(row, conn)?;
        }
        conn.delete(self.schema().name(), Some(&clause), &[Value::I64(id)])
    }

    /// Cascades deletion into the relation children referenced by a stored row.
    pub(crate) fn delete_children(&self, row: &StoreRow, conn: &StoreConnection) -> FerriteResult<()> {
        for accessor in self.descriptor.accessors() {
            if let FieldBinding::Relation { remove, child_table, .. } = &accessor.binding {
                if let Some(child_id) = row.get(&accessor.column).and_then(|v| v.as_i64()) {
                    log::debug!(
                        "cascading delete of {} row {} from {}",
                        child_table,
                        child_id,
                        self.schema().name()
                    );
                    remove(child_id, conn)?;
                }
            }
        }
        Ok(())
    }
}

use crate::common::Value;
use crate::connection::StoreConnection;
use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::mapper::{Entity, EntityMapper, RowValues};
use crate::migration::holder::{GenericRow, RecoveredTable};
use crate::registry::SchemaRegistry;

/// Caller-supplied transformation hooks driving a migration.
///
/// # Purpose
/// The engine preserves data mechanically but performs no semantic
/// transformation between old and new shapes; that requires domain knowledge
/// only the caller has. Implementations receive the extracted rows and the new
/// empty store and re-insert transformed data with their own up-to-date type
/// knowledge.
///
/// # Call order
/// During one migration the engine invokes, in order:
/// 1. [MigrationHooks::set_versions] with the stored and target versions
/// 2. [MigrationHooks::load_data] after extraction, before any table is
///    destroyed, so the caller can snapshot anything it needs
/// 3. [MigrationHooks::on_delete] after the old tables are gone and the new
///    ones exist
/// 4. [MigrationHooks::add_data] to repopulate the new store
///
/// Returning an error from any hook aborts the whole migration and leaves the
/// stored version unchanged.
pub trait MigrationHooks: Send {
    fn set_versions(&mut self, old_version: i32, new_version: i32);

    fn load_data(&mut self, store: &MigrationStore) -> FerriteResult<()>;

    fn on_delete(&mut self, store: &MigrationStore) -> FerriteResult<()>;

    fn add_data(&mut self, store: &MigrationStore) -> FerriteResult<()>;
}

/// The view of the store handed to migration hooks.
///
/// Exposes the extracted [RecoveredTable]s together with two replay paths:
/// typed inserts through a registered entity, and raw replay of a
/// [GenericRow] into the current schema.
pub struct MigrationStore<'a> {
    conn: &'a StoreConnection,
    registry: &'a SchemaRegistry,
    extracted: &'a [RecoveredTable],
}

impl<'a> MigrationStore<'a> {
    pub(crate) fn new(
        conn: &'a StoreConnection,
        registry: &'a SchemaRegistry,
        extracted: &'a [RecoveredTable],
    ) -> Self {
        MigrationStore {
            conn,
            registry,
            extracted,
        }
    }

    /// Every table recovered from the old version, with its extracted rows.
    pub fn extracted_tables(&self) -> &[RecoveredTable] {
        self.extracted
    }

    /// One recovered table by name, case-insensitively.
    pub fn extracted_table(&self, name: &str) -> Option<&RecoveredTable> {
        self.extracted
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Direct access to the serialized connection, for callers that need it.
    pub fn connection(&self) -> &StoreConnection {
        self.conn
    }

    /// Inserts a typed entity into the new store.
    pub fn insert<T: Entity>(&self, entity: &mut T) -> FerriteResult<i64> {
        EntityMapper::<T>::new()?.insert(entity, self.conn)
    }

    /// Replays an extracted row into the current schema of `table`.
    ///
    /// Fields are matched by name against the current columns: dropped columns
    /// are skipped, the identity column is never replayed (the store assigns a
    /// fresh one), and a raw value that no longer converts to the current
    /// column kind is logged and left NULL rather than failing the row.
    pub fn insert_raw(&self, table: &str, row: &GenericRow) -> FerriteResult<i64> {
        let schema = self.registry.schema(table).ok_or_else(|| {
            FerriteError::new(
                &format!("Table {} is not registered in the current schema", table),
                ErrorKind::TableNotFound,
            )
        })?;
        let mut values = RowValues::new();
        for field in row.fields() {
            let column = match schema.column(field.name()) {
                Some(column) => column,
                None => continue,
            };
            if column.is_primary_key() {
                continue;
            }
            match field.raw_value() {
                Some(raw) => match Value::from_raw_text(column.kind(), raw) {
                    Ok(value) => values.put(column.name(), value),
                    Err(err) => {
                        log::warn!(
                            "Problems replaying column {} of {}: {}",
                            column.name(),
                            table,
                            err
                        );
                        values.put(column.name(), Value::Null);
                    }
                },
                None => values.put(column.name(), Value::Null),
            }
        }
        self.conn.insert(table, &values)
    }
}

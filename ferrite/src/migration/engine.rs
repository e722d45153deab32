use crate::common::META_TABLE;
use crate::connection::StoreConnection;
use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::metadata::MetadataStore;
use crate::migration::holder::{GenericRow, RecoveredTable};
use crate::migration::hooks::{MigrationHooks, MigrationStore};
use crate::migration::parser::parse_creation_text;
use crate::registry::SchemaRegistry;

/// The states a migration pass moves through.
///
/// `Stable → Detecting → RecoveringOldSchema → ExtractingRows → Dropping →
/// Recreating → Replaying → Stable`, or `→ Failed` from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Stable,
    Detecting,
    RecoveringOldSchema,
    ExtractingRows,
    Dropping,
    Recreating,
    Replaying,
    Failed,
}

/// What a migration pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The stored version already matches the target; nothing changed.
    UpToDate,
    /// Data was extracted, tables recreated and the hooks replayed the data.
    Migrated { old_version: i32, new_version: i32 },
    /// No hooks were registered: everything was dropped and recreated empty.
    RecreatedEmpty { old_version: i32, new_version: i32 },
}

/// Detects version mismatches and preserves data across schema changes.
///
/// # Purpose
/// Runs the whole migration pass against one store: detect, recover the old
/// schema from persisted text, extract rows into schema-agnostic holders,
/// drop and recreate tables, and replay through the caller's hooks. The
/// engine runs before any application-level CRUD is allowed on the store; the
/// connection open path is its single trigger point.
///
/// # Failure semantics
/// Any failing step aborts the whole migration: the engine moves to
/// [MigrationState::Failed], the stored version stays at its old value so a
/// retry on the next open is possible, and the failure surfaces as a
/// [ErrorKind::MigrationError] wrapping the cause.
pub struct MigrationEngine<'a> {
    conn: &'a StoreConnection,
    registry: &'a SchemaRegistry,
    metadata: &'a MetadataStore,
    store_name: &'a str,
    target_version: i32,
    state: MigrationState,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(
        conn: &'a StoreConnection,
        registry: &'a SchemaRegistry,
        metadata: &'a MetadataStore,
        store_name: &'a str,
        target_version: i32,
    ) -> Self {
        MigrationEngine {
            conn,
            registry,
            metadata,
            store_name,
            target_version,
            state: MigrationState::Stable,
        }
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Runs the migration pass.
    ///
    /// With the stored version already at the target this is a no-op: no drop,
    /// no recreate, no hook runs. Without hooks the fallback is the trivial
    /// migration: drop everything and recreate empty, loudly.
    pub fn run(
        &mut self,
        hooks: Option<&mut (dyn MigrationHooks + '_)>,
    ) -> FerriteResult<MigrationOutcome> {
        // keep the engine open across the whole pass
        let _span = self.conn.guard()?;
        self.state = MigrationState::Detecting;
        let old_version = self.conn.version()?;
        if old_version == self.target_version {
            log::debug!(
                "store {} already at version {}",
                self.store_name,
                self.target_version
            );
            self.state = MigrationState::Stable;
            return Ok(MigrationOutcome::UpToDate);
        }
        log::debug!(
            "migrating store {} from version {} to {}",
            self.store_name,
            old_version,
            self.target_version
        );
        let result = match hooks {
            Some(hooks) => self.migrate_with_hooks(old_version, hooks),
            None => self.recreate_empty(old_version),
        };
        match result {
            Ok(outcome) => {
                self.state = MigrationState::Stable;
                Ok(outcome)
            }
            Err(err) => {
                self.state = MigrationState::Failed;
                log::error!(
                    "migration of store {} from version {} to {} failed: {}",
                    self.store_name,
                    old_version,
                    self.target_version,
                    err
                );
                Err(FerriteError::new_with_cause(
                    &format!(
                        "Migration of store {} from version {} to {} failed",
                        self.store_name, old_version, self.target_version
                    ),
                    ErrorKind::MigrationError,
                    err,
                ))
            }
        }
    }

    fn migrate_with_hooks(
        &mut self,
        old_version: i32,
        hooks: &mut dyn MigrationHooks,
    ) -> FerriteResult<MigrationOutcome> {
        hooks.set_versions(old_version, self.target_version);

        self.state = MigrationState::RecoveringOldSchema;
        let creation_text = self.metadata.fetch(old_version, self.store_name)?;
        let recovered_schemas = parse_creation_text(&creation_text)?;

        self.state = MigrationState::ExtractingRows;
        let mut extracted = Vec::new();
        for schema in recovered_schemas {
            if schema.name().eq_ignore_ascii_case(META_TABLE) {
                continue;
            }
            let rows = match self.conn.query(schema.name(), None, None, &[]) {
                Ok(rows) => rows,
                Err(err) if err.kind() == &ErrorKind::TableNotFound => {
                    log::warn!(
                        "recovered table {} no longer exists, extracting nothing",
                        schema.name()
                    );
                    Vec::new()
                }
                Err(err) => return Err(err),
            };
            let generic_rows: Vec<GenericRow> = rows
                .iter()
                .map(|row| GenericRow::from_store_row(&schema, row))
                .collect();
            log::debug!(
                "extracted {} rows from table {}",
                generic_rows.len(),
                schema.name()
            );
            extracted.push(RecoveredTable::new(schema, generic_rows));
        }
        let store = MigrationStore::new(self.conn, self.registry, &extracted);
        hooks.load_data(&store)?;

        self.drop_all_tables()?;
        self.recreate_tables()?;

        hooks.on_delete(&store)?;

        self.state = MigrationState::Replaying;
        self.conn.with_transaction(|| {
            hooks.add_data(&store)?;
            self.conn.set_version(self.target_version)
        })?;

        Ok(MigrationOutcome::Migrated {
            old_version,
            new_version: self.target_version,
        })
    }

    /// The trivial migration: explicit data loss, never silent.
    fn recreate_empty(&mut self, old_version: i32) -> FerriteResult<MigrationOutcome> {
        log::warn!(
            "no migration hooks registered for store {}; dropping all tables and recreating empty, data of version {} is lost",
            self.store_name,
            old_version
        );
        self.drop_all_tables()?;
        self.recreate_tables()?;
        self.conn.with_transaction(|| {
            self.conn.set_version(self.target_version)
        })?;
        Ok(MigrationOutcome::RecreatedEmpty {
            old_version,
            new_version: self.target_version,
        })
    }

    /// Destroys every existing table except the metadata store's own, inside
    /// one transaction.
    fn drop_all_tables(&mut self) -> FerriteResult<()> {
        self.state = MigrationState::Dropping;
        self.conn.with_transaction(|| {
            for table in self.conn.table_names()? {
                if table.eq_ignore_ascii_case(META_TABLE) {
                    continue;
                }
                log::debug!("DROP TABLE {}", table);
                self.conn.execute(&format!("DROP TABLE {}", table))?;
            }
            Ok(())
        })
    }

    /// Creates every currently registered table and records the new schema
    /// version entry, inside a second transaction.
    fn recreate_tables(&mut self) -> FerriteResult<()> {
        self.state = MigrationState::Recreating;
        self.conn.with_transaction(|| {
            for schema in self.registry.schemas() {
                self.conn.execute(&schema.create_table_string())?;
            }
            self.metadata.record(
                self.target_version,
                self.store_name,
                &self.registry.creation_text(),
            )
        })
    }
}

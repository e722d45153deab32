use crate::connection::StoreConnection;
use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::ferrite_builder::FerriteBuilder;
use crate::ferrite_config::FerriteConfig;
use crate::mapper::{Entity, EntityMapper};
use crate::metadata::MetadataStore;
use crate::migration::{MigrationEngine, MigrationHooks};
use crate::registry::SchemaRegistry;
use crate::repository::Repository;
use crate::store::StoreEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The main handle to one Ferrite store.
///
/// # Purpose
/// Entry point for all operations: typed repositories, the schema registry,
/// version introspection, and explicit close. The open path is where version
/// detection and migration happen; by the time a handle exists, the store's
/// tables match the registered schemas and the stored version equals the
/// configured one.
///
/// `Ferrite` uses the PIMPL pattern internally: clones share the same
/// underlying state through `Arc`, so a handle is cheap to pass around and
/// thread-safe.
///
/// # Examples
///
/// ```rust,ignore
/// let db = Ferrite::builder()
///     .store_name("mydb")
///     .schema_version(1)
///     .register::<Person>()?
///     .open_in_memory()?;
///
/// let people = db.repository::<Person>()?;
/// let mut alice = Person { id: 0, name: "Alice".into(), age: 30 };
/// people.insert(&mut alice)?;
/// db.close()?;
/// ```
#[derive(Clone)]
pub struct Ferrite {
    inner: Arc<FerriteInner>,
}

struct FerriteInner {
    config: FerriteConfig,
    registry: SchemaRegistry,
    conn: StoreConnection,
    metadata: MetadataStore,
    closed: AtomicBool,
}

impl std::fmt::Debug for Ferrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ferrite")
            .field("store_name", &self.inner.config.store_name())
            .finish()
    }
}

impl Ferrite {
    /// Creates a new [FerriteBuilder] for configuring and opening a store.
    pub fn builder() -> FerriteBuilder {
        FerriteBuilder::new()
    }

    /// Opens the store: bootstraps the metadata table, then creates or
    /// migrates depending on the persisted version.
    pub(crate) fn open(
        config: FerriteConfig,
        registry: SchemaRegistry,
        mut hooks: Option<Box<dyn MigrationHooks>>,
        engine: Box<dyn StoreEngine>,
    ) -> FerriteResult<Ferrite> {
        let conn = StoreConnection::new(engine);
        let metadata = {
            // hold one open span across the whole establishment; failure here
            // is fatal for this attempt
            let _span = conn.guard()?;
            let metadata = MetadataStore::new(conn.clone())?;
            let current = conn.version()?;
            let target = config.schema_version();
            if current == 0 {
                log::debug!(
                    "creating store {} at version {}",
                    config.store_name(),
                    target
                );
                conn.with_transaction(|| {
                    for schema in registry.schemas() {
                        conn.execute(&schema.create_table_string())?;
                    }
                    metadata.record(target, config.store_name(), &registry.creation_text())?;
                    conn.set_version(target)
                })?;
            } else if current != target {
                let mut migration =
                    MigrationEngine::new(&conn, &registry, &metadata, config.store_name(), target);
                migration.run(hooks.as_deref_mut())?;
            } else {
                // same version: make sure tables exist and history is recorded
                for schema in registry.schemas() {
                    conn.execute(&schema.create_table_string())?;
                }
                metadata.record(target, config.store_name(), &registry.creation_text())?;
            }
            metadata
        };
        Ok(Ferrite {
            inner: Arc::new(FerriteInner {
                config,
                registry,
                conn,
                metadata,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Gets the typed repository for a registered entity type.
    ///
    /// # Errors
    /// [ErrorKind::TableNotFound] if `T` was not registered before open; the
    /// store's tables would not match its schema.
    pub fn repository<T: Entity>(&self) -> FerriteResult<Repository<T>> {
        self.ensure_open()?;
        if !self.inner.registry.contains(T::table_name()) {
            return Err(FerriteError::new(
                &format!("Type mapping to table {} is not registered", T::table_name()),
                ErrorKind::TableNotFound,
            ));
        }
        Ok(Repository::new(
            EntityMapper::<T>::new()?,
            self.inner.conn.clone(),
        ))
    }

    /// The schema registry backing this store.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    /// The serialized connection backing this store.
    pub fn connection(&self) -> &StoreConnection {
        &self.inner.conn
    }

    /// The metadata store of this store.
    pub fn metadata(&self) -> &MetadataStore {
        &self.inner.metadata
    }

    pub fn store_name(&self) -> &str {
        self.inner.config.store_name()
    }

    /// Reads the persisted schema version.
    pub fn version(&self) -> FerriteResult<i32> {
        self.ensure_open()?;
        self.inner.conn.version()
    }

    /// Marks this handle closed. Further repository or version access fails
    /// with [ErrorKind::StoreAlreadyClosed].
    pub fn close(&self) -> FerriteResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> FerriteResult<()> {
        if self.is_closed() {
            return Err(FerriteError::new(
                &format!("Store {} is already closed", self.store_name()),
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Value, META_TABLE};
    use crate::errors::FerriteResult;
    use crate::mapper::EntityFields;
    use crate::migration::MigrationStore;
    use crate::store::MemoryEngine;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct PersonV1 {
        id: i64,
        name: String,
        age: i32,
    }

    impl Entity for PersonV1 {
        fn table_name() -> &'static str {
            "person"
        }

        fn fields(fields: &mut EntityFields<Self>) {
            fields
                .int64("id", |p| p.id, |p, v| p.id = v)
                .text("name", |p| p.name.clone(), |p, v| p.name = v)
                .int32("age", |p| p.age, |p, v| p.age = v);
        }
    }

    #[derive(Clone, Default, Debug, PartialEq)]
    struct PersonV2 {
        id: i64,
        name: String,
        nickname: String,
    }

    impl Entity for PersonV2 {
        fn table_name() -> &'static str {
            "person"
        }

        fn fields(fields: &mut EntityFields<Self>) {
            fields
                .int64("id", |p| p.id, |p, v| p.id = v)
                .text("name", |p| p.name.clone(), |p, v| p.name = v)
                .text("nickname", |p| p.nickname.clone(), |p, v| p.nickname = v);
        }
    }

    #[derive(Clone, Default)]
    struct Unregistered {
        id: i64,
    }

    impl Entity for Unregistered {
        fn table_name() -> &'static str {
            "unregistered"
        }

        fn fields(fields: &mut EntityFields<Self>) {
            fields.int64("id", |u| u.id, |u, v| u.id = v);
        }
    }

    struct NicknameHooks;

    impl MigrationHooks for NicknameHooks {
        fn set_versions(&mut self, _old_version: i32, _new_version: i32) {}

        fn load_data(&mut self, _store: &MigrationStore) -> FerriteResult<()> {
            Ok(())
        }

        fn on_delete(&mut self, _store: &MigrationStore) -> FerriteResult<()> {
            Ok(())
        }

        fn add_data(&mut self, store: &MigrationStore) -> FerriteResult<()> {
            if let Some(table) = store.extracted_table("person") {
                for row in table.rows().to_vec() {
                    let mut person = PersonV2 {
                        id: 0,
                        name: row.raw_value("name").unwrap_or_default().to_string(),
                        nickname: String::new(),
                    };
                    store.insert(&mut person)?;
                }
            }
            Ok(())
        }
    }

    fn v1_store(engine: MemoryEngine) -> Ferrite {
        Ferrite::builder()
            .store_name("mydb")
            .schema_version(1)
            .register::<PersonV1>()
            .unwrap()
            .open(engine)
            .unwrap()
    }

    #[test]
    fn test_fresh_open_creates_tables_and_records_metadata() {
        let db = v1_store(MemoryEngine::new());
        assert_eq!(db.version().unwrap(), 1);
        let tables = db.connection().table_names().unwrap();
        assert!(tables.contains(&META_TABLE.to_string()));
        assert!(tables.contains(&"person".to_string()));
        assert!(db.metadata().exists(1, "mydb").unwrap());
    }

    #[test]
    fn test_reopen_same_version_preserves_data() {
        let engine = MemoryEngine::new();
        let db = v1_store(engine.clone());
        let repo = db.repository::<PersonV1>().unwrap();
        let mut alice = PersonV1 {
            id: 0,
            name: "Alice".to_string(),
            age: 30,
        };
        repo.insert(&mut alice).unwrap();
        db.close().unwrap();

        let db = v1_store(engine);
        let repo = db.repository::<PersonV1>().unwrap();
        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(db.version().unwrap(), 1);
    }

    #[test]
    fn test_version_bump_runs_migration_on_open() {
        let engine = MemoryEngine::new();
        let db = v1_store(engine.clone());
        let repo = db.repository::<PersonV1>().unwrap();
        for (name, age) in [("Alice", 30), ("Bob", 40)] {
            let mut person = PersonV1 {
                id: 0,
                name: name.to_string(),
                age,
            };
            repo.insert(&mut person).unwrap();
        }
        db.close().unwrap();

        let db = Ferrite::builder()
            .store_name("mydb")
            .schema_version(2)
            .register::<PersonV2>()
            .unwrap()
            .migration_hooks(NicknameHooks)
            .open(engine)
            .unwrap();
        assert_eq!(db.version().unwrap(), 2);
        let repo = db.repository::<PersonV2>().unwrap();
        let mut people = repo.find_all().unwrap();
        people.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].name, "Alice");
        assert_eq!(people[1].name, "Bob");
        assert!(people.iter().all(|p| p.nickname.is_empty()));
    }

    #[test]
    fn test_version_bump_without_hooks_recreates_empty() {
        let engine = MemoryEngine::new();
        let db = v1_store(engine.clone());
        let repo = db.repository::<PersonV1>().unwrap();
        let mut alice = PersonV1 {
            id: 0,
            name: "Alice".to_string(),
            age: 30,
        };
        repo.insert(&mut alice).unwrap();
        db.close().unwrap();

        let db = Ferrite::builder()
            .store_name("mydb")
            .schema_version(2)
            .register::<PersonV2>()
            .unwrap()
            .open(engine)
            .unwrap();
        assert_eq!(db.version().unwrap(), 2);
        assert_eq!(db.repository::<PersonV2>().unwrap().count().unwrap(), 0);
    }

    #[test]
    fn test_repository_requires_registration() {
        let db = v1_store(MemoryEngine::new());
        let err = db.repository::<Unregistered>().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TableNotFound);
    }

    #[test]
    fn test_closed_handle_refuses_access() {
        let db = v1_store(MemoryEngine::new());
        db.close().unwrap();
        assert!(db.is_closed());
        let err = db.repository::<PersonV1>().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreAlreadyClosed);
        let err = db.version().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreAlreadyClosed);
    }

    #[test]
    fn test_clones_share_state() {
        let db = v1_store(MemoryEngine::new());
        let other = db.clone();
        let repo = db.repository::<PersonV1>().unwrap();
        let mut alice = PersonV1 {
            id: 0,
            name: "Alice".to_string(),
            age: 30,
        };
        repo.insert(&mut alice).unwrap();
        assert_eq!(
            other.repository::<PersonV1>().unwrap().count().unwrap(),
            1
        );
        other.close().unwrap();
        assert!(db.is_closed());
    }

    #[test]
    fn test_relation_round_trip_through_facade() {
        // end to end: nested relation through builder, facade and repository
        #[derive(Clone, Default, Debug, PartialEq)]
        struct Address {
            id: i64,
            street: String,
        }

        impl Entity for Address {
            fn table_name() -> &'static str {
                "address"
            }

            fn fields(fields: &mut EntityFields<Self>) {
                fields
                    .int64("id", |a| a.id, |a, v| a.id = v)
                    .text("street", |a| a.street.clone(), |a, v| a.street = v);
            }
        }

        #[derive(Clone, Default, Debug, PartialEq)]
        struct Employee {
            id: i64,
            name: String,
            address: Option<Address>,
        }

        impl Entity for Employee {
            fn table_name() -> &'static str {
                "employee"
            }

            fn fields(fields: &mut EntityFields<Self>) {
                fields
                    .int64("id", |e| e.id, |e, v| e.id = v)
                    .text("name", |e| e.name.clone(), |e, v| e.name = v)
                    .relation::<Address>("address", |e| e.address.clone(), |e, v| e.address = v);
            }
        }

        let db = Ferrite::builder()
            .store_name("hr")
            .register::<Address>()
            .unwrap()
            .register::<Employee>()
            .unwrap()
            .open_in_memory()
            .unwrap();
        let repo = db.repository::<Employee>().unwrap();
        let mut employee = Employee {
            id: 0,
            name: "Alice".to_string(),
            address: Some(Address {
                id: 0,
                street: "1 Main St".to_string(),
            }),
        };
        let id = repo.insert(&mut employee).unwrap();
        let restored = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(restored.address.unwrap().street, "1 Main St");
        // the relation column stores the child identity
        let rows = db.connection().query("employee", None, None, &[]).unwrap();
        assert_eq!(rows[0].get("address_id"), Some(&Value::I64(1)));
    }
}

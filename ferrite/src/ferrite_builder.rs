use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::ferrite::Ferrite;
use crate::ferrite_config::FerriteConfig;
use crate::mapper::Entity;
use crate::migration::MigrationHooks;
use crate::registry::SchemaRegistry;
use crate::store::{MemoryEngine, StoreEngine};

/// Builder for configuring and opening a [Ferrite] store.
///
/// # Purpose
/// Collects the store name, the target schema version, the registered entity
/// types and the optional migration hooks, then opens the store. Opening is
/// the single trigger point for the version check: a mismatch runs the
/// migration engine to completion before the returned handle can serve any
/// CRUD operation.
///
/// # Examples
///
/// ```rust,ignore
/// let db = Ferrite::builder()
///     .store_name("mydb")
///     .schema_version(2)
///     .register::<Person>()?
///     .migration_hooks(MyHooks::new())
///     .open_in_memory()?;
/// ```
pub struct FerriteBuilder {
    config: FerriteConfig,
    registry: SchemaRegistry,
    hooks: Option<Box<dyn MigrationHooks>>,
}

impl std::fmt::Debug for FerriteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FerriteBuilder")
            .field("config", &self.config)
            .field("has_hooks", &self.hooks.is_some())
            .finish()
    }
}

impl Default for FerriteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FerriteBuilder {
    pub fn new() -> Self {
        FerriteBuilder {
            config: FerriteConfig::default(),
            registry: SchemaRegistry::new(),
            hooks: None,
        }
    }

    /// Sets the store name recorded in the metadata store.
    pub fn store_name(mut self, name: &str) -> Self {
        self.config.set_store_name(name);
        self
    }

    /// Sets the schema version the registered types describe. Must be at
    /// least 1.
    pub fn schema_version(mut self, version: i32) -> Self {
        self.config.set_schema_version(version);
        self
    }

    /// Registers an entity type, deriving and validating its schema.
    ///
    /// Fails fast on registration problems: a missing identity field, a
    /// non-integer identity, or a cyclic relation graph.
    pub fn register<T: Entity>(self) -> FerriteResult<Self> {
        self.registry.register::<T>()?;
        Ok(self)
    }

    /// Installs the migration hooks invoked on a version mismatch.
    ///
    /// Without hooks, a mismatch falls back to the trivial migration: drop
    /// everything and recreate empty.
    pub fn migration_hooks(mut self, hooks: impl MigrationHooks + 'static) -> Self {
        self.hooks = Some(Box::new(hooks));
        self
    }

    /// Opens the store on the given engine, creating or migrating as needed.
    pub fn open(self, engine: impl StoreEngine + 'static) -> FerriteResult<Ferrite> {
        if self.config.schema_version() < 1 {
            return Err(FerriteError::new(
                &format!(
                    "Schema version must be at least 1, got {}",
                    self.config.schema_version()
                ),
                ErrorKind::InvalidDataType,
            ));
        }
        Ferrite::open(self.config, self.registry, self.hooks, Box::new(engine))
    }

    /// Opens the store on a fresh in-memory engine.
    pub fn open_in_memory(self) -> FerriteResult<Ferrite> {
        self.open(MemoryEngine::new())
    }
}

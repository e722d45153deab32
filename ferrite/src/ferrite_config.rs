/// Configuration for a Ferrite store.
///
/// # Purpose
/// Carries the identity of one store: its name (the key the metadata store
/// records schema history under) and the schema version the registered types
/// describe. Built through [crate::ferrite_builder::FerriteBuilder] and
/// immutable afterwards.
///
/// # Versioning
/// Versions start at 1; a fresh engine reports 0 and is initialized straight
/// to the configured version. Raising the version on an existing store
/// triggers the migration engine on open.
#[derive(Debug, Clone, PartialEq)]
pub struct FerriteConfig {
    store_name: String,
    schema_version: i32,
}

impl Default for FerriteConfig {
    fn default() -> Self {
        FerriteConfig {
            store_name: "ferrite".to_string(),
            schema_version: 1,
        }
    }
}

impl FerriteConfig {
    pub fn new(store_name: &str, schema_version: i32) -> Self {
        FerriteConfig {
            store_name: store_name.to_string(),
            schema_version,
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn schema_version(&self) -> i32 {
        self.schema_version
    }

    pub(crate) fn set_store_name(&mut self, name: &str) {
        self.store_name = name.to_string();
    }

    pub(crate) fn set_schema_version(&mut self, version: i32) {
        self.schema_version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FerriteConfig::default();
        assert_eq!(config.store_name(), "ferrite");
        assert_eq!(config.schema_version(), 1);
    }

    #[test]
    fn test_new_config() {
        let config = FerriteConfig::new("mydb", 3);
        assert_eq!(config.store_name(), "mydb");
        assert_eq!(config.schema_version(), 3);
    }

    #[test]
    fn test_setters() {
        let mut config = FerriteConfig::default();
        config.set_store_name("other");
        config.set_schema_version(2);
        assert_eq!(config, FerriteConfig::new("other", 2));
    }
}

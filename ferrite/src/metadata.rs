use crate::common::{Value, META_TABLE};
use crate::connection::StoreConnection;
use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::mapper::{Entity, EntityFields, EntityMapper};

/// A durable record of the exact textual schema used to create one store
/// version.
///
/// Created once per `(version, store_name)` pair, never mutated, and read back
/// only during migration. The `creation_text` column is the only persisted
/// artifact with a bit-exact format requirement: it must round-trip through
/// the migration tokenizer without loss.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaVersion {
    pub id: i64,
    pub version: i32,
    pub store_name: String,
    pub creation_text: String,
}

// The metadata table maps itself through the same descriptor builder and row
// mapper as any registered type; there is no special-cased persistence code.
impl Entity for SchemaVersion {
    fn table_name() -> &'static str {
        META_TABLE
    }

    fn fields(fields: &mut EntityFields<Self>) {
        fields
            .int64("id", |m| m.id, |m, v| m.id = v)
            .int32("version", |m| m.version, |m, v| m.version = v)
            .text(
                "store_name",
                |m| m.store_name.clone(),
                |m, v| m.store_name = v,
            )
            .text(
                "creation_text",
                |m| m.creation_text.clone(),
                |m, v| m.creation_text = v,
            );
    }
}

/// The self-describing table of [SchemaVersion] records.
///
/// # Purpose
/// Records, for each `(version, store_name)` pair, the exact creation text of
/// the schema set at the moment it was first created. The migration engine
/// depends on it to recover historical schemas with no live connection to the
/// old schema objects.
///
/// # Characteristics
/// - Append-only: `record` never mutates an existing entry
/// - Idempotent: recording an already-present pair is a no-op
#[derive(Clone)]
pub struct MetadataStore {
    mapper: EntityMapper<SchemaVersion>,
    conn: StoreConnection,
}

impl MetadataStore {
    /// Opens the metadata store, creating its table if missing.
    pub fn new(conn: StoreConnection) -> FerriteResult<MetadataStore> {
        let mapper = EntityMapper::<SchemaVersion>::new()?;
        conn.execute(&mapper.schema().create_table_string())?;
        Ok(MetadataStore { mapper, conn })
    }

    /// Checks whether a record exists for the given version and store name.
    pub fn exists(&self, version: i32, store_name: &str) -> FerriteResult<bool> {
        Ok(self.find(version, store_name)?.is_some())
    }

    /// Records the creation text for a version, unless an entry for the pair
    /// already exists.
    pub fn record(&self, version: i32, store_name: &str, creation_text: &str) -> FerriteResult<()> {
        if self.exists(version, store_name)? {
            log::debug!(
                "schema version {} of {} already recorded",
                version,
                store_name
            );
            return Ok(());
        }
        let mut record = SchemaVersion {
            id: 0,
            version,
            store_name: store_name.to_string(),
            creation_text: creation_text.to_string(),
        };
        self.mapper.insert(&mut record, &self.conn)?;
        log::debug!("recorded schema version {} of {}", version, store_name);
        Ok(())
    }

    /// Fetches the creation text recorded for a version.
    ///
    /// # Errors
    /// [ErrorKind::MetadataNotFound] if no record exists for the pair.
    pub fn fetch(&self, version: i32, store_name: &str) -> FerriteResult<String> {
        self.find(version, store_name)?
            .map(|record| record.creation_text)
            .ok_or_else(|| {
                FerriteError::new(
                    &format!(
                        "No schema version record for version {} of {}",
                        version, store_name
                    ),
                    ErrorKind::MetadataNotFound,
                )
            })
    }

    fn find(&self, version: i32, store_name: &str) -> FerriteResult<Option<SchemaVersion>> {
        let rows = self.conn.query(
            META_TABLE,
            None,
            Some("version = ? AND store_name = ?"),
            &[Value::I32(version), Value::from(store_name)],
        )?;
        match rows.first() {
            Some(row) => {
                let mut record = SchemaVersion::default();
                self.mapper.read(row, &mut record, &self.conn)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEngine;

    fn metadata_store() -> MetadataStore {
        let conn = StoreConnection::new(Box::new(MemoryEngine::new()));
        MetadataStore::new(conn).unwrap()
    }

    #[test]
    fn test_new_creates_meta_table() {
        let conn = StoreConnection::new(Box::new(MemoryEngine::new()));
        MetadataStore::new(conn.clone()).unwrap();
        assert_eq!(conn.table_names().unwrap(), vec![META_TABLE.to_string()]);
    }

    #[test]
    fn test_record_and_fetch() {
        let store = metadata_store();
        store
            .record(1, "mydb", "CREATE TABLE IF NOT EXISTS person (id INTEGER PRIMARY KEY AUTOINCREMENT);")
            .unwrap();
        assert!(store.exists(1, "mydb").unwrap());
        let text = store.fetch(1, "mydb").unwrap();
        assert!(text.contains("person"));
    }

    #[test]
    fn test_record_is_idempotent() {
        let store = metadata_store();
        store.record(1, "mydb", "first text").unwrap();
        store.record(1, "mydb", "second text").unwrap();
        // the original record wins, append-only
        assert_eq!(store.fetch(1, "mydb").unwrap(), "first text");
    }

    #[test]
    fn test_versions_are_independent() {
        let store = metadata_store();
        store.record(1, "mydb", "v1 text").unwrap();
        store.record(2, "mydb", "v2 text").unwrap();
        assert_eq!(store.fetch(1, "mydb").unwrap(), "v1 text");
        assert_eq!(store.fetch(2, "mydb").unwrap(), "v2 text");
    }

    #[test]
    fn test_store_names_are_independent() {
        let store = metadata_store();
        store.record(1, "first_db", "first text").unwrap();
        assert!(!store.exists(1, "other_db").unwrap());
    }

    #[test]
    fn test_fetch_missing_fails() {
        let store = metadata_store();
        let err = store.fetch(9, "mydb").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::MetadataNotFound);
    }
}

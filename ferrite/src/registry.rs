use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::mapper::entity::{collect_relation_edges, RelationEdge};
use crate::mapper::{Entity, EntityDescriptor};
use crate::schema::TableSchema;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Explicit registry of mapped schemas.
///
/// # Purpose
/// Holds the [TableSchema] of every registered type, in registration order,
/// and renders the semicolon-joined creation text the metadata store persists.
/// There is deliberately no process-wide instance: a registry is created per
/// store and passed by reference to the components that need it, so several
/// independent stores can coexist in one process.
///
/// # Relation graph
/// Registration walks the relation edges of the type being registered and
/// fails with [ErrorKind::CyclicRelation] when the graph loops back on
/// itself. Only acyclic relation graphs are supported.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    inner: Arc<RwLock<IndexMap<String, Arc<TableSchema>>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    /// Registers `T`, deriving its schema descriptor.
    ///
    /// Idempotent: registering the same type again returns the already stored
    /// schema. The relation graph reachable from `T` is checked for cycles
    /// before anything is stored.
    pub fn register<T: Entity>(&self) -> FerriteResult<Arc<TableSchema>> {
        check_relation_cycles(T::table_name(), collect_relation_edges::<T>())?;
        if let Some(existing) = self.inner.read().get(T::table_name()) {
            return Ok(existing.clone());
        }
        let descriptor = EntityDescriptor::<T>::build()?;
        let schema = descriptor.schema().clone();
        log::debug!(
            "registered table {} with {} columns",
            schema.name(),
            schema.columns().len()
        );
        self.inner
            .write()
            .insert(schema.name().to_string(), schema.clone());
        Ok(schema)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.inner.read().contains_key(table)
    }

    pub fn schema(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.inner.read().get(table).cloned()
    }

    /// Registered table names, in registration order.
    pub fn table_names(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn schemas(&self) -> Vec<Arc<TableSchema>> {
        self.inner.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Renders the creation text of the whole registered set: each table's
    /// `CREATE TABLE IF NOT EXISTS` statement followed by a semicolon.
    ///
    /// This exact text is recorded by the metadata store and is the only
    /// durable record of the schema shape; it must tokenize back without loss.
    pub fn creation_text(&self) -> String {
        let mut text = String::new();
        for schema in self.inner.read().values() {
            text.push_str(&schema.create_table_string());
            text.push(';');
        }
        text
    }
}

/// Depth-first walk of the relation graph, failing on the first cycle.
fn check_relation_cycles(root: &'static str, edges: Vec<RelationEdge>) -> FerriteResult<()> {
    fn visit(table: &str, edges: Vec<RelationEdge>, path: &mut Vec<String>) -> FerriteResult<()> {
        if path.iter().any(|t| t == table) {
            return Err(FerriteError::new(
                &format!(
                    "Cyclic relation detected: {} -> {}",
                    path.join(" -> "),
                    table
                ),
                ErrorKind::CyclicRelation,
            ));
        }
        path.push(table.to_string());
        for edge in edges {
            visit(edge.table, (edge.expand)(), path)?;
        }
        path.pop();
        Ok(())
    }
    let mut path = Vec::new();
    visit(root, edges, &mut path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::EntityFields;

    #[derive(Clone, Default)]
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

    #[derive(Clone, Default)]
    struct Person {
        id: i64,
        address: Option<Address>,
    }

    impl Entity for Person {
        fn table_name() -> &'static str {
            "person"
        }

        fn fields(fields: &mut EntityFields<Self>) {
            fields
                .int64("id", |p| p.id, |p, v| p.id = v)
                .relation::<Address>("address", |p| p.address.clone(), |p, v| p.address = v);
        }
    }

    // a deliberately cyclic pair
    #[derive(Clone, Default)]
    struct Chicken {
        id: i64,
        egg: Option<Box<Egg>>,
    }

    #[derive(Clone, Default)]
    struct Egg {
        id: i64,
        chicken: Option<Box<Chicken>>,
    }

    impl Entity for Chicken {
        fn table_name() -> &'static str {
            "chicken"
        }

        fn fields(fields: &mut EntityFields<Self>) {
            fields.int64("id", |c| c.id, |c, v| c.id = v).relation::<Egg>(
                "egg",
                |c| c.egg.as_deref().cloned(),
                |c, v| c.egg = v.map(Box::new),
            );
        }
    }

    impl Entity for Egg {
        fn table_name() -> &'static str {
            "egg"
        }

        fn fields(fields: &mut EntityFields<Self>) {
            fields
                .int64("id", |e| e.id, |e, v| e.id = v)
                .relation::<Chicken>(
                    "chicken",
                    |e| e.chicken.as_deref().cloned(),
                    |e, v| e.chicken = v.map(Box::new),
                );
        }
    }

    #[test]
    fn test_register_stores_schema_in_order() {
        let registry = SchemaRegistry::new();
        registry.register::<Address>().unwrap();
        registry.register::<Person>().unwrap();
        assert_eq!(registry.table_names(), vec!["address", "person"]);
        assert!(registry.contains("person"));
        assert!(!registry.contains("missing"));
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = SchemaRegistry::new();
        let first = registry.register::<Person>().unwrap();
        let second = registry.register::<Person>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_cyclic_relation_fails_at_registration() {
        let registry = SchemaRegistry::new();
        let err = registry.register::<Chicken>().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::CyclicRelation);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_creation_text_joins_with_semicolons() {
        let registry = SchemaRegistry::new();
        registry.register::<Address>().unwrap();
        registry.register::<Person>().unwrap();
        let text = registry.creation_text();
        assert_eq!(
            text,
            "CREATE TABLE IF NOT EXISTS address (id BIGINT PRIMARY KEY AUTOINCREMENT, street TEXT);\
             CREATE TABLE IF NOT EXISTS person (id BIGINT PRIMARY KEY AUTOINCREMENT, address_id BIGINT);"
        );
    }
}

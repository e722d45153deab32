use crate::common::Value;
use indexmap::IndexMap;

/// An ordered set of named column values.
///
/// # Purpose
/// The value set produced by a row mapper's write path and consumed by the
/// store engine's insert/update primitives. Insertion order is preserved so
/// values line up with the schema's stable column positions.
///
/// # Characteristics
/// - Never contains the primary key column when produced by a mapper; the
///   identity is supplied separately
/// - Name lookup is by exact column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowValues {
    values: IndexMap<String, Value>,
}

impl RowValues {
    pub fn new() -> Self {
        RowValues {
            values: IndexMap::new(),
        }
    }

    /// Puts a value under the given column name, replacing any existing one.
    pub fn put(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

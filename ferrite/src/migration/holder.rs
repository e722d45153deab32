use crate::common::Value;
use crate::errors::FerriteResult;
use crate::schema::{ColumnKind, TableSchema};
use crate::store::StoreRow;

/// One field of a schema-agnostic row: name, kind, and the value as raw text.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenericField {
    name: String,
    kind: ColumnKind,
    raw_value: Option<String>,
}

impl GenericField {
    pub fn new(name: &str, kind: ColumnKind, raw_value: Option<String>) -> Self {
        GenericField {
            name: name.to_string(),
            kind,
            raw_value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    /// The raw textual value; `None` represents SQL NULL.
    pub fn raw_value(&self) -> Option<&str> {
        self.raw_value.as_deref()
    }

    /// Parses the raw text back into a typed [Value] of this field's kind.
    pub fn value(&self) -> FerriteResult<Value> {
        match &self.raw_value {
            Some(raw) => Value::from_raw_text(self.kind, raw),
            None => Ok(Value::Null),
        }
    }
}

/// A schema-agnostic row holder used only during migration.
///
/// # Purpose
/// Carries one extracted row with no dependency on any concrete application
/// type: an ordered sequence of `(field name, kind, raw text)` triples.
/// Instances are transient, scoped to a single migration pass, and destroyed
/// after replay.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenericRow {
    fields: Vec<GenericField>,
}

impl GenericRow {
    pub fn new() -> Self {
        GenericRow::default()
    }

    /// Extracts a physical row through a recovered schema, rendering every
    /// value as raw text. This is the row mapper's untyped counterpart.
    pub fn from_store_row(schema: &TableSchema, row: &StoreRow) -> GenericRow {
        let mut generic = GenericRow::new();
        for column in schema.columns() {
            let raw = row.get(column.name()).and_then(|v| v.to_raw_text());
            generic.add_field(GenericField::new(column.name(), column.kind(), raw));
        }
        generic
    }

    pub fn add_field(&mut self, field: GenericField) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[GenericField] {
        &self.fields
    }

    /// Looks up a field by name, case-insensitively.
    pub fn field(&self, name: &str) -> Option<&GenericField> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field_at(&self, position: usize) -> Option<&GenericField> {
        self.fields.get(position)
    }

    /// Shorthand for a field's raw text.
    pub fn raw_value(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(|f| f.raw_value())
    }
}

/// One recovered historical table: its schema rebuilt from creation text plus
/// every extracted row.
#[derive(Clone, Debug)]
pub struct RecoveredTable {
    schema: TableSchema,
    rows: Vec<GenericRow>,
}

impl RecoveredTable {
    pub(crate) fn new(schema: TableSchema, rows: Vec<GenericRow>) -> Self {
        RecoveredTable { schema, rows }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[GenericRow] {
        &self.rows
    }
}

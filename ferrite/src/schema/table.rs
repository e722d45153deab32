use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::schema::ColumnDef;
use itertools::Itertools;

/// The derived column layout for a registered type.
///
/// # Purpose
/// Holds the ordered column list of one table, with exactly one primary key
/// column. Built once at registration time and shared read-only afterwards.
///
/// # Invariant
/// Exactly one column has `is_primary_key() == true`. Violations are a
/// construction-time failure, never a runtime one; every downstream component
/// assumes a single identity column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: String,
}

impl TableSchema {
    /// Builds a schema from an ordered column list.
    ///
    /// Positions are assigned here, in the given order, and never change.
    ///
    /// # Errors
    /// - [ErrorKind::NoPrimaryKey] if no column is marked primary, or more than
    ///   one is
    /// - [ErrorKind::InvalidFieldName] if the table name or a column name is
    ///   empty, or a column name repeats
    pub fn new(name: &str, columns: Vec<ColumnDef>) -> FerriteResult<TableSchema> {
        if name.trim().is_empty() {
            return Err(FerriteError::new(
                "Table name must not be empty",
                ErrorKind::InvalidFieldName,
            ));
        }
        let mut primary_key = None;
        let mut positioned = Vec::with_capacity(columns.len());
        for (position, column) in columns.into_iter().enumerate() {
            if column.name().trim().is_empty() {
                return Err(FerriteError::new(
                    &format!("Empty column name in table {}", name),
                    ErrorKind::InvalidFieldName,
                ));
            }
            if positioned
                .iter()
                .any(|c: &ColumnDef| c.name().eq_ignore_ascii_case(column.name()))
            {
                return Err(FerriteError::new(
                    &format!("Duplicate column {} in table {}", column.name(), name),
                    ErrorKind::InvalidFieldName,
                ));
            }
            if column.is_primary_key() {
                if primary_key.is_some() {
                    return Err(FerriteError::new(
                        &format!("Table {} declares more than one primary key", name),
                        ErrorKind::NoPrimaryKey,
                    ));
                }
                primary_key = Some(column.name().to_string());
            }
            positioned.push(column.with_position(position));
        }
        let primary_key = primary_key.ok_or_else(|| {
            FerriteError::new(
                &format!("No primary key column found for table {}", name),
                ErrorKind::NoPrimaryKey,
            )
        })?;
        Ok(TableSchema {
            name: name.to_string(),
            columns: positioned,
            primary_key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Looks up a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    /// Renders the `CREATE TABLE IF NOT EXISTS` statement for this schema.
    ///
    /// This exact text is what the metadata store persists; it must round-trip
    /// through the migration tokenizer without loss.
    pub fn create_table_string(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            self.columns.iter().map(|c| c.create_clause()).join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnKind;

    fn person_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::primary("id", ColumnKind::Int32),
            ColumnDef::new("name", ColumnKind::Text),
            ColumnDef::new("age", ColumnKind::Int32),
        ]
    }

    #[test]
    fn test_new_assigns_positions_in_order() {
        let schema = TableSchema::new("person", person_columns()).unwrap();
        let positions: Vec<usize> = schema.columns().iter().map(|c| c.position()).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(schema.primary_key(), "id");
    }

    #[test]
    fn test_building_twice_is_deterministic() {
        let first = TableSchema::new("person", person_columns()).unwrap();
        let second = TableSchema::new("person", person_columns()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_primary_key_fails() {
        let columns = vec![ColumnDef::new("name", ColumnKind::Text)];
        let err = TableSchema::new("person", columns).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NoPrimaryKey);
    }

    #[test]
    fn test_two_primary_keys_fail() {
        let columns = vec![
            ColumnDef::primary("id", ColumnKind::Int32),
            ColumnDef::primary("other", ColumnKind::Int32),
        ];
        let err = TableSchema::new("person", columns).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NoPrimaryKey);
    }

    #[test]
    fn test_duplicate_column_fails() {
        let columns = vec![
            ColumnDef::primary("id", ColumnKind::Int32),
            ColumnDef::new("name", ColumnKind::Text),
            ColumnDef::new("NAME", ColumnKind::Text),
        ];
        let err = TableSchema::new("person", columns).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidFieldName);
    }

    #[test]
    fn test_empty_table_name_fails() {
        let err = TableSchema::new("  ", person_columns()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidFieldName);
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let schema = TableSchema::new("person", person_columns()).unwrap();
        assert!(schema.column("NAME").is_some());
        assert!(schema.column("missing").is_none());
    }

    #[test]
    fn test_create_table_string() {
        let schema = TableSchema::new("person", person_columns()).unwrap();
        assert_eq!(
            schema.create_table_string(),
            "CREATE TABLE IF NOT EXISTS person (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, age INTEGER)"
        );
    }
}

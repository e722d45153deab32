use crate::common::Value;
use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::mapper::RowValues;
use crate::store::{StoreEngine, StoreRow};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// In-memory implementation of the relational engine.
///
/// # Purpose
/// `MemoryEngine` provides the storage primitives the mapping layer needs
/// without any external database: tables of ordered rows, auto-increment
/// identities, equality-predicate queries, nested transactions with snapshot
/// rollback, and a persisted schema version cell.
///
/// # Characteristics
/// - **Shared**: clones share the same state, so one engine can back several
///   store handles across a close/open cycle
/// - **Durable across close**: `close` only marks the engine closed; data and
///   version survive until the engine is dropped
/// - **DDL subset**: `execute` accepts exactly the statements the mapping
///   layer emits (`CREATE TABLE IF NOT EXISTS`, `DROP TABLE [IF EXISTS]`)
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    open: bool,
    version: i32,
    tables: IndexMap<String, MemTable>,
    tx_depth: usize,
    snapshot: Option<(IndexMap<String, MemTable>, i32)>,
}

#[derive(Clone)]
struct MemTable {
    columns: Vec<String>,
    primary_key: Option<String>,
    rows: Vec<StoreRow>,
    next_id: i64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        MemoryEngine::default()
    }
}

impl MemoryState {
    fn require_open(&self) -> FerriteResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(FerriteError::new(
                "Memory engine is not open",
                ErrorKind::StoreNotOpen,
            ))
        }
    }

    fn table(&self, name: &str) -> FerriteResult<&MemTable> {
        self.tables.get(name).ok_or_else(|| {
            FerriteError::new(
                &format!("Table {} does not exist", name),
                ErrorKind::TableNotFound,
            )
        })
    }

    fn table_mut(&mut self, name: &str) -> FerriteResult<&mut MemTable> {
        self.tables.get_mut(name).ok_or_else(|| {
            FerriteError::new(
                &format!("Table {} does not exist", name),
                ErrorKind::TableNotFound,
            )
        })
    }
}

impl StoreEngine for MemoryEngine {
    fn open(&self) -> FerriteResult<()> {
        let mut state = self.inner.lock();
        if !state.open {
            log::debug!("opening memory engine");
            state.open = true;
        }
        Ok(())
    }

    fn close(&self) -> FerriteResult<()> {
        let mut state = self.inner.lock();
        if state.open {
            log::debug!("closing memory engine");
            state.open = false;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    fn execute(&self, sql: &str) -> FerriteResult<()> {
        let mut state = self.inner.lock();
        state.require_open()?;
        log::debug!("execute: {}", sql);
        let trimmed = sql.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("CREATE TABLE IF NOT EXISTS ") {
            let (name, table) = parse_create(trimmed)?;
            if !state.tables.contains_key(&name) {
                state.tables.insert(name, table);
            }
            Ok(())
        } else if upper.starts_with("DROP TABLE IF EXISTS ") {
            let name = trimmed["DROP TABLE IF EXISTS ".len()..].trim().to_string();
            state.tables.shift_remove(&name);
            Ok(())
        } else if upper.starts_with("DROP TABLE ") {
            let name = trimmed["DROP TABLE ".len()..].trim().to_string();
            if state.tables.shift_remove(&name).is_none() {
                return Err(FerriteError::new(
                    &format!("Cannot drop missing table {}", name),
                    ErrorKind::TableNotFound,
                ));
            }
            Ok(())
        } else {
            Err(FerriteError::new(
                &format!("Unsupported statement: {}", trimmed),
                ErrorKind::StoreError,
            ))
        }
    }

    fn query(
        &self,
        table: &str,
        columns: Option<&[String]>,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> FerriteResult<Vec<StoreRow>> {
        let state = self.inner.lock();
        state.require_open()?;
        let mem_table = state.table(table)?;
        let predicate = parse_where(where_clause, where_args)?;
        let mut result = Vec::new();
        for row in &mem_table.rows {
            if row_matches(row, &predicate) {
                result.push(project(row, columns));
            }
        }
        Ok(result)
    }

    fn insert(&self, table: &str, values: &RowValues) -> FerriteResult<i64> {
        let mut state = self.inner.lock();
        state.require_open()?;
        let mem_table = state.table_mut(table)?;
        for name in values.names() {
            if !mem_table.columns.iter().any(|c| c == name) {
                return Err(FerriteError::new(
                    &format!("Table {} has no column {}", table, name),
                    ErrorKind::StoreError,
                ));
            }
        }
        let id = mem_table.next_id;
        mem_table.next_id += 1;
        let mut row = StoreRow::new();
        for column in &mem_table.columns {
            let value = if Some(column.as_str()) == mem_table.primary_key.as_deref() {
                Value::I64(id)
            } else {
                values.get(column).cloned().unwrap_or(Value::Null)
            };
            row.insert(column.clone(), value);
        }
        mem_table.rows.push(row);
        Ok(id)
    }

    fn update(
        &self,
        table: &str,
        values: &RowValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> FerriteResult<usize> {
        let mut state = self.inner.lock();
        state.require_open()?;
        let predicate = parse_where(where_clause, where_args)?;
        let mem_table = state.table_mut(table)?;
        let mut affected = 0;
        for row in mem_table.rows.iter_mut() {
            if row_matches(row, &predicate) {
                for (name, value) in values.iter() {
                    if row.contains_key(name) {
                        row.insert(name.to_string(), value.clone());
                    }
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn delete(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> FerriteResult<usize> {
        let mut state = self.inner.lock();
        state.require_open()?;
        let predicate = parse_where(where_clause, where_args)?;
        let mem_table = state.table_mut(table)?;
        let before = mem_table.rows.len();
        mem_table.rows.retain(|row| !row_matches(row, &predicate));
        Ok(before - mem_table.rows.len())
    }

    fn table_names(&self) -> FerriteResult<Vec<String>> {
        let state = self.inner.lock();
        state.require_open()?;
        Ok(state.tables.keys().cloned().collect())
    }

    fn begin(&self) -> FerriteResult<()> {
        let mut state = self.inner.lock();
        state.require_open()?;
        if state.tx_depth == 0 {
            state.snapshot = Some((state.tables.clone(), state.version));
        }
        state.tx_depth += 1;
        Ok(())
    }

    fn commit(&self) -> FerriteResult<()> {
        let mut state = self.inner.lock();
        state.require_open()?;
        if state.tx_depth == 0 {
            return Err(FerriteError::new(
                "Commit without an active transaction",
                ErrorKind::TransactionError,
            ));
        }
        state.tx_depth -= 1;
        if state.tx_depth == 0 {
            state.snapshot = None;
        }
        Ok(())
    }

    fn rollback(&self) -> FerriteResult<()> {
        let mut state = self.inner.lock();
        state.require_open()?;
        if state.tx_depth == 0 {
            return Err(FerriteError::new(
                "Rollback without an active transaction",
                ErrorKind::TransactionError,
            ));
        }
        let (tables, version) = state.snapshot.take().ok_or_else(|| {
            FerriteError::new("Transaction snapshot missing", ErrorKind::TransactionError)
        })?;
        state.tables = tables;
        state.version = version;
        state.tx_depth = 0;
        Ok(())
    }

    fn version(&self) -> FerriteResult<i32> {
        let state = self.inner.lock();
        state.require_open()?;
        Ok(state.version)
    }

    fn set_version(&self, version: i32) -> FerriteResult<()> {
        let mut state = self.inner.lock();
        state.require_open()?;
        log::debug!("set schema version {} -> {}", state.version, version);
        state.version = version;
        Ok(())
    }
}

/// Parses `CREATE TABLE IF NOT EXISTS <name> (<col> <type> [...], ...)` into a
/// table skeleton. The engine only needs column names and the primary key; the
/// full grammar lives in the migration tokenizer.
fn parse_create(sql: &str) -> FerriteResult<(String, MemTable)> {
    let body = &sql["CREATE TABLE IF NOT EXISTS ".len()..];
    let open_paren = body.find('(').ok_or_else(|| malformed_statement(sql))?;
    let close_paren = body.rfind(')').ok_or_else(|| malformed_statement(sql))?;
    if close_paren <= open_paren {
        return Err(malformed_statement(sql));
    }
    let name = body[..open_paren].trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(malformed_statement(sql));
    }
    let mut columns = Vec::new();
    let mut primary_key = None;
    for clause in body[open_paren + 1..close_paren].split(',') {
        let mut tokens = clause.split_whitespace();
        let column = tokens.next().ok_or_else(|| malformed_statement(sql))?;
        columns.push(column.to_string());
        let rest = tokens.collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        if rest.contains("PRIMARY KEY") {
            primary_key = Some(column.to_string());
        }
    }
    Ok((
        name.to_string(),
        MemTable {
            columns,
            primary_key,
            rows: Vec::new(),
            next_id: 1,
        },
    ))
}

fn malformed_statement(sql: &str) -> FerriteError {
    FerriteError::new(
        &format!("Malformed statement: {}", sql),
        ErrorKind::StoreError,
    )
}

/// Parses `col = ? [AND col = ?]...` into (column, value) pairs.
fn parse_where(
    where_clause: Option<&str>,
    where_args: &[Value],
) -> FerriteResult<Vec<(String, Value)>> {
    let clause = match where_clause {
        Some(c) if !c.trim().is_empty() => c,
        _ => return Ok(Vec::new()),
    };
    let mut predicate = Vec::new();
    for (index, part) in clause.split(" AND ").enumerate() {
        let column = part
            .trim()
            .strip_suffix("= ?")
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.contains(char::is_whitespace))
            .ok_or_else(|| {
                FerriteError::new(
                    &format!("Unsupported where clause: {}", clause),
                    ErrorKind::StoreError,
                )
            })?;
        let value = where_args.get(index).cloned().ok_or_else(|| {
            FerriteError::new(
                &format!("Missing argument {} for where clause: {}", index, clause),
                ErrorKind::StoreError,
            )
        })?;
        predicate.push((column.to_string(), value));
    }
    if predicate.len() != where_args.len() {
        return Err(FerriteError::new(
            &format!("Argument count mismatch for where clause: {}", clause),
            ErrorKind::StoreError,
        ));
    }
    Ok(predicate)
}

fn row_matches(row: &StoreRow, predicate: &[(String, Value)]) -> bool {
    predicate.iter().all(|(column, expected)| {
        match (row.get(column), expected) {
            // integer predicates match either integer width
            (Some(actual), expected) => match (actual.as_i64(), expected.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => actual == expected,
            },
            (None, _) => false,
        }
    })
}

fn project(row: &StoreRow, columns: Option<&[String]>) -> StoreRow {
    match columns {
        None => row.clone(),
        Some(selected) => {
            let mut projected = StoreRow::new();
            for column in selected {
                if let Some(value) = row.get(column) {
                    projected.insert(column.clone(), value.clone());
                }
            }
            projected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.open().unwrap();
        engine
            .execute("CREATE TABLE IF NOT EXISTS person (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, age INTEGER)")
            .unwrap();
        engine
    }

    fn person_values(name: &str, age: i32) -> RowValues {
        let mut values = RowValues::new();
        values.put("name", Value::from(name));
        values.put("age", Value::from(age));
        values
    }

    #[test]
    fn test_operations_require_open() {
        let engine = MemoryEngine::new();
        let err = engine.table_names().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreNotOpen);
    }

    #[test]
    fn test_create_is_idempotent() {
        let engine = open_engine();
        engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        engine
            .execute("CREATE TABLE IF NOT EXISTS person (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, age INTEGER)")
            .unwrap();
        assert_eq!(engine.query("person", None, None, &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let engine = open_engine();
        let first = engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        let second = engine.insert("person", &person_values("Bob", 40)).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_insert_unknown_column_fails() {
        let engine = open_engine();
        let mut values = RowValues::new();
        values.put("nickname", Value::from("Al"));
        let err = engine.insert("person", &values).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreError);
    }

    #[test]
    fn test_query_with_where() {
        let engine = open_engine();
        engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        engine.insert("person", &person_values("Bob", 40)).unwrap();
        let rows = engine
            .query("person", None, Some("name = ?"), &[Value::from("Bob")])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("age"), Some(&Value::from(40)));
    }

    #[test]
    fn test_query_id_matches_across_widths() {
        let engine = open_engine();
        let id = engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        let rows = engine
            .query("person", None, Some("id = ?"), &[Value::I32(id as i32)])
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_query_missing_table() {
        let engine = open_engine();
        let err = engine.query("missing", None, None, &[]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TableNotFound);
    }

    #[test]
    fn test_query_projection() {
        let engine = open_engine();
        engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        let columns = vec!["name".to_string()];
        let rows = engine
            .query("person", Some(&columns), None, &[])
            .unwrap();
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("Alice")));
    }

    #[test]
    fn test_update() {
        let engine = open_engine();
        let id = engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        let mut changes = RowValues::new();
        changes.put("age", Value::from(31));
        let affected = engine
            .update("person", &changes, Some("id = ?"), &[Value::I64(id)])
            .unwrap();
        assert_eq!(affected, 1);
        let rows = engine.query("person", None, None, &[]).unwrap();
        assert_eq!(rows[0].get("age"), Some(&Value::from(31)));
    }

    #[test]
    fn test_delete() {
        let engine = open_engine();
        engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        engine.insert("person", &person_values("Bob", 40)).unwrap();
        let deleted = engine
            .delete("person", Some("name = ?"), &[Value::from("Alice")])
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(engine.query("person", None, None, &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_drop_table() {
        let engine = open_engine();
        engine.execute("DROP TABLE person").unwrap();
        assert!(engine.table_names().unwrap().is_empty());
        let err = engine.execute("DROP TABLE person").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TableNotFound);
        engine.execute("DROP TABLE IF EXISTS person").unwrap();
    }

    #[test]
    fn test_unsupported_statement() {
        let engine = open_engine();
        let err = engine.execute("SELECT * FROM person").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreError);
    }

    #[test]
    fn test_transaction_commit_keeps_changes() {
        let engine = open_engine();
        engine.begin().unwrap();
        engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        engine.commit().unwrap();
        assert_eq!(engine.query("person", None, None, &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_rollback_restores_state() {
        let engine = open_engine();
        engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        engine.begin().unwrap();
        engine.insert("person", &person_values("Bob", 40)).unwrap();
        engine.set_version(5).unwrap();
        engine.rollback().unwrap();
        assert_eq!(engine.query("person", None, None, &[]).unwrap().len(), 1);
        assert_eq!(engine.version().unwrap(), 0);
    }

    #[test]
    fn test_nested_transactions_commit_at_outermost() {
        let engine = open_engine();
        engine.begin().unwrap();
        engine.begin().unwrap();
        engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        engine.commit().unwrap();
        engine.commit().unwrap();
        assert_eq!(engine.query("person", None, None, &[]).unwrap().len(), 1);
        let err = engine.commit().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TransactionError);
    }

    #[test]
    fn test_data_survives_close_open_cycle() {
        let engine = open_engine();
        engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        engine.set_version(2).unwrap();
        engine.close().unwrap();
        assert!(!engine.is_open());
        engine.open().unwrap();
        assert_eq!(engine.version().unwrap(), 2);
        assert_eq!(engine.query("person", None, None, &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let engine = open_engine();
        let other = engine.clone();
        engine
            .insert("person", &person_values("Alice", 30))
            .unwrap();
        assert_eq!(other.query("person", None, None, &[]).unwrap().len(), 1);
    }
}

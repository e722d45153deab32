use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::schema::{ColumnDef, ColumnKind, TableSchema};

const CREATE_PREFIX: &str = "CREATE TABLE IF NOT EXISTS ";

/// Tokenizes a persisted creation text back into table schemas.
///
/// # Purpose
/// The recovery path of the migration engine. The input is the semicolon-joined
/// sequence of `CREATE TABLE IF NOT EXISTS <name> (<col> <type> [...], ...)`
/// statements recorded by the metadata store; the original typed descriptors
/// for that version may no longer exist in the running process, so this text
/// is the only durable record of the old shape.
///
/// # Grammar
/// - statements split on `;`, empty segments skipped
/// - every statement must carry the exact create prefix
/// - column clauses split on `,`, tokens on whitespace
/// - first token is the column name, second the type keyword, remaining
///   tokens must be `PRIMARY KEY [AUTOINCREMENT]`, `NOT NULL` or `UNIQUE`
///
/// Anything else fails with [ErrorKind::MalformedCreationText]; a historical
/// schema that cannot be tokenized is a migration error, never a silent skip.
pub fn parse_creation_text(text: &str) -> FerriteResult<Vec<TableSchema>> {
    let mut schemas = Vec::new();
    for statement in text.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        schemas.push(parse_statement(statement)?);
    }
    if schemas.is_empty() {
        return Err(malformed(text, "no table definitions found"));
    }
    Ok(schemas)
}

fn parse_statement(statement: &str) -> FerriteResult<TableSchema> {
    let prefix = statement.get(..CREATE_PREFIX.len());
    if !prefix.is_some_and(|p| p.eq_ignore_ascii_case(CREATE_PREFIX)) {
        return Err(malformed(statement, "missing CREATE TABLE prefix"));
    }
    let body = statement[CREATE_PREFIX.len()..].trim();
    let open_paren = body
        .find('(')
        .ok_or_else(|| malformed(statement, "missing opening parenthesis"))?;
    if !body.ends_with(')') {
        return Err(malformed(statement, "missing closing parenthesis"));
    }
    let name = body[..open_paren].trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(malformed(statement, "invalid table name"));
    }
    let column_list = &body[open_paren + 1..body.len() - 1];
    let mut columns = Vec::new();
    for clause in column_list.split(',') {
        columns.push(parse_column(statement, clause)?);
    }
    TableSchema::new(name, columns).map_err(|err| {
        FerriteError::new_with_cause(
            &format!("Recovered definition of table {} is invalid", name),
            ErrorKind::MalformedCreationText,
            err,
        )
    })
}

fn parse_column(statement: &str, clause: &str) -> FerriteResult<ColumnDef> {
    let mut tokens = clause.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| malformed(statement, "empty column clause"))?;
    let keyword = tokens
        .next()
        .ok_or_else(|| malformed(statement, &format!("column {} has no type", name)))?;
    let kind = ColumnKind::from_keyword(keyword)
        .ok_or_else(|| malformed(statement, &format!("unknown type keyword {}", keyword)))?;

    let mut primary_key = false;
    let mut not_null = false;
    let mut unique = false;
    let mut tokens = tokens.peekable();
    while let Some(token) = tokens.next() {
        match token.to_ascii_uppercase().as_str() {
            "PRIMARY" => {
                if tokens.next().map(|t| t.to_ascii_uppercase()) != Some("KEY".to_string()) {
                    return Err(malformed(statement, "PRIMARY not followed by KEY"));
                }
                if tokens
                    .peek()
                    .map(|t| t.eq_ignore_ascii_case("AUTOINCREMENT"))
                    .unwrap_or(false)
                {
                    tokens.next();
                }
                primary_key = true;
            }
            "NOT" => {
                if tokens.next().map(|t| t.to_ascii_uppercase()) != Some("NULL".to_string()) {
                    return Err(malformed(statement, "NOT not followed by NULL"));
                }
                not_null = true;
            }
            "UNIQUE" => unique = true,
            other => {
                return Err(malformed(
                    statement,
                    &format!("unknown constraint token {}", other),
                ));
            }
        }
    }

    let mut column = if primary_key {
        ColumnDef::primary(name, kind)
    } else {
        ColumnDef::new(name, kind)
    };
    if not_null {
        column = column.with_not_null();
    }
    if unique {
        column = column.with_unique();
    }
    Ok(column)
}

fn malformed(text: &str, reason: &str) -> FerriteError {
    FerriteError::new(
        &format!("Cannot tokenize creation text ({}): {}", reason, text),
        ErrorKind::MalformedCreationText,
    )
}

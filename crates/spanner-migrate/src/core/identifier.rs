//! Identifier validation, quoting and normalization.
//!
//! Source identifiers are quoted with the source dialect's rules when
//! building introspection queries. Target identifiers must match
//! `[A-Za-z][A-Za-z0-9_]*`, be at most 128 characters, and are compared
//! case-insensitively, so names are normalized and de-duplicated before DDL
//! is emitted.

use std::collections::BTreeSet;

use crate::error::{MigrateError, Result};

/// Maximum identifier length accepted by the target.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// GoogleSQL reserved keywords (uppercase).
const GOOGLE_SQL_RESERVED: &[&str] = &[
    "ALL", "AND", "ANY", "ARRAY", "AS", "ASC", "ASSERT_ROWS_MODIFIED", "AT", "BETWEEN", "BY",
    "CASE", "CAST", "COLLATE", "CONTAINS", "CREATE", "CROSS", "CUBE", "CURRENT", "DEFAULT",
    "DEFINE", "DESC", "DISTINCT", "ELSE", "END", "ENUM", "ESCAPE", "EXCEPT", "EXCLUDE", "EXISTS",
    "EXTRACT", "FALSE", "FETCH", "FOLLOWING", "FOR", "FROM", "FULL", "GROUP", "GROUPING",
    "GROUPS", "HASH", "HAVING", "IF", "IGNORE", "IN", "INNER", "INTERSECT", "INTERVAL", "INTO",
    "IS", "JOIN", "LATERAL", "LEFT", "LIKE", "LIMIT", "LOOKUP", "MERGE", "NATURAL", "NEW", "NO",
    "NOT", "NULL", "NULLS", "OF", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PRECEDING",
    "PROTO", "RANGE", "RECURSIVE", "RESPECT", "RIGHT", "ROLLUP", "ROWS", "SELECT", "SET", "SOME",
    "STRUCT", "TABLESAMPLE", "THEN", "TO", "TREAT", "TRUE", "UNBOUNDED", "UNION", "UNNEST",
    "USING", "WHEN", "WHERE", "WINDOW", "WITH", "WITHIN",
];

/// PostgreSQL reserved keywords (uppercase).
const POSTGRES_RESERVED: &[&str] = &[
    "ALL", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY", "AS", "ASC", "ASYMMETRIC", "BOTH", "CASE",
    "CAST", "CHECK", "COLLATE", "COLUMN", "CONSTRAINT", "CREATE", "CURRENT_CATALOG",
    "CURRENT_DATE", "CURRENT_ROLE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER",
    "DEFAULT", "DEFERRABLE", "DESC", "DISTINCT", "DO", "ELSE", "END", "EXCEPT", "FALSE", "FETCH",
    "FOR", "FOREIGN", "FROM", "GRANT", "GROUP", "HAVING", "IN", "INITIALLY", "INTERSECT", "INTO",
    "LATERAL", "LEADING", "LIMIT", "LOCALTIME", "LOCALTIMESTAMP", "NOT", "NULL", "OFFSET", "ON",
    "ONLY", "OR", "ORDER", "PLACING", "PRIMARY", "REFERENCES", "RETURNING", "SELECT",
    "SESSION_USER", "SOME", "SYMMETRIC", "TABLE", "THEN", "TO", "TRAILING", "TRUE", "UNION",
    "UNIQUE", "USER", "USING", "VARIADIC", "WHEN", "WHERE", "WINDOW", "WITH",
];

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier (source queries and PostgreSQL-flavor DDL).
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier using backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote a GoogleSQL identifier using backticks.
///
/// Normalized target names never contain backticks, so no escaping applies.
pub fn quote_google(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Qualify a MySQL table name with schema/database.
pub fn qualify_mysql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mysql(schema)?, quote_mysql(table)?))
}

/// Whether `name` is a reserved keyword in GoogleSQL.
pub fn is_google_sql_reserved(name: &str) -> bool {
    let upper = name.to_uppercase();
    GOOGLE_SQL_RESERVED.contains(&upper.as_str())
}

/// Whether `name` is a reserved keyword in PostgreSQL.
pub fn is_postgres_reserved(name: &str) -> bool {
    let upper = name.to_uppercase();
    POSTGRES_RESERVED.contains(&upper.as_str())
}

/// Rewrite `name` into a legal target identifier.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, a leading non-letter gets
/// an `A` prefix, and the result is truncated to the maximum length.
pub fn normalize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if !out.starts_with(|c: char| c.is_ascii_alphabetic()) {
        out.insert(0, 'A');
    }
    out.truncate(MAX_IDENTIFIER_LENGTH);
    out
}

/// Normalize `name` and make it unique (case-insensitively) against `used`.
///
/// Collisions get a `_N` suffix with the smallest free N. The chosen name is
/// recorded in `used` (lowercased).
pub fn unique_identifier(name: &str, used: &mut BTreeSet<String>) -> String {
    let base = normalize_identifier(name);
    if used.insert(base.to_lowercase()) {
        return base;
    }
    let mut n = 1;
    loop {
        let suffix = format!("_{}", n);
        let mut candidate = base.clone();
        candidate.truncate(MAX_IDENTIFIER_LENGTH - suffix.len());
        candidate.push_str(&suffix);
        if used.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Validate a check constraint definition before emitting it in DDL.
///
/// Check constraints come from source catalogs and should be plain boolean
/// expressions; statement separators and comment markers are rejected.
pub fn validate_check_constraint(definition: &str) -> Result<()> {
    if definition.contains(';') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Check constraint contains semicolon (possible injection): {:?}",
            definition
        )));
    }

    if definition.contains("--") || definition.contains("/*") || definition.contains("*/") {
        return Err(MigrateError::Config(format!(
            "SECURITY: Check constraint contains SQL comment markers (possible injection): {:?}",
            definition
        )));
    }

    Ok(())
}

//! Identifier sanitation and binding normalisation
//!
//! Column names that look like SQL expressions (`*`, `COUNT(*)`, `x AS y`,
//! numbers, a few keywords) pass through verbatim; everything else is split
//! on `.` and quoted per dialect. Strings containing statement separators or
//! comment openers are always rejected.

use std::sync::OnceLock;

use regex::Regex;

use crate::dialect::Dialect;
use crate::error::QueryError;
use crate::value::Value;

fn function_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\s*\(.*\)$").expect("valid regex"))
}

fn alias_expression() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s+AS\s+").expect("valid regex"))
}

fn numeric_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid regex"))
}

fn keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(CURRENT_TIMESTAMP|NULL|TRUE|FALSE)$").expect("valid regex"))
}

/// Rejects statement separators and comment openers
pub fn is_valid_column(name: &str) -> bool {
    !(name.contains(';') || name.contains("--") || name.contains("/*"))
}

/// True for text that must reach the SQL unquoted
pub fn is_sql_expression(name: &str) -> bool {
    name == "*"
        || function_call().is_match(name)
        || alias_expression().is_match(name)
        || numeric_literal().is_match(name)
        || keyword().is_match(name)
}

/// Quote a (possibly qualified) column name for `dialect`.
pub fn sanitize_column(dialect: Dialect, name: &str) -> Result<String, QueryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(QueryError::InvalidIdentifier("column name is empty".to_string()));
    }
    if !is_valid_column(name) {
        return Err(QueryError::InvalidIdentifier(format!(
            "column name '{}' contains forbidden characters",
            name
        )));
    }
    if is_sql_expression(name) {
        return Ok(name.to_string());
    }

    let mut quoted = Vec::new();
    for segment in name.split('.') {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(QueryError::InvalidIdentifier(format!(
                "column name '{}' has an empty segment",
                name
            )));
        }
        if segment == "*" {
            quoted.push(segment.to_string());
        } else {
            quoted.push(dialect.quote_identifier(segment));
        }
    }
    Ok(quoted.join("."))
}

fn strip_identifier(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Quote a table reference, keeping an optional alias (`users u`, `users AS u`).
pub fn sanitize_table(dialect: Dialect, name: &str) -> Result<String, QueryError> {
    let name = name.trim();
    if !is_valid_column(name) {
        return Err(QueryError::InvalidIdentifier(format!(
            "table name '{}' contains forbidden characters",
            name
        )));
    }

    let parts: Vec<&str> = name.split_whitespace().collect();
    let (table, alias) = match parts.as_slice() {
        [table] => (*table, None),
        [table, alias] => (*table, Some(*alias)),
        [table, kw, alias] if kw.eq_ignore_ascii_case("as") => (*table, Some(*alias)),
        _ => {
            return Err(QueryError::InvalidIdentifier(format!(
                "table name '{}' is malformed",
                name
            )))
        }
    };

    let mut quoted = Vec::new();
    for segment in table.split('.') {
        let clean = strip_identifier(segment);
        if clean.is_empty() {
            return Err(QueryError::InvalidIdentifier(format!(
                "table name '{}' has an empty segment",
                name
            )));
        }
        quoted.push(dialect.quote_identifier(&clean));
    }

    let mut sql = quoted.join(".");
    if let Some(alias) = alias.map(strip_identifier).filter(|a| !a.is_empty()) {
        sql.push(' ');
        sql.push_str(&alias);
    }
    Ok(sql)
}

/// Booleans are bound as 0/1 on every backend.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Bool(b) => Value::Int(b as i64),
        other => other,
    }
}

/// One-letter bind type (`i`, `d`, `s`, `b`)
pub fn type_code(value: &Value) -> char {
    match value {
        Value::Int(_) | Value::Bool(_) => 'i',
        Value::Float(_) => 'd',
        Value::Bytes(_) => 'b',
        Value::String(_) | Value::Null => 's',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_injection_shapes() {
        assert!(sanitize_column(Dialect::MySql, "1; DROP TABLE users").is_err());
        assert!(sanitize_column(Dialect::MySql, "name -- comment").is_err());
        assert!(sanitize_column(Dialect::MySql, "COUNT(*) /* x */").is_err());
        assert!(sanitize_column(Dialect::MySql, "users..name").is_err());
        assert!(sanitize_column(Dialect::MySql, "  ").is_err());
    }

    #[test]
    fn test_expressions_pass_through() {
        for expr in ["*", "COUNT(*)", "SUM(amount) AS total", "name as n", "42", "CURRENT_TIMESTAMP", "null"] {
            assert_eq!(sanitize_column(Dialect::Postgres, expr).unwrap(), expr);
        }
    }

    #[test]
    fn test_quotes_per_dialect() {
        assert_eq!(sanitize_column(Dialect::MySql, "name").unwrap(), "`name`");
        assert_eq!(sanitize_column(Dialect::Sqlite, "users.name").unwrap(), "`users`.`name`");
        assert_eq!(sanitize_column(Dialect::SqlServer, "users.name").unwrap(), "[users].[name]");
        assert_eq!(sanitize_column(Dialect::Postgres, "users.name").unwrap(), "\"users\".\"name\"");
        assert_eq!(sanitize_column(Dialect::Oracle, "name").unwrap(), "\"name\"");
        assert_eq!(sanitize_column(Dialect::MySql, "users.*").unwrap(), "`users`.*");
    }

    #[test]
    fn test_table_alias_and_schema() {
        assert_eq!(sanitize_table(Dialect::MySql, "users u").unwrap(), "`users` u");
        assert_eq!(sanitize_table(Dialect::Postgres, "public.users AS u").unwrap(), "\"public\".\"users\" u");
        assert_eq!(sanitize_table(Dialect::SqlServer, "dbo.us-ers").unwrap(), "[dbo].[users]");
        assert!(sanitize_table(Dialect::MySql, "$$$").is_err());
        assert!(sanitize_table(Dialect::MySql, "a b c d").is_err());
    }

    #[test]
    fn test_value_normalisation() {
        assert_eq!(sanitize_value(Value::Bool(true)), Value::Int(1));
        assert_eq!(sanitize_value(Value::Bool(false)), Value::Int(0));
        assert_eq!(type_code(&Value::Float(1.0)), 'd');
        assert_eq!(type_code(&Value::Null), 's');
        assert_eq!(type_code(&Value::Bytes(vec![1])), 'b');
    }
}

//! Raw SQL with positional (`?`) or named (`:name`) placeholders
//!
//! Named placeholders are rewritten to `?` and their bindings reordered to
//! match. Placeholders inside quoted literals and PostgreSQL `::type` casts
//! are not placeholders.

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::QueryError;
use crate::value::Value;

/// Placeholders found in a SQL string
#[derive(Debug, Default, PartialEq)]
pub struct PlaceholderScan {
    /// SQL with every named placeholder replaced by `?`
    pub rewritten: String,
    pub positional: usize,
    /// Named placeholders in order of appearance (repeats included)
    pub names: Vec<String>,
}

/// Scan `sql` for placeholders outside of quoted literals.
pub fn scan_placeholders(sql: &str) -> PlaceholderScan {
    let mut scan = PlaceholderScan::default();
    let chars: Vec<char> = sql.chars().collect();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            scan.rewritten.push(c);
            if c == q {
                // A doubled quote is an escaped quote character
                if chars.get(i + 1) == Some(&q) {
                    scan.rewritten.push(q);
                    i += 1;
                } else {
                    quote = None;
                }
            }
            i += 1;
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                scan.rewritten.push(c);
            }
            '?' => {
                scan.positional += 1;
                scan.rewritten.push(c);
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                scan.rewritten.push_str("::");
                i += 1;
            }
            ':' if chars.get(i + 1).map_or(false, |n| n.is_ascii_alphabetic() || *n == '_') => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                scan.names.push(chars[start..end].iter().collect());
                scan.rewritten.push('?');
                i = end;
                continue;
            }
            _ => scan.rewritten.push(c),
        }
        i += 1;
    }

    scan
}

/// Resolve `sql` + `bindings` into a positional fragment.
pub fn resolve_raw(sql: &str, bindings: RawBindings) -> Result<Fragment, QueryError> {
    let scan = scan_placeholders(sql);

    if !scan.names.is_empty() && scan.positional > 0 {
        return Err(QueryError::InvalidSql(
            "raw SQL mixes named and positional placeholders".to_string(),
        ));
    }

    if !scan.names.is_empty() {
        let map = match bindings {
            RawBindings::Named(map) => map,
            RawBindings::Positional(values) if values.is_empty() => Default::default(),
            RawBindings::Positional(_) => {
                return Err(QueryError::InvalidParameter(
                    "named placeholders need named bindings".to_string(),
                ))
            }
        };
        let mut ordered = Vec::with_capacity(scan.names.len());
        for name in &scan.names {
            let value = map
                .get(name)
                .or_else(|| map.get(&format!(":{}", name)))
                .ok_or_else(|| QueryError::InvalidParameter(format!("missing binding for :{}", name)))?;
            ordered.push(QueryBuilder::value(value.clone()));
        }
        return Ok(Fragment::with_bindings(scan.rewritten, ordered));
    }

    let values = match bindings {
        RawBindings::Positional(values) => values,
        RawBindings::Named(map) if map.is_empty() => Vec::new(),
        RawBindings::Named(_) => {
            return Err(QueryError::InvalidParameter(
                "named bindings given but the SQL has no named placeholders".to_string(),
            ))
        }
    };
    if values.len() != scan.positional {
        return Err(QueryError::InvalidParameter(format!(
            "raw SQL has {} placeholders but {} bindings were given",
            scan.positional,
            values.len()
        )));
    }
    Ok(Fragment::with_bindings(
        scan.rewritten,
        values.into_iter().map(QueryBuilder::value).collect(),
    ))
}

/// Positional-only fragment used by `where_raw`, `select_raw` and friends
pub(crate) fn positional_fragment(sql: &str, bindings: Vec<Value>) -> Result<Fragment, QueryError> {
    let scan = scan_placeholders(sql);
    if !scan.names.is_empty() {
        return Err(QueryError::InvalidSql(format!(
            "named placeholders are only supported by raw(): {}",
            sql
        )));
    }
    resolve_raw(sql, RawBindings::Positional(bindings))
}

impl QueryBuilder {
    /// Replace the statement with raw SQL
    pub fn raw(self, sql: &str, bindings: impl Into<RawBindings>) -> Self {
        let bindings = bindings.into();
        self.apply(|qb| {
            if sql.trim().is_empty() {
                return Err(QueryError::InvalidSql("raw SQL is empty".to_string()));
            }
            qb.parts.kind = QueryType::Raw;
            qb.parts.body = Some(resolve_raw(sql, bindings)?);
            Ok(())
        })
    }
}

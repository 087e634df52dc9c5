//! Query Builder UPSERT operations (INSERT ... ON CONFLICT / ON DUPLICATE KEY)

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::QueryError;
use crate::value::Value;

impl QueryBuilder {
    /// Insert `values`, updating `update_columns` when a row with the same
    /// `conflict_columns` already exists. An empty `update_columns` keeps the
    /// existing row untouched.
    pub fn upsert<K, V, I>(self, table: &str, values: I, conflict_columns: &[&str], update_columns: &[&str]) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.insert(table, values).apply(|qb| {
            if !qb.dialect.supports_upsert() {
                return Err(QueryError::UnsupportedOperation(format!(
                    "upsert is not supported on {}",
                    qb.dialect
                )));
            }
            if conflict_columns.is_empty() {
                return Err(QueryError::MissingFields("upsert needs conflict columns".to_string()));
            }
            let target = conflict_columns
                .iter()
                .map(|c| qb.column(c))
                .collect::<Result<Vec<_>, _>>()?;
            let update = update_columns
                .iter()
                .map(|c| qb.column(c))
                .collect::<Result<Vec<_>, _>>()?;
            qb.parts.conflict = Some(ConflictClause { target, update });
            Ok(())
        })
    }
}

/// Render the conflict clause appended after `VALUES (...)`
pub(crate) fn render_conflict(dialect: crate::dialect::Dialect, conflict: &ConflictClause) -> String {
    use crate::dialect::Dialect;

    match dialect {
        Dialect::MySql => {
            let assignments = if conflict.update.is_empty() {
                // No-op assignment keeps the existing row
                let first = &conflict.target[0];
                vec![format!("{} = {}", first, first)]
            } else {
                conflict
                    .update
                    .iter()
                    .map(|c| format!("{} = VALUES({})", c, c))
                    .collect()
            };
            format!(" ON DUPLICATE KEY UPDATE {}", assignments.join(", "))
        }
        _ => {
            let target = conflict.target.join(", ");
            if conflict.update.is_empty() {
                format!(" ON CONFLICT ({}) DO NOTHING", target)
            } else {
                let assignments: Vec<String> = conflict
                    .update
                    .iter()
                    .map(|c| format!("{} = EXCLUDED.{}", c, c))
                    .collect();
                format!(" ON CONFLICT ({}) DO UPDATE SET {}", target, assignments.join(", "))
            }
        }
    }
}

//! Query Builder SQL generation
//!
//! Clauses are concatenated in final SQL order and every fragment carries its
//! own bindings, so the N-th `?` always consumes the N-th binding no matter
//! in which order the builder methods were called.

use super::builder::QueryBuilder;
use super::pagination::{render_pagination, top_binding, uses_top};
use super::types::*;
use super::upsert::render_conflict;
use crate::dialect::Dialect;
use crate::error::QueryError;
use crate::sanitizer::{sanitize_column, type_code};
use crate::value::Value;

/// Join conditions with their connectives, dropping the first connective
pub(crate) fn render_conditions(conditions: &[Condition]) -> Option<Fragment> {
    let mut iter = conditions.iter();
    let first = iter.next()?;
    let mut sql = first.fragment.sql.clone();
    let mut bindings = first.fragment.bindings.clone();
    for condition in iter {
        sql.push(' ');
        sql.push_str(&condition.connective.to_string());
        sql.push(' ');
        sql.push_str(&condition.fragment.sql);
        bindings.extend(condition.fragment.bindings.iter().cloned());
    }
    Some(Fragment::with_bindings(sql, bindings))
}

/// SQL accumulator
#[derive(Default)]
struct Writer {
    sql: String,
    bindings: Vec<Value>,
}

impl Writer {
    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn fragment(&mut self, fragment: &Fragment) {
        self.sql.push_str(&fragment.sql);
        self.bindings.extend(fragment.bindings.iter().cloned());
    }

    fn fragments(&mut self, fragments: &[Fragment], separator: &str) {
        for (i, fragment) in fragments.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.fragment(fragment);
        }
    }

    fn conditions(&mut self, keyword: &str, conditions: &[Condition]) {
        if let Some(fragment) = render_conditions(conditions) {
            self.push(keyword);
            self.fragment(&fragment);
        }
    }
}

impl QueryBuilder {
    /// Compile the statement. Returns the first error recorded while the
    /// builder was assembled, before anything touches a connection.
    pub fn get_query(mut self) -> Result<CompiledQuery, QueryError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }

        let mut w = Writer::default();
        let parts = &self.parts;

        match parts.kind {
            QueryType::Raw => {
                let body = parts
                    .body
                    .as_ref()
                    .ok_or_else(|| QueryError::InvalidSql("raw statement has no SQL".to_string()))?;
                w.fragment(body);
            }
            kind if kind.is_ddl() => {
                // An existing table turns create_table_if_not_exist into a no-op
                if let Some(body) = &parts.body {
                    w.fragment(body);
                }
            }
            _ => {
                self.render_with(&mut w);
                match parts.kind {
                    QueryType::Select => self.render_select(&mut w),
                    QueryType::Insert => self.render_insert(&mut w)?,
                    QueryType::Update => self.render_update(&mut w)?,
                    QueryType::Delete => self.render_delete(&mut w)?,
                    QueryType::Truncate => {
                        w.push(&self.dialect.truncate_sql(self.target_table()?));
                    }
                    _ => {}
                }
                for (operator, fragment) in &parts.unions {
                    w.push(" ");
                    w.push(&operator.to_string());
                    w.push(" ");
                    w.fragment(fragment);
                }
            }
        }

        let types = w.bindings.iter().map(type_code).collect();
        Ok(CompiledQuery {
            query: w.sql,
            bindings: w.bindings,
            types,
            query_parts: self.parts,
        })
    }

    fn target_table(&self) -> Result<&str, QueryError> {
        self.parts.table.as_deref().ok_or_else(|| {
            QueryError::MissingFields(format!("{} statement has no table", self.parts.kind))
        })
    }

    fn render_with(&self, w: &mut Writer) {
        if self.parts.with.is_empty() {
            return;
        }
        w.push("WITH ");
        if self.parts.with_recursive && matches!(self.dialect, Dialect::MySql | Dialect::Postgres) {
            w.push("RECURSIVE ");
        }
        w.fragments(&self.parts.with, ", ");
        w.push(" ");
    }

    fn render_select(&self, w: &mut Writer) {
        let parts = &self.parts;
        w.push("SELECT ");
        if parts.distinct {
            w.push("DISTINCT ");
        }
        if uses_top(self.dialect, parts) {
            w.push("TOP ? ");
            w.bindings.extend(top_binding(parts));
        }
        if parts.select.is_empty() {
            w.push("*");
        } else {
            w.fragments(&parts.select, ", ");
        }
        if let Some(from) = &parts.from {
            w.push(" FROM ");
            w.fragment(from);
        }
        for join in &parts.joins {
            w.push(" ");
            w.fragment(join);
        }
        w.conditions(" WHERE ", &parts.wheres);
        if !parts.group_by.is_empty() {
            w.push(" GROUP BY ");
            w.push(&parts.group_by.join(", "));
        }
        w.conditions(" HAVING ", &parts.havings);
        if !parts.order_by.is_empty() {
            w.push(" ORDER BY ");
            w.fragments(&parts.order_by, ", ");
        }
        if !uses_top(self.dialect, parts) {
            render_pagination(self.dialect, parts, &mut w.sql, &mut w.bindings);
        }
    }

    fn render_insert(&self, w: &mut Writer) -> Result<(), QueryError> {
        let parts = &self.parts;
        let table = self.target_table()?;
        if parts.columns.is_empty() || parts.rows.is_empty() {
            return Err(QueryError::MissingFields("INSERT has no values".to_string()));
        }
        w.push(&format!("INSERT INTO {} ({})", table, parts.columns.join(", ")));
        w.push(&self.output_clause("INSERTED")?);
        w.push(" VALUES ");
        let placeholders = vec!["?"; parts.columns.len()].join(", ");
        for (i, row) in parts.rows.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push(&format!("({})", placeholders));
            w.bindings.extend(row.iter().cloned());
        }
        if let Some(conflict) = &parts.conflict {
            w.push(&render_conflict(self.dialect, conflict));
        }
        w.push(&self.returning_clause()?);
        Ok(())
    }

    fn render_update(&self, w: &mut Writer) -> Result<(), QueryError> {
        let parts = &self.parts;
        let table = self.target_table()?;
        let row = match parts.rows.first() {
            Some(row) if !parts.columns.is_empty() => row,
            _ => return Err(QueryError::MissingFields("UPDATE has no SET values".to_string())),
        };
        let assignments: Vec<String> = parts.columns.iter().map(|c| format!("{} = ?", c)).collect();
        w.push(&format!("UPDATE {} SET {}", table, assignments.join(", ")));
        w.bindings.extend(row.iter().cloned());
        w.push(&self.output_clause("INSERTED")?);
        w.conditions(" WHERE ", &parts.wheres);
        w.push(&self.returning_clause()?);
        Ok(())
    }

    fn render_delete(&self, w: &mut Writer) -> Result<(), QueryError> {
        let table = self.target_table()?;
        w.push(&format!("DELETE FROM {}", table));
        w.push(&self.output_clause("DELETED")?);
        w.conditions(" WHERE ", &self.parts.wheres);
        w.push(&self.returning_clause()?);
        Ok(())
    }

    fn quoted_returning(&self) -> Result<Vec<String>, QueryError> {
        self.parts
            .returning
            .iter()
            .map(|c| sanitize_column(self.dialect, c))
            .collect()
    }

    /// SQL Server `OUTPUT INSERTED.x` / `OUTPUT DELETED.x`
    fn output_clause(&self, pseudo_table: &str) -> Result<String, QueryError> {
        if self.dialect != Dialect::SqlServer || self.parts.returning.is_empty() {
            return Ok(String::new());
        }
        let columns: Vec<String> = self
            .quoted_returning()?
            .into_iter()
            .map(|c| format!("{}.{}", pseudo_table, c))
            .collect();
        Ok(format!(" OUTPUT {}", columns.join(", ")))
    }

    fn returning_clause(&self) -> Result<String, QueryError> {
        if self.dialect == Dialect::SqlServer || self.parts.returning.is_empty() {
            return Ok(String::new());
        }
        Ok(format!(" RETURNING {}", self.quoted_returning()?.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use crate::dialect::Dialect;
    use crate::error::QueryError;
    use crate::query::QueryBuilder;
    use crate::value::Value;

    #[test]
    fn test_binding_order_independent_of_call_order() {
        // ORDER BY, HAVING and WHERE registered in reverse SQL order
        let q = QueryBuilder::new(Dialect::MySql)
            .order_by_raw("FIELD(`status`, ?, ?)", vec![Value::from("a"), Value::from("b")])
            .having("total", ">", 10)
            .where_eq("user_id", 7)
            .select_raw("COUNT(*) + ? AS total", vec![Value::Int(1)])
            .from("orders")
            .group_by(&["user_id"])
            .limit(3)
            .get_query()
            .unwrap();
        assert_eq!(
            q.query,
            "SELECT COUNT(*) + ? AS total FROM `orders` WHERE `user_id` = ? GROUP BY `user_id` HAVING `total` > ? ORDER BY FIELD(`status`, ?, ?) LIMIT ?"
        );
        assert_eq!(
            q.bindings,
            vec![
                Value::Int(1),
                Value::Int(7),
                Value::Int(10),
                Value::from("a"),
                Value::from("b"),
                Value::Int(3)
            ]
        );
        assert_eq!(q.query.matches('?').count(), q.bindings.len());
        assert_eq!(q.types, "iiissi");
    }

    #[test]
    fn test_join_then_where() {
        let q = QueryBuilder::new(Dialect::Postgres)
            .select(&["u.id", "p.title"])
            .from("users u")
            .left_join("posts p", "p.user_id", "=", "u.id")
            .where_not_null("p.published_at")
            .get_query()
            .unwrap();
        assert_eq!(
            q.query,
            "SELECT \"u\".\"id\", \"p\".\"title\" FROM \"users\" u LEFT JOIN \"posts\" p ON \"p\".\"user_id\" = \"u\".\"id\" WHERE \"p\".\"published_at\" IS NOT NULL"
        );
    }

    #[test]
    fn test_missing_table_and_values() {
        let err = QueryBuilder::new(Dialect::MySql).insert_into("users").get_query().unwrap_err();
        assert!(matches!(err, QueryError::MissingFields(_)));
        let err = QueryBuilder::new(Dialect::MySql).update("users").get_query().unwrap_err();
        assert!(matches!(err, QueryError::MissingFields(_)));
    }

    #[test]
    fn test_pagination_only_on_select() {
        let q = QueryBuilder::new(Dialect::MySql)
            .delete_from("logs")
            .where_lt("id", 100)
            .limit(10)
            .get_query()
            .unwrap();
        assert_eq!(q.query, "DELETE FROM `logs` WHERE `id` < ?");
        assert_eq!(q.bindings, vec![Value::Int(100)]);
    }
}

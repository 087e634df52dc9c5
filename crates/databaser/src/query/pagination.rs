//! Query Builder pagination operations
//!
//! LIMIT/OFFSET rendering is the most dialect-divergent part of a SELECT:
//!
//! | dialect | limit only | offset only | both |
//! |---------|------------|-------------|------|
//! | mysql   | `LIMIT ?` | `LIMIT 18446744073709551615 OFFSET ?` | `LIMIT ? OFFSET ?` |
//! | pgsql   | `LIMIT ?` | `OFFSET ?` | `LIMIT ? OFFSET ?` |
//! | sqlite  | `LIMIT ?` | `LIMIT -1 OFFSET ?` | `LIMIT ? OFFSET ?` |
//! | oci     | `FETCH FIRST ? ROWS ONLY` | `OFFSET ? ROWS` | `OFFSET ? ROWS FETCH FIRST ? ROWS ONLY` |
//! | sqlsrv  | `SELECT TOP ?` | `OFFSET ? ROWS FETCH NEXT 18446744073709551615 ROWS ONLY` | `OFFSET ? ROWS FETCH NEXT ? ROWS ONLY` |

use super::builder::QueryBuilder;
use super::types::*;
use crate::dialect::Dialect;
use crate::error::QueryError;
use crate::value::Value;

/// Row cap used where a dialect cannot express "offset without limit"
pub const UNBOUNDED_LIMIT: &str = "18446744073709551615";

impl QueryBuilder {
    /// Add LIMIT clause
    pub fn limit(self, count: u64) -> Self {
        self.apply(|qb| {
            qb.parts.limit = Some(count);
            Ok(())
        })
    }

    /// Add OFFSET clause
    pub fn offset(self, count: u64) -> Self {
        self.apply(|qb| {
            qb.parts.offset = Some(count);
            Ok(())
        })
    }

    /// The same statement with ordering, LIMIT and OFFSET removed, as the
    /// inner query of a row count
    pub fn without_pagination(self) -> Self {
        self.apply(|qb| {
            qb.parts.order_by.clear();
            qb.parts.limit = None;
            qb.parts.offset = None;
            Ok(())
        })
    }

    /// Add pagination (LIMIT + OFFSET); pages start at 1
    pub fn paginate(self, per_page: u64, page: u64) -> Self {
        self.apply(|qb| {
            if per_page == 0 || page == 0 {
                return Err(QueryError::InvalidParameter(
                    "per_page and page must be at least 1".to_string(),
                ));
            }
            let offset = (page - 1).checked_mul(per_page).ok_or_else(|| {
                QueryError::InvalidParameter(format!("page {} of {} rows is out of range", page, per_page))
            })?;
            qb.parts.limit = Some(per_page);
            qb.parts.offset = Some(offset);
            Ok(())
        })
    }
}

/// SQL Server renders a lone LIMIT as `TOP ?` inside the select list
pub(crate) fn uses_top(dialect: Dialect, parts: &QueryParts) -> bool {
    dialect == Dialect::SqlServer && parts.limit.is_some() && parts.offset.is_none()
}

fn bind_count(n: u64) -> Value {
    i64::try_from(n).map(Value::Int).unwrap_or(Value::Int(i64::MAX))
}

pub(crate) fn top_binding(parts: &QueryParts) -> Option<Value> {
    parts.limit.map(bind_count)
}

/// Append the trailing pagination clause of a SELECT
pub(crate) fn render_pagination(dialect: Dialect, parts: &QueryParts, sql: &mut String, bindings: &mut Vec<Value>) {
    match dialect {
        Dialect::SqlServer => {
            let Some(offset) = parts.offset else {
                return;
            };
            if parts.order_by.is_empty() {
                sql.push_str(" ORDER BY (SELECT NULL)");
            }
            sql.push_str(" OFFSET ? ROWS");
            bindings.push(bind_count(offset));
            match parts.limit {
                Some(limit) => {
                    sql.push_str(" FETCH NEXT ? ROWS ONLY");
                    bindings.push(bind_count(limit));
                }
                None => {
                    sql.push_str(" FETCH NEXT ");
                    sql.push_str(UNBOUNDED_LIMIT);
                    sql.push_str(" ROWS ONLY");
                }
            }
        }
        Dialect::Oracle => {
            if let Some(offset) = parts.offset {
                sql.push_str(" OFFSET ? ROWS");
                bindings.push(bind_count(offset));
            }
            if let Some(limit) = parts.limit {
                sql.push_str(" FETCH FIRST ? ROWS ONLY");
                bindings.push(bind_count(limit));
            }
        }
        Dialect::MySql | Dialect::Postgres | Dialect::Sqlite => {
            match (parts.limit, parts.offset) {
                (Some(limit), _) => {
                    sql.push_str(" LIMIT ?");
                    bindings.push(bind_count(limit));
                }
                (None, Some(_)) if dialect == Dialect::MySql => {
                    sql.push_str(" LIMIT ");
                    sql.push_str(UNBOUNDED_LIMIT);
                }
                (None, Some(_)) if dialect == Dialect::Sqlite => sql.push_str(" LIMIT -1"),
                _ => {}
            }
            if let Some(offset) = parts.offset {
                sql.push_str(" OFFSET ?");
                bindings.push(bind_count(offset));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::dialect::Dialect;
    use crate::query::QueryBuilder;
    use crate::value::Value;

    fn page(dialect: Dialect, limit: Option<u64>, offset: Option<u64>) -> (String, Vec<Value>) {
        let mut qb = QueryBuilder::new(dialect).select(&["id"]).from("users");
        if let Some(limit) = limit {
            qb = qb.limit(limit);
        }
        if let Some(offset) = offset {
            qb = qb.offset(offset);
        }
        let q = qb.get_query().unwrap();
        (q.query, q.bindings)
    }

    #[test]
    fn test_limit_and_offset_per_dialect() {
        let expected = [
            (Dialect::MySql, "SELECT `id` FROM `users` LIMIT ? OFFSET ?", vec![10, 20]),
            (Dialect::Postgres, "SELECT \"id\" FROM \"users\" LIMIT ? OFFSET ?", vec![10, 20]),
            (Dialect::Sqlite, "SELECT `id` FROM `users` LIMIT ? OFFSET ?", vec![10, 20]),
            (Dialect::Oracle, "SELECT \"id\" FROM \"users\" OFFSET ? ROWS FETCH FIRST ? ROWS ONLY", vec![20, 10]),
            (
                Dialect::SqlServer,
                "SELECT [id] FROM [users] ORDER BY (SELECT NULL) OFFSET ? ROWS FETCH NEXT ? ROWS ONLY",
                vec![20, 10],
            ),
        ];
        for (dialect, sql, bindings) in expected {
            let (query, actual) = page(dialect, Some(10), Some(20));
            assert_eq!(query, sql, "{}", dialect);
            let bindings: Vec<Value> = bindings.into_iter().map(Value::Int).collect();
            assert_eq!(actual, bindings, "{}", dialect);
        }
    }

    #[test]
    fn test_sqlsrv_top_for_limit_only() {
        let q = QueryBuilder::new(Dialect::SqlServer)
            .select(&["id"])
            .select_sub(|q| q.select_count("*", None).from("posts").where_eq("x", 1), "n")
            .from("users")
            .limit(5)
            .get_query()
            .unwrap();
        assert_eq!(
            q.query,
            "SELECT TOP ? [id], (SELECT COUNT(*) FROM [posts] WHERE [x] = ?) AS [n] FROM [users]"
        );
        assert_eq!(q.bindings, vec![Value::Int(5), Value::Int(1)]);
    }

    #[test]
    fn test_offset_without_limit() {
        assert_eq!(page(Dialect::MySql, None, Some(5)).0, "SELECT `id` FROM `users` LIMIT 18446744073709551615 OFFSET ?");
        assert_eq!(page(Dialect::Sqlite, None, Some(5)).0, "SELECT `id` FROM `users` LIMIT -1 OFFSET ?");
        assert_eq!(page(Dialect::Postgres, None, Some(5)).0, "SELECT \"id\" FROM \"users\" OFFSET ?");
        assert_eq!(
            page(Dialect::SqlServer, None, Some(5)).0,
            "SELECT [id] FROM [users] ORDER BY (SELECT NULL) OFFSET ? ROWS FETCH NEXT 18446744073709551615 ROWS ONLY"
        );
        assert_eq!(page(Dialect::Oracle, Some(3), None).0, "SELECT \"id\" FROM \"users\" FETCH FIRST ? ROWS ONLY");
    }

    #[test]
    fn test_without_pagination() {
        let q = QueryBuilder::new(Dialect::SqlServer)
            .from("users")
            .where_eq("active", 1)
            .order_by("id")
            .paginate(10, 3)
            .without_pagination()
            .get_query()
            .unwrap();
        assert_eq!(q.query, "SELECT * FROM [users] WHERE [active] = ?");
        assert_eq!(q.bindings, vec![Value::Int(1)]);
    }

    #[test]
    fn test_paginate_rejects_unreachable_pages() {
        let err = QueryBuilder::new(Dialect::MySql)
            .from("users")
            .paginate(u64::MAX / 2, 4)
            .get_query()
            .unwrap_err();
        assert!(matches!(err, crate::error::QueryError::InvalidParameter(_)));

        let last = QueryBuilder::new(Dialect::MySql).from("users").paginate(1, u64::MAX).get_query().unwrap();
        assert_eq!(last.bindings, vec![Value::Int(1), Value::Int(i64::MAX)]);
    }

    #[test]
    fn test_sqlsrv_keeps_existing_order() {
        let q = QueryBuilder::new(Dialect::SqlServer)
            .from("users")
            .order_by("id")
            .paginate(10, 3)
            .get_query()
            .unwrap();
        assert_eq!(q.query, "SELECT * FROM [users] ORDER BY [id] ASC OFFSET ? ROWS FETCH NEXT ? ROWS ONLY");
        assert_eq!(q.bindings, vec![Value::Int(20), Value::Int(10)]);
    }

    #[test]
    fn test_paginate_rejects_page_zero() {
        assert!(QueryBuilder::new(Dialect::MySql).from("users").paginate(10, 0).get_query().is_err());
    }
}

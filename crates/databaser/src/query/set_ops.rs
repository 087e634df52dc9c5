//! Query Builder set operations and common table expressions

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::QueryError;

impl QueryBuilder {
    fn push_set_operation<F>(self, operator: SetOperator, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.apply(|qb| {
            if matches!(operator, SetOperator::Intersect | SetOperator::Except)
                && !qb.dialect.supports_set_difference()
            {
                return Err(QueryError::UnsupportedOperation(format!(
                    "{} is not supported on {}",
                    operator, qb.dialect
                )));
            }
            let sub = qb.subquery(build)?;
            qb.parts.unions.push((operator, sub));
            Ok(())
        })
    }

    pub fn union<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_set_operation(SetOperator::Union, build)
    }

    pub fn union_all<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_set_operation(SetOperator::UnionAll, build)
    }

    /// Rejected on mysql and sqlite
    pub fn intersect<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_set_operation(SetOperator::Intersect, build)
    }

    /// Rejected on mysql and sqlite
    pub fn except<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_set_operation(SetOperator::Except, build)
    }

    fn push_cte<F>(self, name: &str, build: F, recursive: bool) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.apply(|qb| {
            if !qb.dialect.supports_cte() {
                return Err(QueryError::UnsupportedOperation(format!(
                    "common table expressions are not supported on {}",
                    qb.dialect
                )));
            }
            let name = qb.column(name)?;
            let sub = qb.subquery(build)?;
            qb.parts.with.push(Fragment::with_bindings(
                format!("{} AS ({})", name, sub.sql),
                sub.bindings,
            ));
            qb.parts.with_recursive |= recursive;
            Ok(())
        })
    }

    /// Register a CTE: `WITH name AS (...)`
    pub fn with<F>(self, name: &str, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_cte(name, build, false)
    }

    pub fn with_recursive<F>(self, name: &str, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_cte(name, build, true)
    }
}

#[cfg(test)]
mod tests {
    use crate::dialect::Dialect;
    use crate::error::QueryError;
    use crate::query::QueryBuilder;
    use crate::value::Value;

    #[test]
    fn test_union_appended_last() {
        let q = QueryBuilder::new(Dialect::MySql)
            .select(&["id"])
            .from("admins")
            .where_eq("active", 1)
            .union_all(|q| q.select(&["id"]).from("editors").where_eq("active", 2))
            .get_query()
            .unwrap();
        assert_eq!(
            q.query,
            "SELECT `id` FROM `admins` WHERE `active` = ? UNION ALL SELECT `id` FROM `editors` WHERE `active` = ?"
        );
        assert_eq!(q.bindings, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_intersect_rejected_on_mysql_and_sqlite() {
        for dialect in [Dialect::MySql, Dialect::Sqlite] {
            let err = QueryBuilder::new(dialect)
                .from("a")
                .intersect(|q| q.from("b"))
                .get_query()
                .unwrap_err();
            assert!(matches!(err, QueryError::UnsupportedOperation(_)));
        }
        let q = QueryBuilder::new(Dialect::Postgres)
            .from("a")
            .except(|q| q.from("b"))
            .get_query()
            .unwrap();
        assert_eq!(q.query, "SELECT * FROM \"a\" EXCEPT SELECT * FROM \"b\"");
    }

    #[test]
    fn test_cte_prefix_bindings_come_first() {
        let q = QueryBuilder::new(Dialect::Postgres)
            .with("recent", |q| q.from("orders").where_gt("created_at", "2024-01-01"))
            .from("recent")
            .where_eq("status", "paid")
            .get_query()
            .unwrap();
        assert_eq!(
            q.query,
            "WITH \"recent\" AS (SELECT * FROM \"orders\" WHERE \"created_at\" > ?) SELECT * FROM \"recent\" WHERE \"status\" = ?"
        );
        assert_eq!(q.bindings, vec![Value::from("2024-01-01"), Value::from("paid")]);
    }

    #[test]
    fn test_cte_rejected_on_sqlite() {
        let err = QueryBuilder::new(Dialect::Sqlite)
            .with("x", |q| q.from("t"))
            .from("x")
            .get_query()
            .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_recursive_keyword() {
        let q = QueryBuilder::new(Dialect::MySql)
            .with_recursive("tree", |q| q.from("nodes"))
            .from("tree")
            .get_query()
            .unwrap();
        assert!(q.query.starts_with("WITH RECURSIVE `tree` AS ("));
    }
}

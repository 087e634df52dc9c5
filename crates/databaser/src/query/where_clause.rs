//! Query Builder WHERE clause operations
//!
//! Every condition is stored with its connective; the compiler drops the
//! connective of the first one. `or_*` variants attach with `OR`.

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::QueryError;
use crate::value::Value;

impl QueryBuilder {
    fn push_where(self, connective: Connective, build: impl FnOnce(&QueryBuilder) -> Result<Fragment, QueryError>) -> Self {
        self.apply(|qb| {
            let fragment = build(qb)?;
            qb.parts.wheres.push(Condition { connective, fragment });
            Ok(())
        })
    }

    fn compare(self, connective: Connective, column: &str, operator: QueryOperator, value: Value) -> Self {
        self.push_where(connective, |qb| {
            Ok(Fragment::with_bindings(
                format!("{} {} ?", qb.column(column)?, operator),
                vec![QueryBuilder::value(value)],
            ))
        })
    }

    fn compare_str(self, connective: Connective, column: &str, operator: &str, value: Value) -> Self {
        match operator.parse::<QueryOperator>() {
            Ok(op) => self.compare(connective, column, op, value),
            Err(err) => self.apply(|_| Err(err)),
        }
    }

    /// Add WHERE condition with a whitelisted operator
    pub fn where_condition<T: Into<Value>>(self, column: &str, operator: &str, value: T) -> Self {
        self.compare_str(Connective::And, column, operator, value.into())
    }

    pub fn or_where_condition<T: Into<Value>>(self, column: &str, operator: &str, value: T) -> Self {
        self.compare_str(Connective::Or, column, operator, value.into())
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(Connective::And, column, QueryOperator::Equal, value.into())
    }

    pub fn or_where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(Connective::Or, column, QueryOperator::Equal, value.into())
    }

    /// Add WHERE condition with not equal
    pub fn where_ne<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(Connective::And, column, QueryOperator::NotEqual, value.into())
    }

    /// Add WHERE condition with greater than
    pub fn where_gt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(Connective::And, column, QueryOperator::GreaterThan, value.into())
    }

    /// Add WHERE condition with greater than or equal
    pub fn where_gte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(Connective::And, column, QueryOperator::GreaterThanOrEqual, value.into())
    }

    /// Add WHERE condition with less than
    pub fn where_lt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(Connective::And, column, QueryOperator::LessThan, value.into())
    }

    /// Add WHERE condition with less than or equal
    pub fn where_lte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(Connective::And, column, QueryOperator::LessThanOrEqual, value.into())
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.compare(Connective::And, column, QueryOperator::Like, pattern.into())
    }

    pub fn or_where_like(self, column: &str, pattern: &str) -> Self {
        self.compare(Connective::Or, column, QueryOperator::Like, pattern.into())
    }

    /// Add WHERE condition with NOT LIKE
    pub fn where_not_like(self, column: &str, pattern: &str) -> Self {
        self.compare(Connective::And, column, QueryOperator::NotLike, pattern.into())
    }

    fn membership<T: Into<Value>>(self, connective: Connective, column: &str, values: Vec<T>, negated: bool) -> Self {
        let values: Vec<Value> = values.into_iter().map(QueryBuilder::value).collect();
        self.push_where(connective, |qb| {
            let column = qb.column(column)?;
            if values.is_empty() {
                return Ok(Fragment::new(if negated { "1 = 1" } else { "1 = 0" }));
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            let keyword = if negated { "NOT IN" } else { "IN" };
            Ok(Fragment::with_bindings(
                format!("{} {} ({})", column, keyword, placeholders),
                values,
            ))
        })
    }

    /// Add WHERE IN condition; an empty list matches nothing
    pub fn where_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        self.membership(Connective::And, column, values, false)
    }

    pub fn or_where_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        self.membership(Connective::Or, column, values, false)
    }

    /// Add WHERE NOT IN condition; an empty list matches everything
    pub fn where_not_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        self.membership(Connective::And, column, values, true)
    }

    pub fn or_where_not_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        self.membership(Connective::Or, column, values, true)
    }

    /// `column IN (subquery)`
    pub fn where_in_sub<F>(self, column: &str, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_where(Connective::And, |qb| {
            let sub = qb.subquery(build)?;
            Ok(Fragment::with_bindings(
                format!("{} IN ({})", qb.column(column)?, sub.sql),
                sub.bindings,
            ))
        })
    }

    fn nullness(self, connective: Connective, column: &str, negated: bool) -> Self {
        self.push_where(connective, |qb| {
            let check = if negated { "IS NOT NULL" } else { "IS NULL" };
            Ok(Fragment::new(format!("{} {}", qb.column(column)?, check)))
        })
    }

    /// Add WHERE IS NULL condition
    pub fn where_null(self, column: &str) -> Self {
        self.nullness(Connective::And, column, false)
    }

    pub fn or_where_null(self, column: &str) -> Self {
        self.nullness(Connective::Or, column, false)
    }

    /// Add WHERE IS NOT NULL condition
    pub fn where_not_null(self, column: &str) -> Self {
        self.nullness(Connective::And, column, true)
    }

    pub fn or_where_not_null(self, column: &str) -> Self {
        self.nullness(Connective::Or, column, true)
    }

    fn range(self, connective: Connective, column: &str, low: Value, high: Value, negated: bool) -> Self {
        self.push_where(connective, |qb| {
            let keyword = if negated { "NOT BETWEEN" } else { "BETWEEN" };
            Ok(Fragment::with_bindings(
                format!("{} {} ? AND ?", qb.column(column)?, keyword),
                vec![QueryBuilder::value(low), QueryBuilder::value(high)],
            ))
        })
    }

    /// Add WHERE BETWEEN condition
    pub fn where_between<T: Into<Value>>(self, column: &str, low: T, high: T) -> Self {
        self.range(Connective::And, column, low.into(), high.into(), false)
    }

    pub fn or_where_between<T: Into<Value>>(self, column: &str, low: T, high: T) -> Self {
        self.range(Connective::Or, column, low.into(), high.into(), false)
    }

    pub fn where_not_between<T: Into<Value>>(self, column: &str, low: T, high: T) -> Self {
        self.range(Connective::And, column, low.into(), high.into(), true)
    }

    fn column_compare(self, connective: Connective, first: &str, operator: &str, second: &str) -> Self {
        self.push_where(connective, |qb| {
            let op: QueryOperator = operator.parse()?;
            Ok(Fragment::new(format!("{} {} {}", qb.column(first)?, op, qb.column(second)?)))
        })
    }

    /// Compare two columns (`users.id = posts.user_id`)
    pub fn where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.column_compare(Connective::And, first, operator, second)
    }

    pub fn or_where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.column_compare(Connective::Or, first, operator, second)
    }

    /// Verbatim condition with positional bindings; the `?` count must match
    pub fn where_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.push_where(Connective::And, |_| super::raw::positional_fragment(sql, bindings))
    }

    pub fn or_where_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.push_where(Connective::Or, |_| super::raw::positional_fragment(sql, bindings))
    }

    fn group(self, connective: Connective, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        self.apply(|qb| {
            if let Some(inner) = qb.condition_group(build)? {
                qb.parts.wheres.push(Condition {
                    connective,
                    fragment: Fragment::with_bindings(format!("({})", inner.sql), inner.bindings),
                });
            }
            Ok(())
        })
    }

    /// Parenthesised group of conditions built on a nested builder
    pub fn where_group<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.group(Connective::And, build)
    }

    pub fn or_where_group<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.group(Connective::Or, build)
    }

    /// `column <op> (subquery)`
    pub fn where_sub<F>(self, column: &str, operator: &str, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_where(Connective::And, |qb| {
            let op: QueryOperator = operator.parse()?;
            let sub = qb.subquery(build)?;
            Ok(Fragment::with_bindings(
                format!("{} {} ({})", qb.column(column)?, op, sub.sql),
                sub.bindings,
            ))
        })
    }

    fn existence(self, connective: Connective, build: impl FnOnce(QueryBuilder) -> QueryBuilder, negated: bool) -> Self {
        self.push_where(connective, |qb| {
            let sub = qb.subquery(build)?;
            let keyword = if negated { "NOT EXISTS" } else { "EXISTS" };
            Ok(Fragment::with_bindings(format!("{} ({})", keyword, sub.sql), sub.bindings))
        })
    }

    pub fn where_exists<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.existence(Connective::And, build, false)
    }

    pub fn or_where_exists<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.existence(Connective::Or, build, false)
    }

    pub fn where_not_exists<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.existence(Connective::And, build, true)
    }
}

#[cfg(test)]
mod tests {
    use crate::dialect::Dialect;
    use crate::error::QueryError;
    use crate::query::QueryBuilder;
    use crate::value::Value;

    fn users() -> QueryBuilder {
        QueryBuilder::new(Dialect::MySql).from("users")
    }

    #[test]
    fn test_leading_connective_is_stripped() {
        let q = users()
            .where_condition("a", "=", 1)
            .where_condition("b", "=", 2)
            .get_query()
            .unwrap();
        assert_eq!(q.query, "SELECT * FROM `users` WHERE `a` = ? AND `b` = ?");

        let q = users().or_where_eq("a", 1).or_where_eq("b", 2).get_query().unwrap();
        assert_eq!(q.query, "SELECT * FROM `users` WHERE `a` = ? OR `b` = ?");
    }

    #[test]
    fn test_nested_groups_keep_binding_order() {
        let q = users()
            .where_eq("tenant", 7)
            .where_group(|q| q.where_eq("role", "admin").or_where_in("id", vec![1, 2]))
            .or_where_group(|q| q.where_gt("score", 9.5).where_null("banned_at"))
            .where_between("age", 18, 65)
            .get_query()
            .unwrap();

        assert_eq!(
            q.query,
            "SELECT * FROM `users` WHERE `tenant` = ? AND (`role` = ? OR `id` IN (?, ?)) \
             OR (`score` > ? AND `banned_at` IS NULL) AND `age` BETWEEN ? AND ?"
        );
        assert_eq!(
            q.bindings,
            vec![
                Value::Int(7),
                Value::from("admin"),
                Value::Int(1),
                Value::Int(2),
                Value::Float(9.5),
                Value::Int(18),
                Value::Int(65),
            ]
        );
        assert_eq!(q.types, "isiidii");
        assert_eq!(q.query.matches('?').count(), q.bindings.len());
    }

    #[test]
    fn test_empty_in_lists() {
        let q = users().where_in::<i64>("id", vec![]).where_not_in::<i64>("id", vec![]).get_query().unwrap();
        assert_eq!(q.query, "SELECT * FROM `users` WHERE 1 = 0 AND 1 = 1");
        assert!(q.bindings.is_empty());
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let err = users().where_condition("id", "= 1 OR 1 =", 1).get_query().unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperator(_)));
    }

    #[test]
    fn test_exists_and_in_sub() {
        let q = QueryBuilder::new(Dialect::Postgres)
            .from("users")
            .where_exists(|q| q.from("posts").where_column("posts.user_id", "=", "users.id"))
            .where_in_sub("id", |q| q.select(&["user_id"]).from("orders").where_gt("total", 10))
            .get_query()
            .unwrap();
        assert_eq!(
            q.query,
            "SELECT * FROM \"users\" WHERE EXISTS (SELECT * FROM \"posts\" WHERE \"posts\".\"user_id\" = \"users\".\"id\") \
             AND \"id\" IN (SELECT \"user_id\" FROM \"orders\" WHERE \"total\" > ?)"
        );
        assert_eq!(q.bindings, vec![Value::Int(10)]);
    }

    #[test]
    fn test_where_raw_checks_placeholder_count() {
        let q = users().where_raw("LOWER(email) = ?", vec!["a@b.c".into()]).get_query().unwrap();
        assert_eq!(q.query, "SELECT * FROM `users` WHERE LOWER(email) = ?");

        assert!(users().where_raw("a = ? AND b = ?", vec![1.into()]).get_query().is_err());
    }
}

//! Query Builder SELECT operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::QueryError;
use crate::value::Value;

impl QueryBuilder {
    /// Add SELECT fields to the query
    pub fn select(self, fields: &[&str]) -> Self {
        self.apply(|qb| {
            qb.parts.kind = QueryType::Select;
            for field in fields {
                let column = qb.column(field)?;
                qb.parts.select.push(Fragment::new(column));
            }
            Ok(())
        })
    }

    /// Add a verbatim select expression with its own bindings
    pub fn select_raw(self, expression: &str, bindings: Vec<Value>) -> Self {
        self.apply(|qb| {
            let fragment = super::raw::positional_fragment(expression, bindings)?;
            qb.parts.kind = QueryType::Select;
            qb.parts.select.push(fragment);
            Ok(())
        })
    }

    /// SELECT DISTINCT fields
    pub fn select_distinct(self, fields: &[&str]) -> Self {
        self.select(fields).apply(|qb| {
            qb.parts.distinct = true;
            Ok(())
        })
    }

    /// Mark the select list DISTINCT
    pub fn distinct(self) -> Self {
        self.apply(|qb| {
            qb.parts.distinct = true;
            Ok(())
        })
    }

    /// `(subquery) AS alias` in the select list
    pub fn select_sub<F>(self, build: F, alias: &str) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.apply(|qb| {
            let sub = qb.subquery(build)?;
            let alias = qb.column(alias)?;
            qb.parts.kind = QueryType::Select;
            qb.parts.select.push(Fragment::with_bindings(
                format!("({}) AS {}", sub.sql, alias),
                sub.bindings,
            ));
            Ok(())
        })
    }

    fn select_aggregate(self, function: &str, column: &str, alias: Option<&str>) -> Self {
        self.apply(|qb| {
            let column = qb.column(column)?;
            let mut sql = format!("{}({})", function, column);
            if let Some(alias) = alias {
                sql.push_str(" AS ");
                sql.push_str(&qb.column(alias)?);
            }
            qb.parts.kind = QueryType::Select;
            qb.parts.select.push(Fragment::new(sql));
            Ok(())
        })
    }

    pub fn select_count(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate("COUNT", column, alias)
    }

    pub fn select_sum(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate("SUM", column, alias)
    }

    pub fn select_avg(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate("AVG", column, alias)
    }

    pub fn select_min(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate("MIN", column, alias)
    }

    pub fn select_max(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate("MAX", column, alias)
    }

    /// Set the FROM table (aliases allowed: `users u`)
    pub fn from(self, table: &str) -> Self {
        self.apply(|qb| {
            let table = qb.table_name(table)?;
            qb.parts.from = Some(Fragment::new(table));
            Ok(())
        })
    }

    /// FROM a derived table
    pub fn from_sub<F>(self, build: F, alias: &str) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.apply(|qb| {
            let sub = qb.subquery(build)?;
            let alias = qb.table_name(alias)?;
            if alias.contains(' ') {
                return Err(QueryError::InvalidIdentifier(format!(
                    "derived table alias '{}' must be a single identifier",
                    alias
                )));
            }
            qb.parts.from = Some(Fragment::with_bindings(
                format!("({}) {}", sub.sql, alias),
                sub.bindings,
            ));
            Ok(())
        })
    }

    /// Target table for the statement; also serves as the FROM of a SELECT
    pub fn table(self, table: &str) -> Self {
        self.apply(|qb| {
            let table = qb.table_name(table)?;
            if qb.parts.from.is_none() {
                qb.parts.from = Some(Fragment::new(table.clone()));
            }
            qb.parts.table = Some(table);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::dialect::Dialect;
    use crate::query::QueryBuilder;
    use crate::value::Value;

    #[test]
    fn test_select_columns_and_aggregates() {
        let q = QueryBuilder::new(Dialect::MySql)
            .select(&["id", "users.name"])
            .select_count("*", Some("total"))
            .from("users u")
            .get_query()
            .unwrap();
        assert_eq!(q.query, "SELECT `id`, `users`.`name`, COUNT(*) AS `total` FROM `users` u");
    }

    #[test]
    fn test_select_defaults_to_star() {
        let q = QueryBuilder::new(Dialect::Postgres).from("users").get_query().unwrap();
        assert_eq!(q.query, "SELECT * FROM \"users\"");
    }

    #[test]
    fn test_select_sub_bindings_precede_where() {
        let q = QueryBuilder::new(Dialect::MySql)
            .select(&["id"])
            .select_sub(
                |q| q.select_count("*", None).from("posts").where_eq("status", "live"),
                "live_posts",
            )
            .from("users")
            .where_eq("active", true)
            .get_query()
            .unwrap();
        assert_eq!(
            q.query,
            "SELECT `id`, (SELECT COUNT(*) FROM `posts` WHERE `status` = ?) AS `live_posts` FROM `users` WHERE `active` = ?"
        );
        assert_eq!(q.bindings, vec![Value::from("live"), Value::Int(1)]);
        assert_eq!(q.types, "si");
    }

    #[test]
    fn test_from_sub() {
        let q = QueryBuilder::new(Dialect::Postgres)
            .from_sub(|q| q.from("orders").where_gt("total", 100), "big")
            .get_query()
            .unwrap();
        assert_eq!(q.query, "SELECT * FROM (SELECT * FROM \"orders\" WHERE \"total\" > ?) \"big\"");
    }

    #[test]
    fn test_select_distinct() {
        let q = QueryBuilder::new(Dialect::Sqlite)
            .select_distinct(&["city"])
            .from("users")
            .get_query()
            .unwrap();
        assert_eq!(q.query, "SELECT DISTINCT `city` FROM `users`");
    }
}

//! Query Builder INSERT / UPDATE / DELETE / TRUNCATE operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::QueryError;
use crate::value::Value;

impl QueryBuilder {
    fn target(self, kind: QueryType, table: &str) -> Self {
        self.apply(|qb| {
            qb.parts.kind = kind;
            qb.parts.table = Some(qb.table_name(table)?);
            Ok(())
        })
    }

    /// Start INSERT INTO statement
    pub fn insert_into(self, table: &str) -> Self {
        self.target(QueryType::Insert, table)
    }

    /// Start UPDATE statement
    pub fn update(self, table: &str) -> Self {
        self.target(QueryType::Update, table)
    }

    /// Start DELETE FROM statement
    pub fn delete_from(self, table: &str) -> Self {
        self.target(QueryType::Delete, table)
    }

    /// Empty the table (`DELETE FROM` on sqlite)
    pub fn truncate(self, table: &str) -> Self {
        self.target(QueryType::Truncate, table)
    }

    /// Set a column value for INSERT or UPDATE
    pub fn set<T: Into<Value>>(self, column: &str, value: T) -> Self {
        let value = QueryBuilder::value(value);
        self.apply(|qb| {
            if qb.parts.rows.len() > 1 {
                return Err(QueryError::InvalidSql(
                    "set() cannot be combined with insert_many()".to_string(),
                ));
            }
            let column = qb.column(column)?;
            qb.parts.columns.push(column);
            match qb.parts.rows.first_mut() {
                Some(row) => row.push(value),
                None => qb.parts.rows.push(vec![value]),
            }
            Ok(())
        })
    }

    /// Set several column values at once
    pub fn set_values<K, V, I>(self, values: I) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        values
            .into_iter()
            .fold(self, |qb, (column, value)| qb.set(column.as_ref(), value))
    }

    /// `INSERT INTO table (...) VALUES (...)` from column/value pairs
    pub fn insert<K, V, I>(self, table: &str, values: I) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.insert_into(table).set_values(values)
    }

    /// Multi-row INSERT; every row must have one value per column
    pub fn insert_many(self, table: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.insert_into(table).apply(|qb| {
            if columns.is_empty() || rows.is_empty() {
                return Err(QueryError::MissingFields("insert_many needs columns and rows".to_string()));
            }
            if let Some(bad) = rows.iter().position(|row| row.len() != columns.len()) {
                return Err(QueryError::InvalidParameter(format!(
                    "row {} has {} values, expected {}",
                    bad,
                    rows[bad].len(),
                    columns.len()
                )));
            }
            qb.parts.columns = columns.iter().map(|c| qb.column(c)).collect::<Result<_, _>>()?;
            qb.parts.rows = rows
                .into_iter()
                .map(|row| row.into_iter().map(QueryBuilder::value).collect())
                .collect();
            Ok(())
        })
    }

    /// RETURNING (pgsql, sqlite) / OUTPUT INSERTED (sqlsrv) columns
    pub fn returning(self, columns: &[&str]) -> Self {
        self.apply(|qb| {
            if !qb.dialect.supports_returning() {
                return Err(QueryError::UnsupportedOperation(format!(
                    "RETURNING is not supported on {}",
                    qb.dialect
                )));
            }
            for column in columns {
                qb.column(column)?;
                qb.parts.returning.push(column.trim().to_string());
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::dialect::Dialect;
    use crate::error::QueryError;
    use crate::query::QueryBuilder;
    use crate::value::Value;

    #[test]
    fn test_insert_values_bound_in_column_order() {
        let q = QueryBuilder::new(Dialect::MySql)
            .insert("users", [("name", Value::from("Ada")), ("age", Value::Int(36)), ("admin", Value::Bool(true))])
            .get_query()
            .unwrap();
        assert_eq!(q.query, "INSERT INTO `users` (`name`, `age`, `admin`) VALUES (?, ?, ?)");
        assert_eq!(q.bindings, vec![Value::from("Ada"), Value::Int(36), Value::Int(1)]);
        assert_eq!(q.types, "sii");
    }

    #[test]
    fn test_update_set_before_where() {
        let q = QueryBuilder::new(Dialect::Postgres)
            .update("users")
            .where_eq("id", 5)
            .set("name", "Grace")
            .get_query()
            .unwrap();
        assert_eq!(q.query, "UPDATE \"users\" SET \"name\" = ? WHERE \"id\" = ?");
        assert_eq!(q.bindings, vec![Value::from("Grace"), Value::Int(5)]);
    }

    #[test]
    fn test_delete_and_truncate() {
        let q = QueryBuilder::new(Dialect::SqlServer)
            .delete_from("sessions")
            .where_lt("expires_at", "2024-01-01")
            .get_query()
            .unwrap();
        assert_eq!(q.query, "DELETE FROM [sessions] WHERE [expires_at] < ?");

        let q = QueryBuilder::new(Dialect::Sqlite).truncate("logs").get_query().unwrap();
        assert_eq!(q.query, "DELETE FROM `logs`");
        let q = QueryBuilder::new(Dialect::Postgres).truncate("logs").get_query().unwrap();
        assert_eq!(q.query, "TRUNCATE TABLE \"logs\"");
    }

    #[test]
    fn test_insert_many() {
        let q = QueryBuilder::new(Dialect::MySql)
            .insert_many(
                "tags",
                &["name", "weight"],
                vec![vec!["rust".into(), 1.into()], vec!["sql".into(), 2.into()]],
            )
            .get_query()
            .unwrap();
        assert_eq!(q.query, "INSERT INTO `tags` (`name`, `weight`) VALUES (?, ?), (?, ?)");
        assert_eq!(q.bindings.len(), 4);

        let err = QueryBuilder::new(Dialect::MySql)
            .insert_many("tags", &["name", "weight"], vec![vec!["rust".into()]])
            .get_query()
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidParameter(_)));
    }

    #[test]
    fn test_returning_per_dialect() {
        let q = QueryBuilder::new(Dialect::Postgres)
            .insert("users", [("name", "Ada")])
            .returning(&["id"])
            .get_query()
            .unwrap();
        assert_eq!(q.query, "INSERT INTO \"users\" (\"name\") VALUES (?) RETURNING \"id\"");
        assert!(q.returns_rows());

        let q = QueryBuilder::new(Dialect::SqlServer)
            .insert("users", [("name", "Ada")])
            .returning(&["id"])
            .get_query()
            .unwrap();
        assert_eq!(q.query, "INSERT INTO [users] ([name]) OUTPUT INSERTED.[id] VALUES (?)");

        let q = QueryBuilder::new(Dialect::SqlServer)
            .delete_from("users")
            .where_eq("id", 1)
            .returning(&["id"])
            .get_query()
            .unwrap();
        assert_eq!(q.query, "DELETE FROM [users] OUTPUT DELETED.[id] WHERE [id] = ?");

        assert!(QueryBuilder::new(Dialect::MySql)
            .insert("users", [("name", "Ada")])
            .returning(&["id"])
            .get_query()
            .is_err());
    }
}

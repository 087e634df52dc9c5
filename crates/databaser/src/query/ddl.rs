//! Query Builder DDL operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::QueryError;
use crate::schema::SchemaBuilder;
use crate::value::Value;

impl QueryBuilder {
    fn schema_definition<F>(&self, define: F, alter: bool) -> Result<String, QueryError>
    where
        F: FnOnce(&mut SchemaBuilder),
    {
        let mut schema = SchemaBuilder::new(self.dialect);
        define(&mut schema);
        let definition = if alter {
            schema.get_alter_definition()?
        } else {
            schema.get_definition()?
        };
        if definition.is_empty() {
            return Err(QueryError::MissingFields("table definition is empty".to_string()));
        }
        Ok(definition)
    }

    /// `CREATE TABLE t (...)`
    pub fn create_table<F>(self, table: &str, define: F) -> Self
    where
        F: FnOnce(&mut SchemaBuilder),
    {
        self.apply(|qb| {
            let name = qb.table_name(table)?;
            let definition = qb.schema_definition(define, false)?;
            qb.parts.kind = QueryType::CreateTable;
            qb.parts.body = Some(Fragment::new(format!("CREATE TABLE {} ({})", name, definition)));
            qb.parts.table = Some(name);
            Ok(())
        })
    }

    /// Like [`create_table`](Self::create_table), but the executor first asks
    /// the database whether `table` exists and skips the statement if so.
    pub fn create_table_if_not_exist<F>(self, table: &str, define: F) -> Self
    where
        F: FnOnce(&mut SchemaBuilder),
    {
        self.create_table(table, define).apply(|qb| {
            qb.parts.pending_existence_check = Some(table.trim().to_string());
            Ok(())
        })
    }

    /// Introspection query for a pending `create_table_if_not_exist`
    pub fn existence_check(&self) -> Option<(String, Vec<Value>)> {
        if self.error.is_some() {
            return None;
        }
        self.parts
            .pending_existence_check
            .as_deref()
            .map(|table| self.dialect.table_exists_sql(table))
    }

    /// Feed back the result of [`existence_check`](Self::existence_check).
    /// An existing table empties the statement and marks it as a no-op.
    pub fn resolve_if_not_exist(mut self, exists: bool) -> Self {
        if self.parts.pending_existence_check.take().is_some() && exists {
            self.parts.body = None;
            self.parts.if_not_exist_used = true;
        }
        self
    }

    /// `ALTER TABLE t action, action, ...`
    pub fn alter_table<F>(self, table: &str, define: F) -> Self
    where
        F: FnOnce(&mut SchemaBuilder),
    {
        self.apply(|qb| {
            let name = qb.table_name(table)?;
            let definition = qb.schema_definition(define, true)?;
            qb.parts.kind = QueryType::AlterTable;
            qb.parts.body = Some(Fragment::new(format!("ALTER TABLE {} {}", name, definition)));
            qb.parts.table = Some(name);
            Ok(())
        })
    }

    fn push_drop(self, table: &str, if_exists: bool) -> Self {
        self.apply(|qb| {
            let name = qb.table_name(table)?;
            let sql = if if_exists {
                format!("DROP TABLE IF EXISTS {}", name)
            } else {
                format!("DROP TABLE {}", name)
            };
            qb.parts.kind = QueryType::DropTable;
            qb.parts.body = Some(Fragment::new(sql));
            qb.parts.table = Some(name);
            Ok(())
        })
    }

    pub fn drop_table(self, table: &str) -> Self {
        self.push_drop(table, false)
    }

    pub fn drop_table_if_exists(self, table: &str) -> Self {
        self.push_drop(table, true)
    }

    /// `CREATE [UNIQUE] INDEX name ON t (cols)`; the name defaults to
    /// `idx_<cols>` / `uniq_<cols>`
    pub fn create_index(self, table: &str, columns: &[&str], name: Option<&str>, unique: bool) -> Self {
        self.apply(|qb| {
            if columns.is_empty() {
                return Err(QueryError::MissingFields("create_index needs columns".to_string()));
            }
            let table_name = qb.table_name(table)?;
            let quoted = columns
                .iter()
                .map(|c| qb.column(c))
                .collect::<Result<Vec<_>, _>>()?;
            let index_name = match name {
                Some(name) => name.to_string(),
                None => format!(
                    "{}_{}",
                    if unique { "uniq" } else { "idx" },
                    columns.iter().map(|c| c.trim()).collect::<Vec<_>>().join("_")
                ),
            };
            let sql = format!(
                "CREATE {}INDEX {} ON {} ({})",
                if unique { "UNIQUE " } else { "" },
                qb.column(&index_name)?,
                table_name,
                quoted.join(", ")
            );
            qb.parts.kind = QueryType::CreateIndex;
            qb.parts.body = Some(Fragment::new(sql));
            qb.parts.table = Some(table_name);
            Ok(())
        })
    }
}

//! SQL dialects
//!
//! The five backends the builder can target. Everything dialect-specific in
//! identifier quoting, pagination and DDL branches on [`Dialect`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::value::Value;

/// Supported SQL backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "pgsql", alias = "postgres")]
    Postgres,
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "oci", alias = "oracle")]
    Oracle,
    #[serde(rename = "sqlsrv", alias = "mssql")]
    SqlServer,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::MySql,
        Dialect::Postgres,
        Dialect::Sqlite,
        Dialect::Oracle,
        Dialect::SqlServer,
    ];

    /// Short name (`mysql`, `pgsql`, `sqlite`, `oci`, `sqlsrv`)
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "pgsql",
            Dialect::Sqlite => "sqlite",
            Dialect::Oracle => "oci",
            Dialect::SqlServer => "sqlsrv",
        }
    }

    /// Detect the dialect from a connection URL scheme
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "mysql" | "mariadb" => Some(Dialect::MySql),
            "postgres" | "postgresql" | "pgsql" => Some(Dialect::Postgres),
            "sqlite" => Some(Dialect::Sqlite),
            "oracle" | "oci" => Some(Dialect::Oracle),
            "mssql" | "sqlserver" | "sqlsrv" => Some(Dialect::SqlServer),
            _ => None,
        }
    }

    /// Quote a single identifier segment, doubling embedded quote characters
    pub fn quote_identifier(&self, segment: &str) -> String {
        match self {
            Dialect::MySql | Dialect::Sqlite => format!("`{}`", segment.replace('`', "``")),
            Dialect::SqlServer => format!("[{}]", segment.replace(']', "]]")),
            Dialect::Postgres | Dialect::Oracle => format!("\"{}\"", segment.replace('"', "\"\"")),
        }
    }

    pub fn supports_cte(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// INTERSECT / EXCEPT
    pub fn supports_set_difference(&self) -> bool {
        !matches!(self, Dialect::MySql | Dialect::Sqlite)
    }

    pub fn supports_returning(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite | Dialect::SqlServer)
    }

    pub fn supports_upsert(&self) -> bool {
        matches!(self, Dialect::MySql | Dialect::Postgres | Dialect::Sqlite)
    }

    /// Only MySQL accepts plain `INDEX` entries inside `CREATE TABLE`
    pub fn supports_inline_index(&self) -> bool {
        matches!(self, Dialect::MySql)
    }

    /// Introspection query answering "does this table exist" with one row per hit
    pub fn table_exists_sql(&self, table: &str) -> (String, Vec<Value>) {
        let sql = match self {
            Dialect::MySql => {
                "SELECT TABLE_NAME FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?"
            }
            Dialect::Postgres => {
                "SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = current_schema() AND tablename = ?"
            }
            Dialect::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            Dialect::Oracle => "SELECT table_name FROM user_tables WHERE table_name = UPPER(?)",
            Dialect::SqlServer => "SELECT name FROM sys.tables WHERE name = ?",
        };
        (sql.to_string(), vec![Value::String(table.to_string())])
    }

    /// Statement that empties a table
    pub fn truncate_sql(&self, quoted_table: &str) -> String {
        match self {
            Dialect::Sqlite => format!("DELETE FROM {}", quoted_table),
            _ => format!("TRUNCATE TABLE {}", quoted_table),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Dialect {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            "oci" | "oracle" => Ok(Dialect::Oracle),
            "sqlsrv" | "mssql" | "sqlserver" => Ok(Dialect::SqlServer),
            other => Err(QueryError::UnsupportedOperation(format!(
                "unknown database dialect '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_names_round_trip() {
        for dialect in Dialect::ALL {
            assert_eq!(dialect.name().parse::<Dialect>().unwrap(), dialect);
        }
        assert!("db2".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_from_url() {
        assert_eq!(Dialect::from_url("mysql://root@localhost/app"), Some(Dialect::MySql));
        assert_eq!(Dialect::from_url("postgres://localhost/app"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("redis://localhost"), None);
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(Dialect::MySql.quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(Dialect::SqlServer.quote_identifier("a]b"), "[a]]b]");
        assert_eq!(Dialect::Postgres.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(Dialect::Sqlite.truncate_sql("`t`"), "DELETE FROM `t`");
        assert_eq!(Dialect::MySql.truncate_sql("`t`"), "TRUNCATE TABLE `t`");
    }
}

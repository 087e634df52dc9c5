//! Column types and their per-dialect spellings

use crate::dialect::Dialect;
use crate::sanitizer::{is_sql_expression, is_valid_column};
use crate::value::Value;

/// Logical column type
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    /// Auto-incrementing primary key
    Id,
    String(u32),
    Text,
    Integer,
    BigInteger,
    Boolean,
    Decimal(u8, u8),
    Float,
    Date,
    DateTime,
    Timestamp,
    Json,
}

impl ColumnType {
    /// Type name as spelled by `dialect`
    pub fn sql_type(&self, dialect: Dialect) -> String {
        use Dialect::*;
        match (self, dialect) {
            (ColumnType::Id, MySql) => "BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY".into(),
            (ColumnType::Id, Postgres) => "BIGSERIAL PRIMARY KEY".into(),
            (ColumnType::Id, Sqlite) => "INTEGER PRIMARY KEY AUTOINCREMENT".into(),
            (ColumnType::Id, Oracle) => "NUMBER(19) GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY".into(),
            (ColumnType::Id, SqlServer) => "BIGINT IDENTITY(1,1) PRIMARY KEY".into(),

            (ColumnType::String(_), Sqlite) => "TEXT".into(),
            (ColumnType::String(len), Oracle) => format!("VARCHAR2({})", len),
            (ColumnType::String(len), SqlServer) => format!("NVARCHAR({})", len),
            (ColumnType::String(len), _) => format!("VARCHAR({})", len),

            (ColumnType::Text, Oracle) => "CLOB".into(),
            (ColumnType::Text, SqlServer) => "NVARCHAR(MAX)".into(),
            (ColumnType::Text, _) => "TEXT".into(),

            (ColumnType::Integer, MySql | SqlServer) => "INT".into(),
            (ColumnType::Integer, Oracle) => "NUMBER(10)".into(),
            (ColumnType::Integer, _) => "INTEGER".into(),

            (ColumnType::BigInteger, Sqlite) => "INTEGER".into(),
            (ColumnType::BigInteger, Oracle) => "NUMBER(19)".into(),
            (ColumnType::BigInteger, _) => "BIGINT".into(),

            (ColumnType::Boolean, MySql) => "TINYINT(1)".into(),
            (ColumnType::Boolean, Postgres) => "BOOLEAN".into(),
            (ColumnType::Boolean, Sqlite) => "INTEGER".into(),
            (ColumnType::Boolean, Oracle) => "NUMBER(1)".into(),
            (ColumnType::Boolean, SqlServer) => "BIT".into(),

            (ColumnType::Decimal(..), Sqlite) => "NUMERIC".into(),
            (ColumnType::Decimal(p, s), Postgres) => format!("NUMERIC({}, {})", p, s),
            (ColumnType::Decimal(p, s), Oracle) => format!("NUMBER({}, {})", p, s),
            (ColumnType::Decimal(p, s), _) => format!("DECIMAL({}, {})", p, s),

            (ColumnType::Float, MySql) => "DOUBLE".into(),
            (ColumnType::Float, Postgres) => "DOUBLE PRECISION".into(),
            (ColumnType::Float, Sqlite) => "REAL".into(),
            (ColumnType::Float, Oracle) => "BINARY_DOUBLE".into(),
            (ColumnType::Float, SqlServer) => "FLOAT".into(),

            (ColumnType::Date, Sqlite) => "TEXT".into(),
            (ColumnType::Date, _) => "DATE".into(),

            (ColumnType::DateTime, MySql) => "DATETIME".into(),
            (ColumnType::DateTime | ColumnType::Timestamp, Sqlite) => "TEXT".into(),
            (ColumnType::DateTime | ColumnType::Timestamp, SqlServer) => "DATETIME2".into(),
            (ColumnType::DateTime | ColumnType::Timestamp, _) => "TIMESTAMP".into(),

            (ColumnType::Json, MySql) => "JSON".into(),
            (ColumnType::Json, Postgres) => "JSONB".into(),
            (ColumnType::Json, Sqlite) => "TEXT".into(),
            (ColumnType::Json, Oracle) => "CLOB".into(),
            (ColumnType::Json, SqlServer) => "NVARCHAR(MAX)".into(),
        }
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self, ColumnType::Id)
    }
}

/// A column being declared, with its modifiers
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<Value>,
    pub unsigned: bool,
    pub unique: bool,
}

impl ColumnDef {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: false,
            default: None,
            unsigned: false,
            unique: false,
        }
    }

    /// Render `name TYPE [DEFAULT ..] [NOT NULL|NULL] [UNIQUE]`; the name
    /// must already be quoted.
    pub fn render(&self, dialect: Dialect, quoted_name: &str) -> String {
        let mut sql = format!("{} {}", quoted_name, self.column_type.sql_type(dialect));
        if self.column_type.is_primary_key() {
            return sql;
        }

        if self.unsigned && dialect == Dialect::MySql {
            sql.push_str(" UNSIGNED");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_literal(dialect, default));
        }
        sql.push_str(if self.nullable { " NULL" } else { " NOT NULL" });
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        sql
    }
}

/// DDL defaults cannot be bound, so they are rendered as escaped literals.
fn default_literal(dialect: Dialect, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) if dialect == Dialect::Postgres => {
            if *b { "TRUE" } else { "FALSE" }.to_string()
        }
        Value::Bool(b) => (*b as i64).to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) if is_sql_expression(s) && is_valid_column(s) && !s.contains('\'') => {
            s.clone()
        }
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(b) => format!("'{}'", String::from_utf8_lossy(b).replace('\'', "''")),
    }
}

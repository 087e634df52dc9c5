//! mysqli-style driver on top of sqlx MySQL
//!
//! Values are bound according to the builder's type string (`i`, `d`, `s`,
//! `b`), one code per placeholder.

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlPoolOptions};

use super::core::*;
use super::decode;
use super::session::{on_session, NativeQuery, NativeSession};
use crate::config::DatabaseConfig;
use crate::dialect::Dialect;
use crate::error::{ModelError, OrmResult};
use crate::query::CompiledQuery;
use crate::value::{Row, Value};

/// MySQL-only driver
#[derive(Debug, Default, Clone, Copy)]
pub struct MysqliDriver;

impl MysqliDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for MysqliDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Mysqli
    }

    async fn connect(&self, config: &DatabaseConfig) -> OrmResult<Box<dyn DatabaseConnection>> {
        if config.dialect != Dialect::MySql {
            return Err(ModelError::Connection(format!(
                "the mysqli driver only connects to mysql, got {}",
                config.dialect
            )));
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect(&config.url)
            .await
            .map_err(|e| ModelError::Connection(format!("Failed to connect to '{}': {}", config.name, e)))?;

        tracing::info!("Opened mysqli connection '{}'", config.name);
        Ok(Box::new(MysqliConnection {
            session: NativeSession::new(pool),
        }))
    }
}

/// Session opened by [`MysqliDriver`]
pub struct MysqliConnection {
    session: NativeSession<MySql>,
}

fn prepare<'q>(sql: &'q str, query: &CompiledQuery) -> OrmResult<NativeQuery<'q, MySql>> {
    if query.types.chars().count() != query.bindings.len() {
        return Err(ModelError::Query(format!(
            "type string '{}' does not match {} bindings",
            query.types,
            query.bindings.len()
        )));
    }
    let mut statement = sqlx::query::<MySql>(sql);
    for (code, value) in query.types.chars().zip(&query.bindings) {
        statement = bind_typed(statement, code, value);
    }
    Ok(statement)
}

#[async_trait]
impl DatabaseConnection for MysqliConnection {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn execute(&mut self, query: &CompiledQuery) -> OrmResult<ExecResult> {
        let statement = prepare(&query.query, query)?;
        let result = on_session!(self.session, statement, execute).map_err(ModelError::execution)?;

        let last_insert_id = match result.last_insert_id() {
            0 => None,
            id => i64::try_from(id).ok(),
        };
        Ok(ExecResult {
            affected_rows: result.rows_affected(),
            last_insert_id,
        })
    }

    async fn fetch_all(&mut self, query: &CompiledQuery) -> OrmResult<Vec<Row>> {
        let statement = prepare(&query.query, query)?;
        let rows = on_session!(self.session, statement, fetch_all).map_err(ModelError::execution)?;
        rows.iter().map(decode::mysql_row).collect()
    }

    async fn begin(&mut self) -> OrmResult<()> {
        self.session.begin().await
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.session.commit().await
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.session.rollback().await
    }

    fn in_transaction(&self) -> bool {
        self.session.in_transaction()
    }

    async fn close(&mut self) -> OrmResult<()> {
        self.session.close().await
    }
}

/// Bind `value` as the type named by `code`
fn bind_typed<'q>(query: NativeQuery<'q, MySql>, code: char, value: &Value) -> NativeQuery<'q, MySql> {
    if value.is_null() {
        return query.bind(Option::<String>::None);
    }
    match code {
        'i' => query.bind(value.as_i64().unwrap_or_default()),
        'd' => query.bind(value.as_f64().unwrap_or_default()),
        'b' => match value {
            Value::Bytes(bytes) => query.bind(bytes.clone()),
            other => query.bind(other.to_string().into_bytes()),
        },
        _ => query.bind(value.to_string()),
    }
}

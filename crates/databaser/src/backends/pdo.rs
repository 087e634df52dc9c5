//! PDO-style driver over native sqlx pools
//!
//! Serves mysql, pgsql and sqlite URLs, each on its own sqlx driver so every
//! column type the server supports can be decoded. Bind types are inferred
//! from each value; `?` placeholders are renumbered to `$n` for PostgreSQL.

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlPoolOptions};
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::sqlite::{Sqlite, SqlitePoolOptions};

use super::core::*;
use super::decode;
use super::session::{bind_value, on_session, NativeSession};
use crate::config::DatabaseConfig;
use crate::dialect::Dialect;
use crate::error::{ModelError, OrmResult};
use crate::query::CompiledQuery;
use crate::value::Row;

/// Multi-dialect driver
#[derive(Debug, Default, Clone, Copy)]
pub struct PdoDriver;

impl PdoDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for PdoDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Pdo
    }

    async fn connect(&self, config: &DatabaseConfig) -> OrmResult<Box<dyn DatabaseConnection>> {
        let failed = |e: sqlx::Error| ModelError::Connection(format!("Failed to connect to '{}': {}", config.name, e));
        let session = match config.dialect {
            Dialect::MySql => Session::MySql(NativeSession::new(
                MySqlPoolOptions::new().max_connections(1).connect(&config.url).await.map_err(failed)?,
            )),
            Dialect::Postgres => Session::Postgres(NativeSession::new(
                PgPoolOptions::new().max_connections(1).connect(&config.url).await.map_err(failed)?,
            )),
            Dialect::Sqlite => Session::Sqlite(NativeSession::new(
                SqlitePoolOptions::new().max_connections(1).connect(&config.url).await.map_err(failed)?,
            )),
            Dialect::Oracle | Dialect::SqlServer => {
                return Err(ModelError::Connection(format!(
                    "the pdo driver cannot open {} connections",
                    config.dialect
                )))
            }
        };

        tracing::info!("Opened pdo connection '{}' ({})", config.name, config.dialect);
        Ok(Box::new(PdoConnection {
            dialect: config.dialect,
            session,
        }))
    }
}

enum Session {
    MySql(NativeSession<MySql>),
    Postgres(NativeSession<Postgres>),
    Sqlite(NativeSession<Sqlite>),
}

/// Session opened by [`PdoDriver`]
pub struct PdoConnection {
    dialect: Dialect,
    session: Session,
}

#[async_trait]
impl DatabaseConnection for PdoConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&mut self, query: &CompiledQuery) -> OrmResult<ExecResult> {
        let bindings = &query.bindings;
        let result = match &mut self.session {
            Session::MySql(session) => {
                let statement = bindings.iter().fold(sqlx::query::<MySql>(&query.query), bind_value);
                let done = on_session!(session, statement, execute).map_err(ModelError::execution)?;
                ExecResult {
                    affected_rows: done.rows_affected(),
                    last_insert_id: nonzero_id(i64::try_from(done.last_insert_id()).ok()),
                }
            }
            Session::Postgres(session) => {
                let sql = numbered_placeholders(&query.query);
                let statement = bindings.iter().fold(sqlx::query::<Postgres>(&sql), bind_value);
                let done = on_session!(session, statement, execute).map_err(ModelError::execution)?;
                ExecResult {
                    affected_rows: done.rows_affected(),
                    last_insert_id: None,
                }
            }
            Session::Sqlite(session) => {
                let statement = bindings.iter().fold(sqlx::query::<Sqlite>(&query.query), bind_value);
                let done = on_session!(session, statement, execute).map_err(ModelError::execution)?;
                ExecResult {
                    affected_rows: done.rows_affected(),
                    last_insert_id: nonzero_id(Some(done.last_insert_rowid())),
                }
            }
        };
        Ok(result)
    }

    async fn fetch_all(&mut self, query: &CompiledQuery) -> OrmResult<Vec<Row>> {
        let bindings = &query.bindings;
        match &mut self.session {
            Session::MySql(session) => {
                let statement = bindings.iter().fold(sqlx::query::<MySql>(&query.query), bind_value);
                let rows = on_session!(session, statement, fetch_all).map_err(ModelError::execution)?;
                rows.iter().map(decode::mysql_row).collect()
            }
            Session::Postgres(session) => {
                let sql = numbered_placeholders(&query.query);
                let statement = bindings.iter().fold(sqlx::query::<Postgres>(&sql), bind_value);
                let rows = on_session!(session, statement, fetch_all).map_err(ModelError::execution)?;
                rows.iter().map(decode::postgres_row).collect()
            }
            Session::Sqlite(session) => {
                let statement = bindings.iter().fold(sqlx::query::<Sqlite>(&query.query), bind_value);
                let rows = on_session!(session, statement, fetch_all).map_err(ModelError::execution)?;
                rows.iter().map(decode::sqlite_row).collect()
            }
        }
    }

    async fn begin(&mut self) -> OrmResult<()> {
        match &mut self.session {
            Session::MySql(session) => session.begin().await,
            Session::Postgres(session) => session.begin().await,
            Session::Sqlite(session) => session.begin().await,
        }
    }

    async fn commit(&mut self) -> OrmResult<()> {
        match &mut self.session {
            Session::MySql(session) => session.commit().await,
            Session::Postgres(session) => session.commit().await,
            Session::Sqlite(session) => session.commit().await,
        }
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        match &mut self.session {
            Session::MySql(session) => session.rollback().await,
            Session::Postgres(session) => session.rollback().await,
            Session::Sqlite(session) => session.rollback().await,
        }
    }

    fn in_transaction(&self) -> bool {
        match &self.session {
            Session::MySql(session) => session.in_transaction(),
            Session::Postgres(session) => session.in_transaction(),
            Session::Sqlite(session) => session.in_transaction(),
        }
    }

    async fn close(&mut self) -> OrmResult<()> {
        match &mut self.session {
            Session::MySql(session) => session.close().await,
            Session::Postgres(session) => session.close().await,
            Session::Sqlite(session) => session.close().await,
        }
    }
}

fn nonzero_id(id: Option<i64>) -> Option<i64> {
    id.filter(|id| *id != 0)
}

/// Rewrite `?` placeholders to `$1, $2, ...`, leaving quoted text alone
pub fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut n = 0;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(c),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;
    use crate::value::Value;

    #[test]
    fn test_numbered_placeholders() {
        assert_eq!(
            numbered_placeholders("SELECT * FROM \"users\" WHERE \"id\" = ? AND \"name\" = ?"),
            "SELECT * FROM \"users\" WHERE \"id\" = $1 AND \"name\" = $2"
        );
        // Doubled quotes close and reopen the literal, so the count is unaffected
        assert_eq!(
            numbered_placeholders("SELECT 'it''s ?', ? FROM t"),
            "SELECT 'it''s ?', $1 FROM t"
        );
    }

    #[tokio::test]
    async fn test_rejects_dialects_without_sqlx_driver() {
        let config = DatabaseConfig::from_url("erp", "oracle://localhost/erp").unwrap();
        let err = PdoDriver::new().connect(&config).await.err().unwrap();
        assert!(matches!(err, ModelError::Connection(_)));
    }

    fn statement(sql: &str, bindings: Vec<Value>) -> CompiledQuery {
        QueryBuilder::new(Dialect::Sqlite).raw(sql, bindings).get_query().unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_columns_decode_by_storage_class() {
        let config = DatabaseConfig::from_url("mem", "sqlite::memory:").unwrap();
        let mut conn = PdoDriver::new().connect(&config).await.unwrap();
        conn.execute(&statement(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, active BOOLEAN, price DECIMAL(8,2), \
             created_at DATETIME, avatar BLOB, note TEXT)",
            vec![],
        ))
        .await
        .unwrap();

        let done = conn
            .execute(&statement(
                "INSERT INTO items (active, price, created_at, avatar, note) VALUES (?, ?, ?, ?, ?)",
                vec![
                    Value::Int(1),
                    Value::Float(9.5),
                    Value::from("2024-01-02 03:04:05"),
                    Value::Bytes(vec![0xff, 0x00]),
                    Value::Null,
                ],
            ))
            .await
            .unwrap();
        assert_eq!(done, ExecResult { affected_rows: 1, last_insert_id: Some(1) });

        let rows = conn.fetch_all(&statement("SELECT * FROM items", vec![])).await.unwrap();
        let row = &rows[0];
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("active"), Some(&Value::Int(1)));
        assert_eq!(row.get("price"), Some(&Value::Float(9.5)));
        assert_eq!(row.get("created_at"), Some(&Value::from("2024-01-02 03:04:05")));
        assert_eq!(row.get("avatar"), Some(&Value::Bytes(vec![0xff, 0x00])));
        assert_eq!(row.get("note"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_sqlite_transaction_rolls_back() {
        let config = DatabaseConfig::from_url("mem", "sqlite::memory:").unwrap();
        let mut conn = PdoDriver::new().connect(&config).await.unwrap();
        conn.execute(&statement("CREATE TABLE logs (msg TEXT)", vec![])).await.unwrap();

        conn.begin().await.unwrap();
        assert!(conn.in_transaction());
        conn.execute(&statement("INSERT INTO logs (msg) VALUES (?)", vec![Value::from("hi")]))
            .await
            .unwrap();
        conn.rollback().await.unwrap();
        assert!(!conn.in_transaction());

        let rows = conn.fetch_all(&statement("SELECT COUNT(*) AS n FROM logs", vec![])).await.unwrap();
        assert_eq!(rows[0].get("n"), Some(&Value::Int(0)));
        assert!(conn.commit().await.is_err());
        conn.close().await.unwrap();
    }
}

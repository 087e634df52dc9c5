//! Core Database Backend Traits
//!
//! A [`Driver`] opens connections; a [`DatabaseConnection`] runs compiled
//! statements and owns the transaction state of its session. Both drivers
//! speak the same trait so the [`Databaser`](crate::Databaser) never branches
//! on which one is active.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, DatabaseConfig};
use crate::dialect::Dialect;
use crate::error::OrmResult;
use crate::query::CompiledQuery;
use crate::value::Row;

/// Which driver family a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Multi-dialect driver (native sqlx pool per dialect); infers bind types from the values
    Pdo,
    /// MySQL-only driver; binds by the builder's type string
    Mysqli,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Pdo => write!(f, "pdo"),
            DriverKind::Mysqli => write!(f, "mysqli"),
        }
    }
}

impl FromStr for DriverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdo" => Ok(DriverKind::Pdo),
            "mysqli" => Ok(DriverKind::Mysqli),
            _ => Err(ConfigError::InvalidValue {
                field: "driver".to_string(),
                value: s.to_string(),
                expected: "pdo or mysqli".to_string(),
            }),
        }
    }
}

/// Outcome of a statement that does not return rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub affected_rows: u64,
    pub last_insert_id: Option<i64>,
}

/// One live database session; callers serialise access through a mutex
#[async_trait]
pub trait DatabaseConnection: Send {
    fn dialect(&self) -> Dialect;

    /// Run a statement and report affected rows / insert id
    async fn execute(&mut self, query: &CompiledQuery) -> OrmResult<ExecResult>;

    /// Run a statement and return every row it produces
    async fn fetch_all(&mut self, query: &CompiledQuery) -> OrmResult<Vec<Row>>;

    async fn begin(&mut self) -> OrmResult<()>;

    async fn commit(&mut self) -> OrmResult<()>;

    async fn rollback(&mut self) -> OrmResult<()>;

    /// Whether a transaction is open on this session
    fn in_transaction(&self) -> bool;

    async fn close(&mut self) -> OrmResult<()>;
}

/// Connection factory of one driver family
#[async_trait]
pub trait Driver: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// Open a session against `config`
    async fn connect(&self, config: &DatabaseConfig) -> OrmResult<Box<dyn DatabaseConnection>>;
}

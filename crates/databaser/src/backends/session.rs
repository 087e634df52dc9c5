//! Native sqlx session shared by both driver families

use sqlx::database::HasArguments;
use sqlx::query::Query;
use sqlx::{Database, Encode, Pool, Transaction, Type};

use crate::error::{ModelError, OrmResult};
use crate::value::Value;

/// Run `$statement.$method(..)` inside the open transaction, or on the pool
macro_rules! on_session {
    ($session:expr, $statement:expr, $method:ident) => {
        match $session.tx.as_mut() {
            Some(tx) => $statement.$method(&mut **tx).await,
            None => $statement.$method(&$session.pool).await,
        }
    };
}

pub(crate) use on_session;

/// A single-connection pool and the transaction open on it, if any
pub(crate) struct NativeSession<DB: Database> {
    pub(crate) pool: Pool<DB>,
    pub(crate) tx: Option<Transaction<'static, DB>>,
}

impl<DB: Database> NativeSession<DB> {
    pub(crate) fn new(pool: Pool<DB>) -> Self {
        Self { pool, tx: None }
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub(crate) async fn begin(&mut self) -> OrmResult<()> {
        if self.tx.is_some() {
            return Err(ModelError::Transaction("a transaction is already open".to_string()));
        }
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ModelError::Transaction(format!("Failed to begin transaction: {}", e)))?;
        self.tx = Some(tx);
        Ok(())
    }

    pub(crate) async fn commit(&mut self) -> OrmResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| ModelError::Transaction("no transaction is open".to_string()))?;
        tx.commit()
            .await
            .map_err(|e| ModelError::Transaction(format!("Transaction commit failed: {}", e)))
    }

    pub(crate) async fn rollback(&mut self) -> OrmResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| ModelError::Transaction("no transaction is open".to_string()))?;
        tx.rollback()
            .await
            .map_err(|e| ModelError::Transaction(format!("Transaction rollback failed: {}", e)))
    }

    /// Roll back whatever is still open, then close the pool
    pub(crate) async fn close(&mut self) -> OrmResult<()> {
        if self.tx.is_some() {
            self.rollback().await?;
        }
        self.pool.close().await;
        Ok(())
    }
}

pub(crate) type NativeQuery<'q, DB> = Query<'q, DB, <DB as HasArguments<'q>>::Arguments>;

/// Bind with the type the value already has
pub(crate) fn bind_value<'q, DB>(query: NativeQuery<'q, DB>, value: &Value) -> NativeQuery<'q, DB>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Vec<u8>: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
{
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
    }
}

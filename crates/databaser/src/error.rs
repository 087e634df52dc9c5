//! Errors of the query core
//!
//! [`QueryError`] is raised while a builder is assembled and surfaces at
//! `get_query()`. [`ModelError`] covers everything after that point: opening
//! sessions, running statements, hydrating and persisting entities.
//! [`EventError`] is what an entity hook returns to veto an operation.

use std::fmt;

pub type ModelResult<T> = Result<T, ModelError>;

pub type OrmError = ModelError;

pub type OrmResult<T> = ModelResult<T>;

/// Failure of a `Databaser`, `Entity` or `Collection` operation
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Driver failure outside of a statement (connect, decode, close)
    Database(String),
    /// No row with the requested key in the named table
    NotFound(String),
    Validation(String),
    /// Update, delete or refresh of an entity without a key value
    MissingPrimaryKey,
    Relationship(String),
    Serialization(String),
    /// No session could be opened, or none is selected
    Connection(String),
    Transaction(String),
    /// The builder could not produce a statement
    Query(String),
    /// The server rejected a statement; `errno` is the driver's code or `"0"`
    Execution { error: String, errno: String },
    /// An entity hook vetoed the operation
    Event(String),
    Configuration(String),
    Cache(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Database(msg) => write!(f, "driver failure: {}", msg),
            ModelError::NotFound(table) => write!(f, "no matching row in '{}'", table),
            ModelError::Validation(msg) => write!(f, "invalid attributes: {}", msg),
            ModelError::MissingPrimaryKey => f.write_str("entity has no primary key value"),
            ModelError::Relationship(msg) => write!(f, "relation failed: {}", msg),
            ModelError::Serialization(msg) => write!(f, "could not (de)serialize: {}", msg),
            ModelError::Connection(msg) => write!(f, "no usable connection: {}", msg),
            ModelError::Transaction(msg) => write!(f, "transaction failed: {}", msg),
            ModelError::Query(msg) => write!(f, "cannot build statement: {}", msg),
            ModelError::Execution { error, errno } => write!(f, "statement failed ({}): {}", errno, error),
            ModelError::Event(msg) => write!(f, "vetoed by hook: {}", msg),
            ModelError::Configuration(msg) => write!(f, "bad configuration: {}", msg),
            ModelError::Cache(msg) => write!(f, "result cache: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

impl ModelError {
    /// Wrap a driver error raised while running a statement
    pub fn execution(err: sqlx::Error) -> Self {
        let errno = match &err {
            sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
            _ => None,
        };
        ModelError::Execution {
            error: err.to_string(),
            errno: errno.unwrap_or_else(|| "0".to_string()),
        }
    }

    /// Server error code of a failed statement
    pub fn errno(&self) -> Option<&str> {
        match self {
            ModelError::Execution { errno, .. } => Some(errno),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ModelError::NotFound("row".to_string()),
            other => ModelError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<dotapp_cache::CacheError> for ModelError {
    fn from(err: dotapp_cache::CacheError) -> Self {
        ModelError::Cache(err.to_string())
    }
}

impl From<crate::config::ConfigError> for ModelError {
    fn from(err: crate::config::ConfigError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}

/// Why a builder refused a clause. The first one recorded wins.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Table or column name rejected by the sanitizer
    InvalidIdentifier(String),
    /// Comparison operator outside the whitelist
    InvalidOperator(String),
    InvalidSql(String),
    /// A required clause (columns, values, definition) is missing
    MissingFields(String),
    /// Placeholder/binding mismatch or out-of-range argument
    InvalidParameter(String),
    /// The clause has no rendering on the builder's dialect
    UnsupportedOperation(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (what, detail) = match self {
            QueryError::InvalidIdentifier(d) => ("rejected identifier", d),
            QueryError::InvalidOperator(d) => ("unknown operator", d),
            QueryError::InvalidSql(d) => ("malformed SQL", d),
            QueryError::MissingFields(d) => ("incomplete statement", d),
            QueryError::InvalidParameter(d) => ("bad binding", d),
            QueryError::UnsupportedOperation(d) => ("not supported by dialect", d),
        };
        write!(f, "{}: {}", what, detail)
    }
}

impl std::error::Error for QueryError {}

impl From<QueryError> for ModelError {
    fn from(err: QueryError) -> Self {
        ModelError::Query(err.to_string())
    }
}

/// Returned by an entity hook to abort the save or delete in progress
#[derive(Debug, Clone, PartialEq)]
pub enum EventError {
    HandlerFailed(String),
    /// The hook stopped the operation on purpose
    PropagationStopped(String),
}

impl EventError {
    pub fn handler_failed(msg: impl Into<String>) -> Self {
        EventError::HandlerFailed(msg.into())
    }

    pub fn stop(reason: impl Into<String>) -> Self {
        EventError::PropagationStopped(reason.into())
    }
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::HandlerFailed(msg) => write!(f, "hook failed: {}", msg),
            EventError::PropagationStopped(msg) => write!(f, "stopped: {}", msg),
        }
    }
}

impl std::error::Error for EventError {}

impl From<EventError> for ModelError {
    fn from(err: EventError) -> Self {
        ModelError::Event(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_carries_errno() {
        let err = ModelError::Execution {
            error: "Duplicate entry 'ada' for key 'name'".to_string(),
            errno: "23000".to_string(),
        };
        assert_eq!(err.to_string(), "statement failed (23000): Duplicate entry 'ada' for key 'name'");
        assert_eq!(err.errno(), Some("23000"));
        assert_eq!(ModelError::MissingPrimaryKey.errno(), None);
    }

    #[test]
    fn test_query_error_converts() {
        let err: ModelError = QueryError::InvalidOperator("=>".to_string()).into();
        assert_eq!(err, ModelError::Query("unknown operator: =>".to_string()));
    }

    #[test]
    fn test_hook_veto_message() {
        let err: ModelError = EventError::stop("archived rows are read-only").into();
        assert_eq!(err, ModelError::Event("stopped: archived rows are read-only".to_string()));
    }
}

//! # dotapp-databaser: SQL query core for DotApp
//!
//! Dialect-aware query and schema builders, two interchangeable driver
//! families (PDO-style over native sqlx pools, mysqli-style over sqlx
//! MySQL), the [`Databaser`] dispatch object, [`Entity`] active records and
//! lazy [`Collection`]s.
//!
//! ```rust,no_run
//! use dotapp_databaser::{Databaser, DatabaserConfig, DatabaseConfig, DriverKind};
//!
//! # async fn demo() -> dotapp_databaser::OrmResult<()> {
//! let config = DatabaserConfig::new(DriverKind::Pdo)
//!     .with_database(DatabaseConfig::from_url("main", "sqlite::memory:")?);
//! let db = Databaser::connect(config).await?;
//!
//! let mut users = db
//!     .q(|qb| qb.select(&["id", "name"]).from("users").where_eq("active", true))
//!     .all()
//!     .await?;
//! println!("{} active users", users.count().await?);
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod collection;
pub mod config;
pub mod databaser;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod events;
pub mod query;
pub mod sanitizer;
pub mod schema;
pub mod value;

pub use backends::{
    driver_for, DatabaseConnection, Driver, DriverKind, ExecResult, MysqliConnection, MysqliDriver, PdoConnection,
    PdoDriver,
};
pub use collection::{build_pagination_result, Collection, CollectionItem, Paginated};
pub use config::{ConfigError, DatabaseConfig, DatabaserConfig, DEFAULT_CACHE_TTL};
pub use databaser::{
    ConnectionCache, Databaser, ExecutionData, PendingQuery, QueryOutput, ReturnType, SharedConnection,
    StatementState,
};
pub use dialect::Dialect;
pub use entity::{Entity, RelationDef, RelationValue, Rule};
pub use error::*;
pub use events::{EntityEvent, EventDispatcher};
pub use query::{CompiledQuery, QueryBuilder, QueryType, RawBindings};
pub use sanitizer::{sanitize_column, sanitize_table, sanitize_value, type_code};
pub use schema::SchemaBuilder;
pub use value::{Row, Value};

pub use dotapp_cache::{CacheDriver, CacheError};

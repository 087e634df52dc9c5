//! Databaser configuration
//!
//! Connections are described by name, URL and dialect. `from_env` reads the
//! single-database setup most applications use:
//!
//! | variable | default |
//! |----------|---------|
//! | `DATABASE_URL` | required |
//! | `DATABASE_NAME` | `default` |
//! | `DATABASE_DRIVER` | `pdo` |
//! | `DATABASER_CACHE_TTL` | `3600` |

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backends::DriverKind;
use crate::dialect::Dialect;

/// Seconds a cached result set stays valid unless configured otherwise
pub const DEFAULT_CACHE_TTL: u64 = 3600;

/// Configuration error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Unknown database '{0}'")]
    UnknownDatabase(String),
}

/// One named connection target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub url: String,
    pub dialect: Dialect,
}

impl DatabaseConfig {
    /// Build from a URL, detecting the dialect from its scheme
    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        let dialect = Dialect::from_url(&url).ok_or_else(|| ConfigError::InvalidValue {
            field: "url".to_string(),
            value: url.clone(),
            expected: "mysql://, postgres://, sqlite:, oracle:// or mssql:// URL".to_string(),
        })?;
        Ok(Self {
            name: name.into(),
            url,
            dialect,
        })
    }

    /// Database (schema) name from the URL path, if there is one
    pub fn database_name(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.url).ok()?;
        let path = parsed.path().trim_start_matches('/');
        if path.is_empty() {
            None
        } else {
            Some(path.to_string())
        }
    }
}

/// Top-level configuration of a [`Databaser`](crate::Databaser)
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaserConfig {
    pub databases: BTreeMap<String, DatabaseConfig>,
    pub default_database: String,
    pub driver: DriverKind,
    pub cache_ttl: Duration,
}

impl Default for DatabaserConfig {
    fn default() -> Self {
        Self {
            databases: BTreeMap::new(),
            default_database: "default".to_string(),
            driver: DriverKind::Pdo,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL),
        }
    }
}

impl DatabaserConfig {
    pub fn new(driver: DriverKind) -> Self {
        Self {
            driver,
            ..Default::default()
        }
    }

    /// Register a connection target; the first one becomes the default
    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        if self.databases.is_empty() {
            self.default_database = database.name.clone();
        }
        self.databases.insert(database.name.clone(), database);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseConfig> {
        self.databases.get(name)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingRequired {
            field: "database_url".to_string(),
            hint: "DATABASE_URL environment variable is required".to_string(),
        })?;
        let name = env::var("DATABASE_NAME").unwrap_or_else(|_| "default".to_string());

        let mut config = Self::default();
        if let Ok(driver) = env::var("DATABASE_DRIVER") {
            config.driver = driver.parse()?;
        }
        if let Ok(ttl) = env::var("DATABASER_CACHE_TTL") {
            let seconds: u64 = ttl.parse().map_err(|_| ConfigError::InvalidValue {
                field: "cache_ttl".to_string(),
                value: ttl.clone(),
                expected: "number of seconds".to_string(),
            })?;
            config.cache_ttl = Duration::from_secs(seconds);
        }

        let config = config.with_database(DatabaseConfig::from_url(name, url)?);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.databases.contains_key(&self.default_database) {
            return Err(ConfigError::UnknownDatabase(self.default_database.clone()));
        }

        for database in self.databases.values() {
            if self.driver == DriverKind::Mysqli && database.dialect != Dialect::MySql {
                return Err(ConfigError::InvalidValue {
                    field: format!("databases.{}.url", database.name),
                    value: database.dialect.to_string(),
                    expected: "mysql (the mysqli driver only speaks MySQL)".to_string(),
                });
            }
            if database.url.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: format!("databases.{}.url", database.name),
                    hint: "every database needs a connection URL".to_string(),
                });
            }
        }

        Ok(())
    }
}

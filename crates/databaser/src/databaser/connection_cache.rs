//! Live sessions shared by every `Databaser` of one application context

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::backends::{DatabaseConnection, Driver, DriverKind};
use crate::config::DatabaseConfig;
use crate::error::OrmResult;

/// A session behind an async mutex; one statement runs on it at a time
pub type SharedConnection = Arc<Mutex<Box<dyn DatabaseConnection>>>;

/// Connections keyed by `(driver kind, database name)`.
///
/// A second `select_db` for the same name reuses the open session instead of
/// reconnecting.
#[derive(Default)]
pub struct ConnectionCache {
    connections: DashMap<(DriverKind, String), SharedConnection>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: DriverKind, name: &str) -> Option<SharedConnection> {
        self.connections
            .get(&(kind, name.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Cached session for `config`, connecting through `driver` on a miss
    pub async fn get_or_connect(&self, driver: &dyn Driver, config: &DatabaseConfig) -> OrmResult<SharedConnection> {
        let kind = driver.kind();
        if let Some(existing) = self.get(kind, &config.name) {
            tracing::debug!("Reusing {} connection '{}'", kind, config.name);
            return Ok(existing);
        }

        let connection = driver.connect(config).await.map_err(|e| {
            tracing::error!("Failed to open {} connection '{}': {}", kind, config.name, e);
            e
        })?;
        let fresh: SharedConnection = Arc::new(Mutex::new(connection));

        // Another task may have connected meanwhile; the first insert wins
        let shared = self
            .connections
            .entry((kind, config.name.clone()))
            .or_insert(fresh)
            .value()
            .clone();
        Ok(shared)
    }

    /// Drop a cached session and close it
    pub async fn close(&self, kind: DriverKind, name: &str) -> OrmResult<bool> {
        match self.connections.remove(&(kind, name.to_string())) {
            Some((_, connection)) => {
                connection.lock().await.close().await?;
                tracing::info!("Closed {} connection '{}'", kind, name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn close_all(&self) -> OrmResult<()> {
        let keys: Vec<(DriverKind, String)> = self.connections.iter().map(|e| e.key().clone()).collect();
        for (kind, name) in keys {
            self.close(kind, &name).await?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl std::fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("connections", &self.connections.len())
            .finish()
    }
}

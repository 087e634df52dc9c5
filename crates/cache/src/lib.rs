//! # dotapp-cache
//!
//! Pluggable cache drivers used by the DotApp query core to memoise query
//! results.
//!
//! A driver only has to store opaque byte payloads under string keys with a
//! TTL. Pattern-based eviction (`delete_keys`) is optional: drivers that cannot
//! enumerate their keys keep the default implementation, which reports the
//! operation as unsupported.
//!
//! ```rust
//! use dotapp_cache::{CacheConfig, CacheDriver, MemoryBackend};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache = MemoryBackend::new(CacheConfig::default());
//!
//! cache.set("users:ORM:abc", b"[]".to_vec(), Some(Duration::from_secs(3600))).await.unwrap();
//! assert_eq!(cache.get("users:ORM:abc").await.unwrap(), Some(b"[]".to_vec()));
//!
//! // Evict everything cached for the `users` table
//! assert_eq!(cache.delete_keys("users:*").await.unwrap(), 1);
//! # });
//! ```

use std::time::Duration;
use async_trait::async_trait;
use thiserror::Error;

pub mod backends;
pub mod config;

pub use backends::*;
pub use config::*;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The store itself failed (I/O, protocol, poisoned state)
    #[error("cache store failed: {0}")]
    Backend(String),

    /// The driver does not implement the named operation
    #[error("operation '{0}' is not available on this cache driver")]
    Unsupported(String),

    #[error("invalid cache setup: {0}")]
    Configuration(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Byte store behind the result cache of the query core.
///
/// Keys look like `users:ORM:<md5>`; payloads are opaque to the driver.
#[async_trait]
pub trait CacheDriver: Send + Sync {
    /// Payload stored under `key`, unless it is missing or expired
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key`. `None` means the driver's default TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Drop one key; `true` if it was present
    async fn forget(&self, key: &str) -> CacheResult<bool>;

    async fn flush(&self) -> CacheResult<()>;

    fn supports_delete_keys(&self) -> bool {
        false
    }

    /// Drop every key matching a wildcard pattern (`*`, `?`) and return how
    /// many went. Table invalidation relies on this.
    async fn delete_keys(&self, _pattern: &str) -> CacheResult<usize> {
        Err(CacheError::Unsupported("delete_keys".to_string()))
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(CacheStats::default())
    }
}

/// Counters reported by [`CacheDriver::stats`]
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_keys: u64,
    /// Approximate bytes held (keys plus payloads)
    pub memory_usage: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use parking_lot::Mutex;

    /// Minimal driver that cannot enumerate keys
    struct KeyValueOnly {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl CacheDriver for KeyValueOnly {
        async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
            Ok(self.entries.lock().get(key).cloned())
        }

        async fn set(&self, key: &str, value: Vec<u8>, _ttl: Option<Duration>) -> CacheResult<()> {
            self.entries.lock().insert(key.to_string(), value);
            Ok(())
        }

        async fn forget(&self, key: &str) -> CacheResult<bool> {
            Ok(self.entries.lock().remove(key).is_some())
        }

        async fn flush(&self) -> CacheResult<()> {
            self.entries.lock().clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delete_keys_defaults_to_unsupported() {
        let driver = KeyValueOnly { entries: Mutex::new(HashMap::new()) };
        driver.set("users:RAW:1", vec![1], None).await.unwrap();

        assert!(!driver.supports_delete_keys());
        let err = driver.delete_keys("users:*").await.unwrap_err();
        assert!(matches!(err, CacheError::Unsupported(_)));
        assert_eq!(driver.get("users:RAW:1").await.unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats { hits: 3, misses: 1, ..Default::default() };
        assert_eq!(stats.hit_ratio(), 0.75);
        assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    }
}

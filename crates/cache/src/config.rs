//! Driver settings

use std::time::Duration;

/// Seconds an entry lives when neither the caller nor the config says otherwise
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Settings shared by the cache drivers
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when a caller passes `None`; `None` here keeps entries
    /// until they are evicted
    pub default_ttl: Option<Duration>,

    /// Entry cap of the memory driver
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(DEFAULT_TTL_SECS)),
            max_entries: Some(10_000),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl_duration(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn no_default_ttl(mut self) -> Self {
        self.default_ttl = None;
        self
    }

    pub fn max_entries_limit(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn unlimited_entries(mut self) -> Self {
        self.max_entries = None;
        self
    }
}

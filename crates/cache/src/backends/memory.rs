//! In-memory cache driver keyed by query cache keys

use crate::{CacheConfig, CacheDriver, CacheResult, CacheStats};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;
use wildmatch::WildMatch;

#[derive(Debug, Clone)]
struct StoredEntry {
    payload: Vec<u8>,
    expires_at: Option<Instant>,
    touched_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// Process-local cache driver.
///
/// Entries expire lazily on read; when `max_entries` is reached the least
/// recently touched entry is dropped before a new key is stored.
pub struct MemoryBackend {
    entries: DashMap<String, StoredEntry>,
    config: CacheConfig,
    stats: Mutex<CacheStats>,
}

impl MemoryBackend {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    fn make_room(&self) {
        let Some(max) = self.config.max_entries else {
            return;
        };

        self.purge_expired();
        while self.entries.len() >= max {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().touched_at)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    debug!("Evicting cache entry '{}'", key);
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[async_trait]
impl CacheDriver for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut expired = false;
        let hit = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.touched_at = now;
                Some(entry.payload.clone())
            }
            Some(_) => {
                expired = true;
                None
            }
            None => None,
        };
        // The shard guard is released once the match above ends
        if expired {
            self.entries.remove(key);
        }

        let mut stats = self.stats.lock();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        if !self.entries.contains_key(key) {
            self.make_room();
        }

        let now = Instant::now();
        let ttl = ttl.or(self.config.default_ttl);
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                payload: value,
                expires_at: ttl.map(|ttl| now + ttl),
                touched_at: now,
            },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn flush(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }

    fn supports_delete_keys(&self) -> bool {
        true
    }

    async fn delete_keys(&self, pattern: &str) -> CacheResult<usize> {
        let matcher = WildMatch::new(pattern);
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|e| matcher.matches(e.key()))
            .map(|e| e.key().clone())
            .collect();

        let removed = doomed
            .iter()
            .filter(|key| self.entries.remove(key.as_str()).is_some())
            .count();
        debug!("Deleted {} cache entries matching '{}'", removed, pattern);
        Ok(removed)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let stats = self.stats.lock();
        Ok(CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            total_keys: self.entries.len() as u64,
            memory_usage: self
                .entries
                .iter()
                .map(|e| (e.key().len() + e.value().payload.len()) as u64)
                .sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_set_get_forget() {
        let backend = MemoryBackend::default();

        backend.set("users:ORM:1", b"rows".to_vec(), None).await.unwrap();
        assert_eq!(backend.get("users:ORM:1").await.unwrap(), Some(b"rows".to_vec()));

        assert!(backend.forget("users:ORM:1").await.unwrap());
        assert!(!backend.forget("users:ORM:1").await.unwrap());
        assert_eq!(backend.get("users:ORM:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let backend = MemoryBackend::new(CacheConfig::default().no_default_ttl());

        backend.set("short", b"v".to_vec(), Some(Duration::from_millis(30))).await.unwrap();
        backend.set("forever", b"v".to_vec(), None).await.unwrap();
        assert_eq!(backend.len(), 2);

        sleep(Duration::from_millis(60)).await;

        assert_eq!(backend.get("short").await.unwrap(), None);
        assert_eq!(backend.get("forever").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_evicts_least_recently_touched() {
        let backend = MemoryBackend::new(CacheConfig::default().max_entries_limit(2));

        backend.set("a", b"1".to_vec(), None).await.unwrap();
        sleep(Duration::from_millis(2)).await;
        backend.set("b", b"2".to_vec(), None).await.unwrap();
        sleep(Duration::from_millis(2)).await;
        backend.get("a").await.unwrap();
        sleep(Duration::from_millis(2)).await;
        backend.set("c", b"3".to_vec(), None).await.unwrap();

        assert!(backend.get("a").await.unwrap().is_some());
        assert!(backend.get("b").await.unwrap().is_none());
        assert!(backend.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_keys_by_table_prefix() {
        let backend = MemoryBackend::default();
        backend.set("users:ORM:aa", vec![1], None).await.unwrap();
        backend.set("users:RAW:bb", vec![2], None).await.unwrap();
        backend.set("posts:ORM:cc", vec![3], None).await.unwrap();

        assert!(backend.supports_delete_keys());
        assert_eq!(backend.delete_keys("users:*").await.unwrap(), 2);
        assert_eq!(backend.get("users:ORM:aa").await.unwrap(), None);
        assert_eq!(backend.get("posts:ORM:cc").await.unwrap(), Some(vec![3]));
        assert_eq!(backend.delete_keys("comments:*").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let backend = MemoryBackend::default();
        backend.set("k", b"value".to_vec(), None).await.unwrap();

        backend.get("k").await.unwrap();
        backend.get("missing").await.unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_keys, 1);
        assert!(stats.memory_usage > 0);
        assert_eq!(stats.hit_ratio(), 0.5);

        backend.flush().await.unwrap();
        assert!(backend.is_empty());
    }
}

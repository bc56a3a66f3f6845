use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheItem<V> {
    value: V,
    created_at: Instant,
    expires_at: Option<Instant>,
    access_count: u64,
    last_accessed: Instant,
}

impl<V> CacheItem<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// `hits / (hits + misses)`, 0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Introspection row returned by [`BoundedCache::entries`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub age_secs: f64,
    pub expires_in_secs: Option<f64>,
    pub access_count: u64,
    pub idle_secs: f64,
    pub is_expired: bool,
}

struct Inner<V> {
    items: LruCache<String, CacheItem<V>>,
    stats: CacheStats,
}

/// Capacity- and TTL-bounded map evicting the least recently accessed entry.
///
/// One mutex covers the entries and the counters, so lookups, LRU promotion,
/// eviction and statistics always agree. The lock is never held across an
/// await point.
pub struct BoundedCache<V> {
    inner: Mutex<Inner<V>>,
    default_ttl: Option<Duration>,
}

impl<V: Clone> BoundedCache<V> {
    /// `default_ttl` of `None` keeps entries until evicted.
    pub fn new(capacity: usize, default_ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                items: LruCache::new(capacity),
                stats: CacheStats {
                    capacity: capacity.get(),
                    ..Default::default()
                },
            }),
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();

        let Some(expired) = inner.items.peek(key).map(|item| item.is_expired(now)) else {
            inner.stats.misses += 1;
            return None;
        };

        if expired {
            inner.items.pop(key);
            inner.stats.misses += 1;
            inner.stats.expired += 1;
            inner.stats.size = inner.items.len();
            debug!(key, "Cache entry expired");
            return None;
        }

        let value = inner.items.get_mut(key).map(|item| {
            item.access_count += 1;
            item.last_accessed = now;
            item.value.clone()
        });
        inner.stats.hits += 1;
        value
    }

    /// Insert with the cache's default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL (`None` never expires). Inserting a new key
    /// into a full cache evicts the least recently accessed entry first.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let now = Instant::now();
        let item = CacheItem {
            value,
            created_at: now,
            expires_at: ttl.map(|t| now + t),
            access_count: 0,
            last_accessed: now,
        };

        let mut inner = self.lock();
        if let Some((old_key, _)) = inner.items.push(key.clone(), item) {
            if old_key != key {
                inner.stats.evictions += 1;
                debug!(evicted = %old_key, "Cache entry evicted");
            }
        }
        inner.stats.size = inner.items.len();
    }

    /// True when `key` is present and fresh. Does not touch stats or LRU order.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock().items.peek(key).is_some_and(|item| !item.is_expired(now))
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.items.pop(key).is_some();
        inner.stats.size = inner.items.len();
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.items.clear();
        inner.stats.size = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every stale entry and return how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let stale: Vec<String> = inner
            .items
            .iter()
            .filter(|(_, item)| item.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &stale {
            inner.items.pop(key);
        }
        inner.stats.expired += stale.len() as u64;
        inner.stats.size = inner.items.len();
        if !stale.is_empty() {
            debug!(removed = stale.len(), "Expired cache entries cleaned up");
        }
        stale.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }

    /// Snapshot of all entries, most accessed first.
    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        let now = Instant::now();
        let inner = self.lock();
        let mut rows: Vec<CacheEntryInfo> = inner
            .items
            .iter()
            .map(|(key, item)| CacheEntryInfo {
                key: key.clone(),
                age_secs: now.duration_since(item.created_at).as_secs_f64(),
                expires_in_secs: item
                    .expires_at
                    .map(|exp| exp.saturating_duration_since(now).as_secs_f64()),
                access_count: item.access_count,
                idle_secs: now.duration_since(item.last_accessed).as_secs_f64(),
                is_expired: item.is_expired(now),
            })
            .collect();
        rows.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        rows
    }
}

impl<V> std::fmt::Debug for BoundedCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("BoundedCache")
            .field("len", &inner.items.len())
            .field("stats", &inner.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_accessed() {
        let cache = BoundedCache::new(2, None);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_is_not_an_eviction() {
        let cache = BoundedCache::new(2, None);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("a"), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_get_is_miss_and_removes() {
        let cache = BoundedCache::new(4, Some(Duration::from_secs(10)));
        cache.set("k", "v");
        assert!(cache.contains("k"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cache.contains("k"));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_counts() {
        let cache = BoundedCache::new(8, None);
        cache.set_with_ttl("short-1", 1, Some(Duration::from_secs(5)));
        cache.set_with_ttl("short-2", 2, Some(Duration::from_secs(5)));
        cache.set("forever", 3);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expired, 2);
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn test_hit_rate() {
        let cache = BoundedCache::new(4, None);
        assert_eq!(cache.stats().hit_rate(), 0.0);
        cache.set("a", 1);
        cache.get("a");
        cache.get("a");
        cache.get("a");
        cache.get("missing");
        assert!((cache.stats().hit_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_entries_sorted_by_access_count() {
        let cache = BoundedCache::new(4, None);
        cache.set("cold", 1);
        cache.set("hot", 2);
        cache.get("hot");
        cache.get("hot");
        cache.get("cold");

        let entries = cache.entries();
        assert_eq!(entries[0].key, "hot");
        assert_eq!(entries[0].access_count, 2);
        assert_eq!(entries[1].key, "cold");
        assert!(entries.iter().all(|e| !e.is_expired && e.expires_in_secs.is_none()));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = BoundedCache::new(4, None);
        cache.set("a", 1);
        cache.set("b", 2);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().size, 0);
    }
}

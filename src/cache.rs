// Bounded TTL + LRU cache for upstream responses.
//
// Eviction is two-phase: expired entries are purged first, and only if the
// cache is still full does the least-recently-accessed live entry go. Access
// order is tracked with a monotonic tick rather than wall time so LRU picks
// are deterministic even when many entries are touched within one instant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

/// Build a deterministic cache key from an operation name and its normalized
/// request. Serialization order follows struct field order, so equal requests
/// always produce equal keys.
pub fn cache_key<T: Serialize>(operation: &str, request: &T) -> String {
    // Struct serialization cannot fail for our request types.
    let body = serde_json::to_string(request).unwrap_or_default();
    format!("{operation}:{body}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry {
    value: Value,
    expires_at: Instant,
    last_access: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    tick: u64,
}

/// Thread-safe response cache with a hard size bound.
pub struct ResponseCache {
    inner: Mutex<Inner>,
    max_size: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl ResponseCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        assert!(max_size > 0, "cache size must be positive");
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(max_size),
                tick: 0,
            }),
            max_size,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Look up a key, refreshing its LRU position on a hit. An expired entry
    /// is removed on sight and counts as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        match inner.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_access = tick;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite, evicting as needed to stay within `max_size`.
    pub fn put(&self, key: String, value: Value) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            self.make_room(&mut inner, now);
        }

        inner.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
                last_access: tick,
            },
        );
    }

    /// Purge expired entries; if none were expired, evict the LRU entry.
    fn make_room(&self, inner: &mut Inner, now: Instant) {
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.expires_at > now);
        let expired = before - inner.entries.len();
        if expired > 0 {
            self.expirations.fetch_add(expired as u64, Ordering::Relaxed);
            return;
        }

        let victim = inner
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            debug!(key = %key, "evicting least recently used cache entry");
            inner.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a single key, if present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            size: self.len(),
            capacity: self.max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn cache(max: usize, ttl_secs: u64) -> ResponseCache {
        ResponseCache::new(max, Duration::from_secs(ttl_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn basic_put_get() {
        let cache = cache(10, 60);
        cache.put("k1".into(), json!({"n": 1}));
        assert_eq!(cache.get("k1"), Some(json!({"n": 1})));
        assert_eq!(cache.get("k2"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = cache(10, 60);
        cache.put("k1".into(), json!(1));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("k1"), None);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn get_refreshes_lru_position() {
        let cache = cache(2, 60);
        cache.put("a".into(), json!(1));
        cache.put("b".into(), json!(2));
        // Touch "a" so "b" becomes the LRU victim.
        assert!(cache.get("a").is_some());
        cache.put("c".into(), json!(3));

        assert!(cache.get("a").is_some());
        assert_eq!(cache.get("b"), None);
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_purged_before_lru_eviction() {
        let cache = cache(2, 60);
        cache.put("old".into(), json!(1));
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.put("live".into(), json!(2));
        // Cache is full but "old" is expired, so the insert purges it and
        // "live" survives.
        cache.put("new".into(), json!(3));

        assert!(cache.get("live").is_some());
        assert!(cache.get("new").is_some());
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_does_not_evict() {
        let cache = cache(2, 60);
        cache.put("a".into(), json!(1));
        cache.put("b".into(), json!(2));
        cache.put("a".into(), json!(10));

        assert_eq!(cache.get("a"), Some(json!(10)));
        assert!(cache.get("b").is_some());
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_empties_and_resets_counters() {
        let cache = cache(10, 60);
        cache.put("a".into(), json!(1));
        cache.put("b".into(), json!(2));
        let _ = cache.get("a");
        let _ = cache.get("missing");
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.capacity, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_removes_single_key() {
        let cache = cache(10, 60);
        cache.put("a".into(), json!(1));
        cache.put("b".into(), json!(2));
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn size_never_exceeds_bound() {
        let cache = cache(5, 60);
        for i in 0..50 {
            cache.put(format!("k{i}"), json!(i));
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn cache_keys_deterministic() {
        #[derive(Serialize)]
        struct Req {
            a: u32,
            b: String,
        }
        let r1 = Req { a: 1, b: "x".into() };
        let r2 = Req { a: 1, b: "x".into() };
        assert_eq!(cache_key("op", &r1), cache_key("op", &r2));
        assert_ne!(cache_key("op", &r1), cache_key("other", &r1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_access_is_consistent() {
        let cache = Arc::new(ResponseCache::new(100, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for t in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    let key = format!("k{}", i % 150);
                    if (t + i) % 3 == 0 {
                        cache.put(key, json!(i));
                    } else {
                        let _ = cache.get(&key);
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(cache.len() <= 100);
        let stats = cache.stats();
        assert!(stats.hits + stats.misses > 0);
    }
}

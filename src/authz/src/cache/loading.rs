//! Bounded, idle-expiring, single-flight loading cache
//!
//! Entries live in independently locked LRU shards so unrelated keys never
//! contend on one lock. Loads in progress are registered per key; concurrent
//! misses on the same key await the same shared future.
//!
//! Lock order is always in-flight map first, then shard.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::fmt::Display;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{AuthzError, Result};

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Cached value with its last access time
struct CachedEntry<V> {
    value: V,
    last_access: Instant,
}

/// Load in progress for one key
struct InFlight<V> {
    id: u64,
    future: SharedLoad<V>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that waited on another caller's load
    pub coalesced: u64,
    /// Backing loads started
    pub loads: u64,
    pub load_failures: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.coalesced;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Keyed cache that loads missing values exactly once per key
pub struct LoadingCache<K, V> {
    name: &'static str,
    shards: Box<[Mutex<LruCache<K, CachedEntry<V>>>]>,
    hasher: RandomState,
    in_flight: DashMap<K, InFlight<V>>,
    idle_timeout: Duration,
    load_timeout: Duration,
    next_load_id: AtomicU64,
    counters: Arc<Counters>,
}

impl<K, V> LoadingCache<K, V>
where
    K: Hash + Eq + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache; `name` labels load errors and log lines
    pub fn new(name: &'static str, config: &CacheConfig) -> Self {
        let capacity = config.capacity.max(1);
        let shard_count = config.shards.min(capacity).max(1);
        // Shard capacities sum to exactly `capacity`
        let base = capacity / shard_count;
        let remainder = capacity % shard_count;

        let shards = (0..shard_count)
            .map(|i| {
                let slots = base + usize::from(i < remainder);
                let slots = NonZeroUsize::new(slots).unwrap_or(NonZeroUsize::MIN);
                Mutex::new(LruCache::new(slots))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            name,
            shards,
            hasher: RandomState::new(),
            in_flight: DashMap::new(),
            idle_timeout: config.idle_timeout(),
            load_timeout: config.load_timeout(),
            next_load_id: AtomicU64::new(0),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn shard(&self, key: &K) -> &Mutex<LruCache<K, CachedEntry<V>>> {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }

    fn is_idle(&self, entry: &CachedEntry<V>, now: Instant) -> bool {
        now.duration_since(entry.last_access) >= self.idle_timeout
    }

    /// Fresh cached value, refreshing its access time; idle entries are dropped
    fn lookup(&self, key: &K) -> Option<V> {
        let mut shard = self.shard(key).lock();
        let now = Instant::now();

        let entry = shard.get_mut(key)?;
        if self.is_idle(entry, now) {
            shard.pop(key);
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        entry.last_access = now;
        Some(entry.value.clone())
    }

    fn store(&self, key: K, value: V) {
        let entry = CachedEntry {
            value,
            last_access: Instant::now(),
        };

        let mut shard = self.shard(&key).lock();
        if let Some((evicted, _)) = shard.push(key.clone(), entry) {
            if evicted != key {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Cached value for `key` without loading
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        self.lookup(key)
    }

    /// Cached value for `key`, loading it with `loader` on a miss
    ///
    /// Concurrent misses on the same key share one call to `loader` and all
    /// observe its outcome. Failures are returned to every waiter but never
    /// cached. A load that outlives `load_timeout` fails with `CacheLoad`.
    pub async fn get_with<F, Fut>(&self, key: K, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(value) = self.lookup(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let (id, future) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                let in_flight = occupied.get();
                (in_flight.id, in_flight.future.clone())
            }
            Entry::Vacant(vacant) => {
                // A load may have completed between the lookup and the entry
                if let Some(value) = self.lookup(&key) {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);

                let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
                let future = self.spawn_load(&key, loader());
                vacant.insert(InFlight {
                    id,
                    future: future.clone(),
                });
                (id, future)
            }
        };

        let result = future.await;
        self.complete(&key, id, &result);
        result
    }

    fn spawn_load<Fut>(&self, key: &K, load: Fut) -> SharedLoad<V>
    where
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let counters = self.counters.clone();
        let timeout = self.load_timeout;
        let cache = self.name;
        let key = key.to_string();

        async move {
            counters.loads.fetch_add(1, Ordering::Relaxed);
            debug!(cache, key = %key, "Loading cache entry");

            let result = match tokio::time::timeout(timeout, load).await {
                Ok(result) => result,
                Err(_) => Err(AuthzError::CacheLoad {
                    cache,
                    key: key.clone(),
                    reason: format!("load timed out after {:?}", timeout),
                }),
            };

            if let Err(e) = &result {
                counters.load_failures.fetch_add(1, Ordering::Relaxed);
                if !e.is_not_found() {
                    warn!(cache, key = %key, error = %e, "Cache load failed");
                }
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Publish a finished load, once, unless it was invalidated meanwhile
    fn complete(&self, key: &K, id: u64, result: &Result<V>) {
        {
            let Some(in_flight) = self.in_flight.get(key) else {
                return;
            };
            if in_flight.id != id {
                return;
            }
            // Holding the registration keeps a concurrent invalidate from
            // slipping in between this check and the insert
            if let Ok(value) = result {
                self.store(key.clone(), value.clone());
            }
        }
        self.in_flight.remove_if(key, |_, in_flight| in_flight.id == id);
    }

    /// Drop `key`, including any load in progress for it
    pub fn invalidate(&self, key: &K) {
        self.in_flight.remove(key);
        self.shard(key).lock().pop(key);
    }

    /// Drop every entry and every load in progress
    pub fn invalidate_all(&self) {
        self.in_flight.clear();
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
    }

    /// Remove entries idle for longer than the idle timeout
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;

        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            let idle: Vec<K> = shard
                .iter()
                .filter(|(_, entry)| self.is_idle(entry, now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in idle {
                shard.pop(&key);
                purged += 1;
            }
        }

        self.counters.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    /// Number of cached entries, including idle ones not yet purged
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of loads currently in progress
    pub fn loads_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            loads: c.loads.load(Ordering::Relaxed),
            load_failures: c.load_failures.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            expirations: c.expirations.load(Ordering::Relaxed),
            size: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn config(capacity: usize, shards: usize) -> CacheConfig {
        CacheConfig {
            capacity,
            shards,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_hit_after_load() {
        let cache: LoadingCache<String, u32> = LoadingCache::new("numbers", &config(10, 2));

        let v = cache.get_with("a".to_string(), || async { Ok(1) }).await.unwrap();
        assert_eq!(v, 1);

        // Loader is not called again on a hit
        let v = cache
            .get_with("a".to_string(), || async {
                Err(AuthzError::Internal("loader called on a hit".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(v, 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache: LoadingCache<String, u32> = LoadingCache::new("numbers", &config(2, 1));

        for (k, v) in [("a", 1), ("b", 2)] {
            cache.get_with(k.to_string(), move || async move { Ok(v) }).await.unwrap();
        }
        // Touch "a" so "b" is least recently used
        assert_eq!(cache.get_if_present(&"a".to_string()), Some(1));
        cache.get_with("c".to_string(), || async { Ok(3) }).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get_if_present(&"b".to_string()).is_none());
        assert_eq!(cache.get_if_present(&"a".to_string()), Some(1));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_sharded_size_never_exceeds_capacity() {
        for (capacity, shards, inserts) in [(20, 16, 200u32), (1000, 16, 5000), (7, 3, 50)] {
            let cache: LoadingCache<u32, u32> =
                LoadingCache::new("numbers", &config(capacity, shards));

            for k in 0..inserts {
                cache.get_with(k, move || async move { Ok(k) }).await.unwrap();
                assert!(cache.len() <= capacity, "{} entries over {}", cache.len(), capacity);
            }
            assert_eq!(cache.stats().size, cache.len());
            assert_eq!(cache.stats().evictions, u64::from(inserts) - cache.len() as u64);
        }
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let cache: LoadingCache<String, u32> = LoadingCache::new("numbers", &config(10, 1));
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let err = cache
            .get_with("k".to_string(), move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(AuthzError::Internal("directory down".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, AuthzError::Internal("directory down".to_string()));
        assert_eq!(cache.loads_in_flight(), 0);

        let c = calls.clone();
        let v = cache
            .get_with("k".to_string(), move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(v, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().load_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout() {
        let cache: LoadingCache<String, u32> = LoadingCache::new(
            "numbers",
            &CacheConfig {
                load_timeout_ms: 100,
                ..Default::default()
            },
        );

        let err = cache
            .get_with("slow".to_string(), || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthzError::CacheLoad { cache: "numbers", .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache: LoadingCache<String, u32> = LoadingCache::new("numbers", &config(10, 4));
        cache.get_with("a".to_string(), || async { Ok(1) }).await.unwrap();
        cache.get_with("b".to_string(), || async { Ok(2) }).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.get_if_present(&"a".to_string()), Some(1));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_invalidate_missing_key_is_noop() {
        let cache: LoadingCache<String, u32> = LoadingCache::new("numbers", &config(10, 1));
        cache.invalidate(&"nothing".to_string());
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}

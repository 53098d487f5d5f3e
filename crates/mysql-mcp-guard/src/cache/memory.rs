//! Bounded in-memory cache with TTL and eviction policies

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use super::config::{DEFAULT_MAX_VALUE_SIZE, EvictionPolicy};
use super::error::{CacheError, CacheResult};
use super::key::CacheKey;
use super::provider::{CacheEntryMeta, CacheProvider, CacheStats, InvalidationScope};

struct CacheEntry {
    value: Vec<u8>,
    inserted_at: Instant,
    last_accessed_at: Instant,
    ttl: Option<Duration>,
}

impl CacheEntry {
    fn expires_at(&self) -> Option<Instant> {
        self.ttl.and_then(|ttl| self.inserted_at.checked_add(ttl))
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|exp| now >= exp)
    }
}

#[derive(Default)]
struct InMemoryStats {
    hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
}

/// Store and recency list live under one mutex so a recency update cannot
/// race an eviction of the same entry.
struct Inner {
    entries: LruCache<CacheKey, CacheEntry>,
    size_bytes: usize,
    stats: InMemoryStats,
    generation: u64,
}

impl Inner {
    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.value.len());
        Some(entry)
    }

    fn remove_where(&mut self, mut predicate: impl FnMut(&CacheKey, &CacheEntry) -> bool) -> u64 {
        let doomed: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(key, entry)| predicate(*key, *entry))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in &doomed {
            if self.remove(key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    fn purge_expired(&mut self, now: Instant) -> u64 {
        let removed = self.remove_where(|_, entry| entry.is_expired_at(now));
        self.stats.expirations += removed;
        removed
    }

    /// Make room for one entry. Returns false when nothing could be removed.
    fn evict_one(&mut self, policy: EvictionPolicy, now: Instant) -> bool {
        match policy {
            EvictionPolicy::Lru | EvictionPolicy::Fifo => {
                let Some((_, entry)) = self.entries.pop_lru() else {
                    return false;
                };
                self.size_bytes = self.size_bytes.saturating_sub(entry.value.len());
            }
            EvictionPolicy::Ttl => {
                if self.purge_expired(now) > 0 {
                    return true;
                }
                // Entries without expiry sort last
                let victim = self
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| (entry.expires_at().is_none(), entry.expires_at()))
                    .map(|(key, _)| key.clone());
                let Some(victim) = victim else {
                    return false;
                };
                self.remove(&victim);
            }
        }

        self.stats.evictions += 1;
        #[cfg(feature = "metrics")]
        crate::observability::record_cache_eviction(policy.as_str());
        true
    }
}

/// Thread-safe bounded cache
///
/// # Eviction
///
/// At capacity, one entry is evicted per insert of a new key:
///
/// - [`EvictionPolicy::Lru`] - least recently accessed; hits promote
/// - [`EvictionPolicy::Fifo`] - oldest inserted; hits do not reorder, an overwrite
///   counts as a new insertion
/// - [`EvictionPolicy::Ttl`] - all expired entries, else the one expiring soonest
///
/// TTL is enforced under every policy. Expired entries are dropped on access
/// and by [`CacheProvider::purge_expired`], which the maintenance task calls.
#[derive(Clone)]
pub struct InMemoryCache {
    inner: Arc<Mutex<Inner>>,
    max_entries: usize,
    max_value_size: usize,
    default_ttl: Option<Duration>,
    policy: EvictionPolicy,
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("max_entries", &self.max_entries)
            .field("max_value_size", &self.max_value_size)
            .field("default_ttl", &self.default_ttl)
            .field("policy", &self.policy)
            .field("entry_count", &self.inner.lock().entries.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryCache {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: LruCache::unbounded(),
                size_bytes: 0,
                stats: InMemoryStats::default(),
                generation: 0,
            })),
            max_entries: max_entries.max(1),
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            default_ttl: None,
            policy: EvictionPolicy::Lru,
        }
    }

    #[must_use]
    pub const fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn with_max_value_size(mut self, max: usize) -> Self {
        self.max_value_size = max;
        self
    }

    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn eviction_policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Lookup at an explicit instant
    pub fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Vec<u8>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.peek(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired_at(now),
        };

        if expired {
            inner.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            return None;
        }

        let entry = match self.policy {
            EvictionPolicy::Lru => inner.entries.get_mut(key),
            EvictionPolicy::Ttl | EvictionPolicy::Fifo => inner.entries.peek_mut(key),
        };
        let value = entry.map(|entry| {
            entry.last_accessed_at = now;
            entry.value.clone()
        });
        inner.stats.hits += 1;
        value
    }

    /// Insert at an explicit instant
    pub fn set_at(
        &self,
        key: &CacheKey,
        value: &[u8],
        ttl: Option<Duration>,
        now: Instant,
    ) -> CacheResult<()> {
        let entry = self.entry(value, ttl, now)?;
        let mut inner = self.inner.lock();
        self.insert(&mut inner, key, entry, now);
        Ok(())
    }

    /// Insert at an explicit instant unless the cache was invalidated after
    /// `generation` was read
    pub fn set_if_generation_at(
        &self,
        key: &CacheKey,
        value: &[u8],
        ttl: Option<Duration>,
        generation: u64,
        now: Instant,
    ) -> CacheResult<bool> {
        let entry = self.entry(value, ttl, now)?;
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return Ok(false);
        }
        self.insert(&mut inner, key, entry, now);
        Ok(true)
    }

    fn entry(&self, value: &[u8], ttl: Option<Duration>, now: Instant) -> CacheResult<CacheEntry> {
        if value.len() > self.max_value_size {
            return Err(CacheError::ValueTooLarge {
                size: value.len(),
                max: self.max_value_size,
            });
        }

        Ok(CacheEntry {
            value: value.to_vec(),
            inserted_at: now,
            last_accessed_at: now,
            ttl: ttl.or(self.default_ttl),
        })
    }

    /// Replacing a key removes it first, so under FIFO the new value queues
    /// as the newest insertion
    fn insert(&self, inner: &mut Inner, key: &CacheKey, entry: CacheEntry, now: Instant) {
        if inner.remove(key).is_none() {
            while inner.entries.len() >= self.max_entries {
                if !inner.evict_one(self.policy, now) {
                    break;
                }
            }
        }

        inner.size_bytes += entry.value.len();
        inner.entries.put(key.clone(), entry);
        inner.stats.sets += 1;
    }

    /// Sweep expired entries at an explicit instant
    pub fn purge_expired_at(&self, now: Instant) -> u64 {
        self.inner.lock().purge_expired(now)
    }

    fn metadata_at(&self, key: &CacheKey, now: Instant) -> Option<CacheEntryMeta> {
        let inner = self.inner.lock();
        let entry = inner.entries.peek(key)?;
        if entry.is_expired_at(now) {
            return None;
        }
        Some(CacheEntryMeta {
            size_bytes: entry.value.len(),
            ttl_remaining: entry.expires_at().map(|exp| exp.saturating_duration_since(now)),
            age: now.saturating_duration_since(entry.inserted_at),
            idle: now.saturating_duration_since(entry.last_accessed_at),
        })
    }
}

#[async_trait]
impl CacheProvider for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.get_at(key, Instant::now()))
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.set_at(key, value, ttl, Instant::now())
    }

    async fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    async fn set_if_generation(
        &self,
        key: &CacheKey,
        value: &[u8],
        ttl: Option<Duration>,
        generation: u64,
    ) -> CacheResult<bool> {
        self.set_if_generation_at(key, value, ttl, generation, Instant::now())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let mut inner = self.inner.lock();
        let removed = inner.remove(key).is_some();
        if removed {
            inner.stats.deletes += 1;
        }
        Ok(removed)
    }

    async fn metadata(&self, key: &CacheKey) -> CacheResult<Option<CacheEntryMeta>> {
        Ok(self.metadata_at(key, Instant::now()))
    }

    async fn invalidate(&self, scope: &InvalidationScope) -> CacheResult<u64> {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        let removed = if matches!(scope, InvalidationScope::All) {
            let count = inner.entries.len() as u64;
            inner.entries.clear();
            inner.size_bytes = 0;
            count
        } else {
            inner.remove_where(|key, _| scope.matches(key))
        };
        inner.stats.invalidations += removed;
        Ok(removed)
    }

    async fn purge_expired(&self) -> CacheResult<u64> {
        Ok(self.purge_expired_at(Instant::now()))
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.entries.clear();
        inner.size_bytes = 0;
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let stats = &inner.stats;
        CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            sets: stats.sets,
            deletes: stats.deletes,
            evictions: stats.evictions,
            expirations: stats.expirations,
            invalidations: stats.invalidations,
            entry_count: inner.entries.len() as u64,
            size_bytes: inner.size_bytes as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn key(n: usize) -> CacheKey {
        CacheKey::query_result("SELECT * FROM t WHERE id = ?", &[json!(n)], Some("app"), &["t".into()])
    }

    fn db_key(database: &str, table: &str) -> CacheKey {
        CacheKey::query_result(
            &format!("SELECT * FROM {table}"),
            &[],
            Some(database),
            &[table.to_string()],
        )
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = InMemoryCache::new(10);
        cache.set(&key(1), b"test value", None).await.unwrap();

        let result = cache.get(&key(1)).await.unwrap();
        assert_eq!(result, Some(b"test value".to_vec()));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let cache = InMemoryCache::new(10);
        assert!(cache.get(&key(1)).await.unwrap().is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = InMemoryCache::new(2);
        cache.set(&key(1), b"a", None).await.unwrap();
        cache.set(&key(2), b"b", None).await.unwrap();
        cache.set(&key(1), b"c", None).await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.size_bytes, 2);
        assert_eq!(cache.get(&key(1)).await.unwrap(), Some(b"c".to_vec()));
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = InMemoryCache::new(10).with_default_ttl(Duration::from_secs(60));
        let start = Instant::now();
        cache.set_at(&key(1), b"value", None, start).unwrap();

        assert!(cache.get_at(&key(1), start + Duration::from_secs(59)).is_some());
        assert!(cache.get_at(&key(1), start + Duration::from_secs(60)).is_none());
        assert_eq!(cache.inner.lock().entries.len(), 0);
        assert_eq!(cache.inner.lock().stats.expirations, 1);
    }

    #[test]
    fn test_explicit_ttl_overrides_default() {
        let cache = InMemoryCache::new(10).with_default_ttl(Duration::from_secs(60));
        let start = Instant::now();
        cache
            .set_at(&key(1), b"value", Some(Duration::from_secs(5)), start)
            .unwrap();
        assert!(cache.get_at(&key(1), start + Duration::from_secs(6)).is_none());
    }

    #[test]
    fn test_lru_evicts_untouched_key() {
        let cache = InMemoryCache::new(3);
        let start = Instant::now();

        cache.set_at(&key(0), b"0", None, start).unwrap();
        for n in 1..=3 {
            // touch every key except key(1) between insertions
            for k in (0..n).filter(|k| *k != 1) {
                cache.get_at(&key(k), start);
            }
            cache.set_at(&key(n), b"n", None, start).unwrap();
        }

        assert!(cache.get_at(&key(1), start).is_none());
        assert!(cache.get_at(&key(0), start).is_some());
        assert!(cache.get_at(&key(2), start).is_some());
        assert!(cache.get_at(&key(3), start).is_some());
        assert_eq!(cache.inner.lock().stats.evictions, 1);
    }

    #[test]
    fn test_fifo_ignores_access() {
        let cache = InMemoryCache::new(2).with_eviction_policy(EvictionPolicy::Fifo);
        let start = Instant::now();

        cache.set_at(&key(1), b"1", None, start).unwrap();
        cache.set_at(&key(2), b"2", None, start).unwrap();
        cache.get_at(&key(1), start);
        cache.set_at(&key(3), b"3", None, start).unwrap();

        assert!(cache.get_at(&key(1), start).is_none());
        assert!(cache.get_at(&key(2), start).is_some());
        assert!(cache.get_at(&key(3), start).is_some());
    }

    #[test]
    fn test_fifo_overwrite_requeues_key() {
        let cache = InMemoryCache::new(2).with_eviction_policy(EvictionPolicy::Fifo);
        let start = Instant::now();

        cache.set_at(&key(1), b"1", None, start).unwrap();
        cache.set_at(&key(2), b"2", None, start).unwrap();
        cache.set_at(&key(1), b"1b", None, start).unwrap();
        cache.set_at(&key(3), b"3", None, start).unwrap();

        assert!(cache.get_at(&key(2), start).is_none());
        assert_eq!(cache.get_at(&key(1), start), Some(b"1b".to_vec()));
    }

    #[test]
    fn test_ttl_policy_evicts_expired_first() {
        let cache = InMemoryCache::new(3).with_eviction_policy(EvictionPolicy::Ttl);
        let start = Instant::now();

        cache.set_at(&key(1), b"1", Some(Duration::from_secs(100)), start).unwrap();
        cache.set_at(&key(2), b"2", Some(Duration::from_secs(5)), start).unwrap();
        cache.set_at(&key(3), b"3", Some(Duration::from_secs(5)), start).unwrap();

        let later = start + Duration::from_secs(10);
        cache.set_at(&key(4), b"4", Some(Duration::from_secs(100)), later).unwrap();

        let inner = cache.inner.lock();
        assert_eq!(inner.entries.len(), 2);
        assert_eq!(inner.stats.expirations, 2);
        assert_eq!(inner.stats.evictions, 0);
    }

    #[test]
    fn test_ttl_policy_evicts_soonest_to_expire() {
        let cache = InMemoryCache::new(2).with_eviction_policy(EvictionPolicy::Ttl);
        let start = Instant::now();

        cache.set_at(&key(1), b"1", None, start).unwrap();
        cache.set_at(&key(2), b"2", Some(Duration::from_secs(30)), start).unwrap();
        cache.set_at(&key(3), b"3", Some(Duration::from_secs(60)), start).unwrap();

        assert!(cache.get_at(&key(1), start).is_some());
        assert!(cache.get_at(&key(2), start).is_none());
        assert!(cache.get_at(&key(3), start).is_some());
    }

    #[test]
    fn test_capacity_never_exceeded() {
        for policy in [EvictionPolicy::Lru, EvictionPolicy::Ttl, EvictionPolicy::Fifo] {
            let cache = InMemoryCache::new(5)
                .with_eviction_policy(policy)
                .with_default_ttl(Duration::from_secs(60));
            let start = Instant::now();
            for n in 0..50 {
                cache.set_at(&key(n), b"v", None, start).unwrap();
                assert!(cache.inner.lock().entries.len() <= 5, "{policy:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_value_too_large() {
        let cache = InMemoryCache::new(10).with_max_value_size(100);

        cache.set(&key(1), &[0u8; 50], None).await.unwrap();
        let result = cache.set(&key(2), &[0u8; 200], None).await;
        assert!(matches!(
            result,
            Err(CacheError::ValueTooLarge { size: 200, max: 100 })
        ));
        assert!(cache.get(&key(2)).await.unwrap().is_none());
    }

    #[test]
    fn test_purge_expired() {
        let cache = InMemoryCache::new(10).with_default_ttl(Duration::from_secs(10));
        let start = Instant::now();
        cache.set_at(&key(1), b"1", None, start).unwrap();
        cache.set_at(&key(2), b"2", None, start + Duration::from_secs(5)).unwrap();

        assert_eq!(cache.purge_expired_at(start + Duration::from_secs(12)), 1);
        assert_eq!(cache.purge_expired_at(start + Duration::from_secs(12)), 0);
        assert_eq!(cache.purge_expired_at(start + Duration::from_secs(20)), 1);
        assert_eq!(cache.inner.lock().size_bytes, 0);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = InMemoryCache::new(10);
        cache.set(&db_key("a", "users"), b"1", None).await.unwrap();
        cache.set(&db_key("b", "orders"), b"2", None).await.unwrap();

        assert_eq!(cache.invalidate(&InvalidationScope::All).await.unwrap(), 2);
        let stats = cache.stats().await;
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.size_bytes, 0);
        assert_eq!(stats.invalidations, 2);
    }

    #[tokio::test]
    async fn test_invalidate_database_leaves_other_database() {
        let cache = InMemoryCache::new(10);
        cache.set(&db_key("a", "users"), b"1", None).await.unwrap();
        cache.set(&db_key("b", "users"), b"2", None).await.unwrap();

        let removed = cache
            .invalidate(&InvalidationScope::Database(Some("a".into())))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get(&db_key("a", "users")).await.unwrap().is_none());
        assert!(cache.get(&db_key("b", "users")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_tables() {
        let cache = InMemoryCache::new(10);
        cache.set(&db_key("a", "users"), b"1", None).await.unwrap();
        cache.set(&db_key("a", "orders"), b"2", None).await.unwrap();

        let removed = cache
            .invalidate(&InvalidationScope::Tables(vec!["users".into()]))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get(&db_key("a", "orders")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = InMemoryCache::new(10);
        cache.set(&key(1), b"1", None).await.unwrap();
        cache.set(&key(2), b"2", None).await.unwrap();

        assert!(cache.delete(&key(1)).await.unwrap());
        assert!(!cache.delete(&key(1)).await.unwrap());

        cache.clear().await.unwrap();
        let stats = cache.stats().await;
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.deletes, 1);
    }

    #[test]
    fn test_metadata() {
        let cache = InMemoryCache::new(10).with_default_ttl(Duration::from_secs(60));
        let start = Instant::now();
        cache.set_at(&key(1), b"12345", None, start).unwrap();

        let meta = cache.metadata_at(&key(1), start + Duration::from_secs(10)).unwrap();
        assert_eq!(meta.size_bytes, 5);
        assert_eq!(meta.ttl_remaining, Some(Duration::from_secs(50)));
        assert_eq!(meta.age, Duration::from_secs(10));

        assert!(cache.metadata_at(&key(1), start + Duration::from_secs(61)).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache = Arc::new(InMemoryCache::new(50));
        let mut handles = Vec::new();

        for n in 0..10 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..20 {
                    let k = key(n * 100 + i);
                    cache.set(&k, b"v", None).await.unwrap();
                    cache.get(&k).await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let stats = cache.stats().await;
        assert_eq!(stats.sets, 200);
        assert!(stats.entry_count <= 50);
        assert_eq!(stats.evictions, 150);
    }

    #[tokio::test]
    async fn test_set_if_generation_skips_after_invalidation() {
        let cache = InMemoryCache::new(10);
        let generation = cache.generation().await;

        assert!(cache.set_if_generation(&key(1), b"fresh", None, generation).await.unwrap());

        cache
            .invalidate(&InvalidationScope::Tables(vec!["other".into()]))
            .await
            .unwrap();
        assert!(!cache.set_if_generation(&key(2), b"stale", None, generation).await.unwrap());
        assert!(cache.get(&key(2)).await.unwrap().is_none());

        let current = cache.generation().await;
        assert!(cache.set_if_generation(&key(2), b"fresh", None, current).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_advances_generation() {
        let cache = InMemoryCache::new(10);
        let before = cache.generation().await;
        cache.clear().await.unwrap();
        assert_eq!(cache.generation().await, before + 1);
    }
}

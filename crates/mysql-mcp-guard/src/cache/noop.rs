//! No-op cache implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheResult;
use super::key::CacheKey;
use super::provider::{CacheEntryMeta, CacheProvider, CacheStats, InvalidationScope};

/// No-op cache implementation that never stores
///
/// Used when caching is disabled.
#[derive(Debug, Clone, Default)]
pub struct NoopCache {
    misses: Arc<AtomicU64>,
}

impl NoopCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheProvider for NoopCache {
    async fn get(&self, _key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _value: &[u8], _ttl: Option<Duration>) -> CacheResult<()> {
        Ok(())
    }

    async fn generation(&self) -> u64 {
        0
    }

    async fn set_if_generation(
        &self,
        _key: &CacheKey,
        _value: &[u8],
        _ttl: Option<Duration>,
        _generation: u64,
    ) -> CacheResult<bool> {
        Ok(false)
    }

    async fn delete(&self, _key: &CacheKey) -> CacheResult<bool> {
        Ok(false)
    }

    async fn metadata(&self, _key: &CacheKey) -> CacheResult<Option<CacheEntryMeta>> {
        Ok(None)
    }

    async fn invalidate(&self, _scope: &InvalidationScope) -> CacheResult<u64> {
        Ok(0)
    }

    async fn purge_expired(&self) -> CacheResult<u64> {
        Ok(0)
    }

    async fn clear(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            misses: self.misses.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::query_result("SELECT 1", &[], None, &[])
    }

    #[tokio::test]
    async fn test_noop_never_stores() {
        let cache = NoopCache::new();
        cache.set(&key(), b"value", None).await.unwrap();

        assert!(cache.get(&key()).await.unwrap().is_none());
        assert!(cache.metadata(&key()).await.unwrap().is_none());
        assert!(!cache.delete(&key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_noop_counts_misses() {
        let cache = NoopCache::new();
        cache.get(&key()).await.unwrap();
        cache.get(&key()).await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.entry_count, 0);
    }

    #[tokio::test]
    async fn test_noop_maintenance_operations() {
        let cache = NoopCache::new();
        assert_eq!(cache.invalidate(&InvalidationScope::All).await.unwrap(), 0);
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
        cache.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_noop_clone_shares_stats() {
        let cache = NoopCache::new();
        let clone = cache.clone();
        clone.get(&key()).await.unwrap();
        assert_eq!(cache.stats().await.misses, 1);
    }
}

//! Traced cache wrapper for observability

use std::time::Duration;

use async_trait::async_trait;
use tracing::Instrument;

use super::error::CacheResult;
use super::key::CacheKey;
use super::provider::{CacheEntryMeta, CacheProvider, CacheStats, InvalidationScope};

/// Wrapper that adds tracing to any `CacheProvider`
///
/// Uses debug-level spans. Keys are logged by fingerprint only, never by
/// SQL text or parameter values.
pub struct TracedCache<C> {
    inner: C,
    service_name: String,
}

impl<C: std::fmt::Debug> std::fmt::Debug for TracedCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedCache")
            .field("inner", &self.inner)
            .field("service_name", &self.service_name)
            .finish()
    }
}

impl<C: Clone> Clone for TracedCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            service_name: self.service_name.clone(),
        }
    }
}

impl<C> TracedCache<C> {
    pub fn new(cache: C, service_name: impl Into<String>) -> Self {
        Self {
            inner: cache,
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl<C: CacheProvider> CacheProvider for TracedCache<C> {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let span = tracing::debug_span!(
            "cache.get",
            service = %self.service_name,
            cache.key = %key,
            cache.database = key.database(),
        );

        let result = self.inner.get(key).instrument(span).await;

        match &result {
            Ok(Some(data)) => {
                tracing::debug!(
                    cache.result = "hit",
                    cache.key = %key,
                    cache.size_bytes = data.len(),
                );
            }
            Ok(None) => {
                tracing::debug!(cache.result = "miss", cache.key = %key);
            }
            Err(e) => {
                tracing::warn!(cache.result = "error", cache.key = %key, error = %e);
            }
        }

        result
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let span = tracing::debug_span!(
            "cache.set",
            service = %self.service_name,
            cache.key = %key,
            cache.database = key.database(),
            cache.value_size = value.len(),
            cache.ttl_ms = ttl.map(|d| d.as_millis() as u64),
        );

        let result = self.inner.set(key, value, ttl).instrument(span).await;

        if let Err(ref e) = result {
            tracing::warn!(
                cache.operation = "set",
                cache.key = %key,
                error = %e,
            );
        }

        result
    }

    async fn generation(&self) -> u64 {
        self.inner.generation().await
    }

    async fn set_if_generation(
        &self,
        key: &CacheKey,
        value: &[u8],
        ttl: Option<Duration>,
        generation: u64,
    ) -> CacheResult<bool> {
        let span = tracing::debug_span!(
            "cache.set",
            service = %self.service_name,
            cache.key = %key,
            cache.database = key.database(),
            cache.value_size = value.len(),
            cache.generation = generation,
        );

        let result = self
            .inner
            .set_if_generation(key, value, ttl, generation)
            .instrument(span)
            .await;

        match &result {
            Ok(false) => {
                tracing::debug!(
                    cache.operation = "set",
                    cache.key = %key,
                    "Skipped store, cache invalidated during execution"
                );
            }
            Ok(true) => {}
            Err(e) => {
                tracing::warn!(
                    cache.operation = "set",
                    cache.key = %key,
                    error = %e,
                );
            }
        }

        result
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let span = tracing::debug_span!(
            "cache.delete",
            service = %self.service_name,
            cache.key = %key,
        );

        let result = self.inner.delete(key).instrument(span).await;

        match &result {
            Ok(deleted) => {
                tracing::debug!(
                    cache.operation = "delete",
                    cache.key = %key,
                    cache.deleted = deleted,
                );
            }
            Err(e) => {
                tracing::warn!(
                    cache.operation = "delete",
                    cache.key = %key,
                    error = %e,
                );
            }
        }

        result
    }

    async fn metadata(&self, key: &CacheKey) -> CacheResult<Option<CacheEntryMeta>> {
        let span = tracing::debug_span!(
            "cache.metadata",
            service = %self.service_name,
            cache.key = %key,
        );

        self.inner.metadata(key).instrument(span).await
    }

    async fn invalidate(&self, scope: &InvalidationScope) -> CacheResult<u64> {
        let span = tracing::debug_span!(
            "cache.invalidate",
            service = %self.service_name,
            cache.scope = ?scope,
        );

        let result = self.inner.invalidate(scope).instrument(span).await;

        match &result {
            Ok(count) => {
                tracing::info!(
                    cache.operation = "invalidate",
                    cache.scope = ?scope,
                    cache.removed = count,
                    "Cache invalidated"
                );
            }
            Err(e) => {
                tracing::warn!(
                    cache.operation = "invalidate",
                    cache.scope = ?scope,
                    error = %e,
                );
            }
        }

        result
    }

    async fn purge_expired(&self) -> CacheResult<u64> {
        let span = tracing::debug_span!("cache.purge_expired", service = %self.service_name);

        let result = self.inner.purge_expired().instrument(span).await;

        match &result {
            Ok(count) => {
                tracing::debug!(cache.operation = "purge_expired", cache.removed = count);
            }
            Err(e) => {
                tracing::warn!(cache.operation = "purge_expired", error = %e);
            }
        }

        result
    }

    async fn clear(&self) -> CacheResult<()> {
        let span = tracing::debug_span!("cache.clear", service = %self.service_name);

        let result = self.inner.clear().instrument(span).await;

        if let Err(ref e) = result {
            tracing::warn!(cache.operation = "clear", error = %e);
        } else {
            tracing::debug!(cache.operation = "clear");
        }

        result
    }

    async fn stats(&self) -> CacheStats {
        self.inner.stats().await
    }
}

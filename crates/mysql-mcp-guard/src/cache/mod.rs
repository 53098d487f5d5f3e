//! Query result cache
//!
//! Provides pluggable cache backends with a unified async interface.
//!
//! # Available Backends
//!
//! - [`NoopCache`] - No-op implementation (caching disabled)
//! - [`InMemoryCache`] - Bounded in-memory cache with TTL and LRU/TTL/FIFO eviction
//!
//! # Observability
//!
//! Wrap any cache with [`TracedCache`] to add tracing spans and logging.
//!
//! # Eligibility
//!
//! Only deterministic reads are cached: `SELECT` statements without volatile
//! functions (`NOW()`, `RAND()`, `UUID()`, ...), session variables, locking
//! clauses, `INTO` targets, or `SQL_NO_CACHE`. See
//! [`Statement::is_cacheable`](crate::security::Statement::is_cacheable).
//!
//! # Invalidation
//!
//! After a successful write, [`InvalidationMode`] decides what is cleared:
//! the whole cache, the written database, or entries referencing the written
//! tables. Table extraction is heuristic and errs toward clearing more.

mod config;
mod error;
mod key;
mod memory;
mod noop;
mod provider;
mod traced;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use config::{CacheConfig, DEFAULT_MAX_VALUE_SIZE, EvictionPolicy, InvalidationMode};
pub use error::{CacheError, CacheResult};
pub use key::CacheKey;
pub use memory::InMemoryCache;
pub use noop::NoopCache;
pub use provider::{CacheEntryMeta, CacheProvider, CacheStats, InvalidationScope};
pub use traced::TracedCache;

/// Create a cache provider based on configuration
#[must_use]
pub fn create_cache(config: &CacheConfig) -> Arc<dyn CacheProvider> {
    if !config.enabled {
        return Arc::new(NoopCache::new());
    }

    let cache = InMemoryCache::new(config.max_entries)
        .with_eviction_policy(config.eviction_policy)
        .with_default_ttl(config.ttl)
        .with_max_value_size(config.max_value_size);

    Arc::new(TracedCache::new(cache, env!("CARGO_PKG_NAME")))
}

/// Read and decode a cached value.
///
/// Lookup failures are misses. An entry that fails to decode is deleted so
/// the next lookup repopulates it.
pub async fn fetch_cached<T: DeserializeOwned>(
    cache: &dyn CacheProvider,
    key: &CacheKey,
) -> Option<T> {
    let data = match cache.get(key).await {
        Ok(Some(data)) => data,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(cache.key = %key, error = %e, "Cache get failed, treating as miss");
            return None;
        }
    };

    match serde_json::from_slice::<T>(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            let err = CacheError::Deserialization(e.to_string());
            tracing::warn!(cache.key = %key, error = %err, "Dropping corrupt cache entry");
            if let Err(e) = cache.delete(key).await {
                tracing::warn!(cache.key = %key, error = %e, "Failed to delete corrupt cache entry");
            }
            None
        }
    }
}

/// Encode and store a value. Failures are logged, never propagated.
pub async fn store_cached<T: Serialize>(
    cache: &dyn CacheProvider,
    key: &CacheKey,
    value: &T,
    ttl: Option<Duration>,
) -> bool {
    let Some(data) = encode(key, value) else {
        return false;
    };

    match cache.set(key, &data, ttl).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(cache.key = %key, error = %e, "Failed to store value in cache");
            false
        }
    }
}

/// Like [`store_cached`], but skipped when the cache was invalidated after
/// `generation` was read from [`CacheProvider::generation`]
pub async fn store_cached_since<T: Serialize>(
    cache: &dyn CacheProvider,
    key: &CacheKey,
    value: &T,
    ttl: Option<Duration>,
    generation: u64,
) -> bool {
    let Some(data) = encode(key, value) else {
        return false;
    };

    match cache.set_if_generation(key, &data, ttl, generation).await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!(cache.key = %key, error = %e, "Failed to store value in cache");
            false
        }
    }
}

fn encode<T: Serialize>(key: &CacheKey, value: &T) -> Option<Vec<u8>> {
    match serde_json::to_vec(value) {
        Ok(data) => Some(data),
        Err(e) => {
            let err = CacheError::Serialization(e.to_string());
            tracing::warn!(cache.key = %key, error = %err, "Failed to serialize value for cache");
            None
        }
    }
}

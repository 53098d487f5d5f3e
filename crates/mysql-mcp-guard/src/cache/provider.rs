//! Cache provider trait definition

use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheResult;
use super::key::CacheKey;

/// Cache entry metadata for observability
#[derive(Debug, Clone)]
pub struct CacheEntryMeta {
    pub size_bytes: usize,
    /// Time-to-live remaining
    pub ttl_remaining: Option<Duration>,
    /// Time since insertion
    pub age: Duration,
    /// Time since last hit or insertion
    pub idle: Duration,
}

/// Cache statistics for metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries removed to make room
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Entries removed by write invalidation
    pub invalidations: u64,
    pub entry_count: u64,
    pub size_bytes: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Entries removed by an invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationScope {
    All,
    /// Entries of one database. `None` on either side matches, since the
    /// connection default is unknown here.
    Database(Option<String>),
    /// Entries referencing any of these lowercased table names, in any database.
    /// Entries with no known tables always match.
    Tables(Vec<String>),
}

impl InvalidationScope {
    #[must_use]
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            Self::All => true,
            Self::Database(database) => match (database.as_deref(), key.database()) {
                (Some(written), Some(cached)) => written == cached,
                _ => true,
            },
            Self::Tables(tables) => {
                key.tables().is_empty() || key.tables().iter().any(|t| tables.contains(t))
            }
        }
    }
}

/// Async cache provider trait
///
/// All operations are async so the pipeline does not depend on where
/// entries are stored.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Get a value from cache by key
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value in cache, `None` uses the provider's default TTL
    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Invalidation counter, advanced by every [`Self::invalidate`] and [`Self::clear`]
    async fn generation(&self) -> u64;

    /// Set a value only if no invalidation ran since `generation` was read.
    ///
    /// Returns whether the value was stored. A result computed before a write
    /// committed must not outlive that write's invalidation.
    async fn set_if_generation(
        &self,
        key: &CacheKey,
        value: &[u8],
        ttl: Option<Duration>,
        generation: u64,
    ) -> CacheResult<bool>;

    /// Delete a key from cache
    async fn delete(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Get entry metadata without retrieving value
    async fn metadata(&self, key: &CacheKey) -> CacheResult<Option<CacheEntryMeta>>;

    /// Remove entries in scope, returning how many were removed
    async fn invalidate(&self, scope: &InvalidationScope) -> CacheResult<u64>;

    /// Remove every expired entry, returning how many were removed
    async fn purge_expired(&self) -> CacheResult<u64>;

    /// Clear entire cache
    async fn clear(&self) -> CacheResult<()>;

    /// Get cache statistics for observability
    async fn stats(&self) -> CacheStats;
}

//! Cache configuration types

use std::str::FromStr;
use std::time::Duration;

use super::provider::InvalidationScope;
use crate::Error;

/// Default maximum value size: 1MB
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1_048_576;

/// Victim selection when the cache is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Least recently accessed
    #[default]
    Lru,
    /// Expired entries first, else soonest to expire
    Ttl,
    /// Oldest inserted. Overwriting a key counts as a new insertion.
    Fifo,
}

impl EvictionPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Ttl => "ttl",
            Self::Fifo => "fifo",
        }
    }
}

impl FromStr for EvictionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "ttl" => Ok(Self::Ttl),
            "fifo" => Ok(Self::Fifo),
            _ => Err(Error::Config(format!(
                "Invalid cache eviction policy: {s}. Use 'lru', 'ttl', or 'fifo'"
            ))),
        }
    }
}

/// What a successful write clears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationMode {
    /// Whole cache
    Aggressive,
    /// Entries of the written database
    #[default]
    Conservative,
    /// Entries referencing the written tables
    Targeted,
}

impl InvalidationMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::Conservative => "conservative",
            Self::Targeted => "targeted",
        }
    }

    /// Scope cleared by a write to `tables` in `database`.
    ///
    /// A targeted write with no extractable tables clears everything.
    #[must_use]
    pub fn scope(&self, database: Option<&str>, tables: &[String]) -> InvalidationScope {
        match self {
            Self::Aggressive => InvalidationScope::All,
            Self::Conservative => InvalidationScope::Database(database.map(ToString::to_string)),
            Self::Targeted if tables.is_empty() => InvalidationScope::All,
            Self::Targeted => InvalidationScope::Tables(tables.to_vec()),
        }
    }
}

impl FromStr for InvalidationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aggressive" => Ok(Self::Aggressive),
            "conservative" => Ok(Self::Conservative),
            "targeted" => Ok(Self::Targeted),
            _ => Err(Error::Config(format!(
                "Invalid cache invalidation mode: {s}. Use 'aggressive', 'conservative', or 'targeted'"
            ))),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,
    /// Maximum number of entries
    pub max_entries: usize,
    /// TTL applied to every entry
    pub ttl: Duration,
    pub eviction_policy: EvictionPolicy,
    pub invalidation_mode: InvalidationMode,
    /// Maximum size of a single cached value in bytes (default: 1MB)
    pub max_value_size: usize,
    /// Interval of the background expiry sweep
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            ttl: Duration::from_secs(60),
            eviction_policy: EvictionPolicy::Lru,
            invalidation_mode: InvalidationMode::Conservative,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            cleanup_interval: Duration::from_secs(30),
        }
    }

    /// The cleanup interval also paces rate limiter pruning, so it is checked
    /// even when caching is disabled.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cleanup_interval.is_zero() {
            return Err(Error::Config("cache cleanup interval must be non-zero".into()));
        }
        if !self.enabled {
            return Ok(());
        }
        if self.max_entries == 0 {
            return Err(Error::Config("cache max_entries must be at least 1".into()));
        }
        if self.ttl.is_zero() {
            return Err(Error::Config("cache ttl must be non-zero".into()));
        }
        Ok(())
    }
}

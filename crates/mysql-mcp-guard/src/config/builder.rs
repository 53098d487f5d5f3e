//! Configuration builder

use std::time::Duration;

use crate::Error;
use crate::cache::{CacheConfig, EvictionPolicy, InvalidationMode};
use crate::rate_limit::{RateLimitAlgorithm, RateLimitConfig};
use crate::security::{FilterMode, FilterPolicy, TableFilter, WritePermissions};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Master switch for the pattern matcher and query filter
    pub security_enabled: bool,
    pub filter_policy: FilterPolicy,
    pub query_timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub const fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    #[must_use]
    pub const fn security_enabled(&self) -> bool {
        self.security_enabled
    }

    #[must_use]
    pub const fn filter_policy(&self) -> &FilterPolicy {
        &self.filter_policy
    }

    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    #[must_use]
    pub const fn rate_limit(&self) -> &RateLimitConfig {
        &self.rate_limit
    }

    #[must_use]
    pub const fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryConfig {
        &self.telemetry
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    pub json_logs: bool,
}

/// Configuration builder with fluent API
#[derive(Debug)]
pub struct ConfigBuilder {
    security_enabled: bool,
    filter_mode: Option<FilterMode>,
    tables: Option<TableFilter>,
    writes: WritePermissions,
    query_timeout: Duration,
    rate_limit: RateLimitConfig,
    cache: CacheConfig,
    telemetry: TelemetryConfig,
}

impl ConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            security_enabled: true,
            filter_mode: None,
            tables: None,
            writes: WritePermissions::none(),
            query_timeout: Duration::from_secs(30),
            rate_limit: RateLimitConfig::new(),
            cache: CacheConfig::new(),
            telemetry: TelemetryConfig {
                service_name: String::new(),
                log_level: String::new(),
                json_logs: false,
            },
        }
    }

    /// Enable the pattern matcher and query filter (enabled by default)
    #[must_use]
    pub const fn security_enabled(mut self, enabled: bool) -> Self {
        self.security_enabled = enabled;
        self
    }

    #[must_use]
    pub fn filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = Some(mode);
        self
    }

    /// Table allow and deny lists, applied in every filter mode
    #[must_use]
    pub fn table_filter(mut self, tables: TableFilter) -> Self {
        self.tables = Some(tables);
        self
    }

    #[must_use]
    pub const fn write_permissions(mut self, writes: WritePermissions) -> Self {
        self.writes = writes;
        self
    }

    #[must_use]
    pub const fn allow_insert(mut self, allow: bool) -> Self {
        self.writes.insert = allow;
        self
    }

    #[must_use]
    pub const fn allow_update(mut self, allow: bool) -> Self {
        self.writes.update = allow;
        self
    }

    #[must_use]
    pub const fn allow_delete(mut self, allow: bool) -> Self {
        self.writes.delete = allow;
        self
    }

    #[must_use]
    pub const fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    // Rate limiter configuration methods

    #[must_use]
    pub const fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Enable rate limiting (enabled by default)
    #[must_use]
    pub const fn rate_limit_enabled(mut self, enabled: bool) -> Self {
        self.rate_limit.enabled = enabled;
        self
    }

    /// Per-client limit on queries executing at once, 0 for no limit
    #[must_use]
    pub const fn max_concurrent_queries(mut self, max: u32) -> Self {
        self.rate_limit.max_concurrent_queries = max;
        self
    }

    #[must_use]
    pub const fn rate_limit_algorithm(mut self, algorithm: RateLimitAlgorithm) -> Self {
        self.rate_limit.algorithm = algorithm;
        self
    }

    #[must_use]
    pub const fn requests_per_minute(mut self, rpm: u32) -> Self {
        self.rate_limit.requests_per_minute = rpm;
        self
    }

    /// Set token bucket capacity
    #[must_use]
    pub const fn burst_size(mut self, burst: u32) -> Self {
        self.rate_limit.burst_size = burst;
        self
    }

    /// Set window length for sliding and fixed windows
    #[must_use]
    pub const fn rate_limit_window(mut self, window: Duration) -> Self {
        self.rate_limit.window = window;
        self
    }

    /// Set how long an idle client's limiter state is kept
    #[must_use]
    pub const fn idle_client_ttl(mut self, ttl: Duration) -> Self {
        self.rate_limit.idle_client_ttl = ttl;
        self
    }

    // Cache configuration methods

    #[must_use]
    pub const fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Enable result caching (enabled by default)
    #[must_use]
    pub const fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache.enabled = enabled;
        self
    }

    #[must_use]
    pub const fn cache_max_entries(mut self, max: usize) -> Self {
        self.cache.max_entries = max;
        self
    }

    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    #[must_use]
    pub const fn cache_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.cache.eviction_policy = policy;
        self
    }

    #[must_use]
    pub const fn cache_invalidation_mode(mut self, mode: InvalidationMode) -> Self {
        self.cache.invalidation_mode = mode;
        self
    }

    /// Set maximum value size for cache entries (default: 1MB)
    #[must_use]
    pub const fn cache_max_value_size(mut self, max: usize) -> Self {
        self.cache.max_value_size = max;
        self
    }

    /// Set the interval of the background expiry sweep
    #[must_use]
    pub const fn cache_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cache.cleanup_interval = interval;
        self
    }

    // Telemetry configuration methods

    #[must_use]
    pub fn service_name(mut self, name: String) -> Self {
        self.telemetry.service_name = name;
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: String) -> Self {
        self.telemetry.log_level = level;
        self
    }

    #[must_use]
    pub const fn json_logs(mut self, enabled: bool) -> Self {
        self.telemetry.json_logs = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> crate::Result<Config> {
        if self.query_timeout.is_zero() {
            return Err(Error::Config("query_timeout must be non-zero".into()));
        }
        self.rate_limit.validate()?;
        self.cache.validate()?;

        let service_name = if self.telemetry.service_name.is_empty() {
            env!("CARGO_PKG_NAME").to_string()
        } else {
            self.telemetry.service_name
        };

        let log_level = if self.telemetry.log_level.is_empty() {
            "info".to_string()
        } else {
            self.telemetry.log_level
        };

        Ok(Config {
            security_enabled: self.security_enabled,
            filter_policy: FilterPolicy::new(self.filter_mode.unwrap_or_default(), self.writes)
                .with_tables(self.tables.unwrap_or_default()),
            query_timeout: self.query_timeout,
            rate_limit: self.rate_limit,
            cache: self.cache,
            telemetry: TelemetryConfig {
                service_name,
                log_level,
                json_logs: self.telemetry.json_logs,
            },
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

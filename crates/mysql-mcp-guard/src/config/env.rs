//! Environment variable loading for configuration

use std::env;
use std::time::Duration;

use super::builder::ConfigBuilder;
use crate::Result;
use crate::security::{FilterMode, TableFilter};

/// Environment variable names
mod vars {
    pub const MYSQL_ENABLE_SECURITY: &str = "MYSQL_ENABLE_SECURITY";
    pub const MYSQL_ALLOW_INSERT: &str = "MYSQL_ALLOW_INSERT";
    pub const MYSQL_ALLOW_UPDATE: &str = "MYSQL_ALLOW_UPDATE";
    pub const MYSQL_ALLOW_DELETE: &str = "MYSQL_ALLOW_DELETE";
    pub const MYSQL_QUERY_TIMEOUT: &str = "MYSQL_QUERY_TIMEOUT";
    pub const MYSQL_FILTER_MODE: &str = "MYSQL_FILTER_MODE";
    pub const MYSQL_ALLOWED_STATEMENTS: &str = "MYSQL_ALLOWED_STATEMENTS";
    pub const MYSQL_DENIED_STATEMENTS: &str = "MYSQL_DENIED_STATEMENTS";
    pub const MYSQL_DENIED_PATTERNS: &str = "MYSQL_DENIED_PATTERNS";
    pub const MYSQL_ALLOWED_TABLES: &str = "MYSQL_ALLOWED_TABLES";
    pub const MYSQL_DENIED_TABLES: &str = "MYSQL_DENIED_TABLES";
    pub const MYSQL_ENABLE_RATE_LIMITING: &str = "MYSQL_ENABLE_RATE_LIMITING";
    pub const MYSQL_RATE_LIMIT_ALGORITHM: &str = "MYSQL_RATE_LIMIT_ALGORITHM";
    pub const MYSQL_RATE_LIMIT_RPM: &str = "MYSQL_RATE_LIMIT_RPM";
    pub const MYSQL_RATE_LIMIT_BURST: &str = "MYSQL_RATE_LIMIT_BURST";
    pub const MYSQL_MAX_CONCURRENT_QUERIES: &str = "MYSQL_MAX_CONCURRENT_QUERIES";
    pub const MYSQL_ENABLE_CACHE: &str = "MYSQL_ENABLE_CACHE";
    pub const MYSQL_CACHE_MAX_SIZE: &str = "MYSQL_CACHE_MAX_SIZE";
    pub const MYSQL_CACHE_TTL: &str = "MYSQL_CACHE_TTL";
    pub const MYSQL_CACHE_EVICTION_POLICY: &str = "MYSQL_CACHE_EVICTION_POLICY";
    pub const MYSQL_CACHE_INVALIDATION_MODE: &str = "MYSQL_CACHE_INVALIDATION_MODE";
    pub const MYSQL_CACHE_CLEANUP_INTERVAL: &str = "MYSQL_CACHE_CLEANUP_INTERVAL";
    pub const MYSQL_LOG_LEVEL: &str = "MYSQL_LOG_LEVEL";
    pub const MYSQL_JSON_LOGS: &str = "MYSQL_JSON_LOGS";
}

/// Separator for `MYSQL_DENIED_PATTERNS`; regexes may contain commas
const PATTERN_SEPARATOR: &str = ";;";

/// Load configuration from environment variables
pub fn load_from_env(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    // Security
    if let Ok(val) = env::var(vars::MYSQL_ENABLE_SECURITY) {
        builder = builder.security_enabled(parse_bool(&val));
    }

    if let Ok(val) = env::var(vars::MYSQL_ALLOW_INSERT) {
        builder = builder.allow_insert(parse_bool(&val));
    }

    if let Ok(val) = env::var(vars::MYSQL_ALLOW_UPDATE) {
        builder = builder.allow_update(parse_bool(&val));
    }

    if let Ok(val) = env::var(vars::MYSQL_ALLOW_DELETE) {
        builder = builder.allow_delete(parse_bool(&val));
    }

    if let Ok(timeout_str) = env::var(vars::MYSQL_QUERY_TIMEOUT)
        && let Ok(ms) = timeout_str.parse::<u64>()
    {
        builder = builder.query_timeout(Duration::from_millis(ms));
    }

    // Statement filter
    if let Ok(mode) = env::var(vars::MYSQL_FILTER_MODE) {
        let allowed = split_list(vars::MYSQL_ALLOWED_STATEMENTS, ",");
        let denied = split_list(vars::MYSQL_DENIED_STATEMENTS, ",");
        let patterns = split_list(vars::MYSQL_DENIED_PATTERNS, PATTERN_SEPARATOR);

        let filter = FilterMode::from_config(&mode, &allowed, &denied, &patterns)?;
        builder = builder.filter_mode(filter);
    }

    // Table lists
    let allowed_tables = split_list(vars::MYSQL_ALLOWED_TABLES, ",");
    let denied_tables = split_list(vars::MYSQL_DENIED_TABLES, ",");
    if !allowed_tables.is_empty() || !denied_tables.is_empty() {
        builder = builder.table_filter(TableFilter::new(&allowed_tables, &denied_tables));
    }

    // Rate limiting
    if let Ok(val) = env::var(vars::MYSQL_ENABLE_RATE_LIMITING) {
        builder = builder.rate_limit_enabled(parse_bool(&val));
    }

    if let Ok(algorithm) = env::var(vars::MYSQL_RATE_LIMIT_ALGORITHM) {
        builder = builder.rate_limit_algorithm(algorithm.parse()?);
    }

    if let Ok(rpm_str) = env::var(vars::MYSQL_RATE_LIMIT_RPM)
        && let Ok(rpm) = rpm_str.parse::<u32>()
    {
        builder = builder.requests_per_minute(rpm);
    }

    if let Ok(burst_str) = env::var(vars::MYSQL_RATE_LIMIT_BURST)
        && let Ok(burst) = burst_str.parse::<u32>()
    {
        builder = builder.burst_size(burst);
    }

    if let Ok(max_str) = env::var(vars::MYSQL_MAX_CONCURRENT_QUERIES)
        && let Ok(max) = max_str.parse::<u32>()
    {
        builder = builder.max_concurrent_queries(max);
    }

    // Cache
    if let Ok(val) = env::var(vars::MYSQL_ENABLE_CACHE) {
        builder = builder.cache_enabled(parse_bool(&val));
    }

    if let Ok(size_str) = env::var(vars::MYSQL_CACHE_MAX_SIZE)
        && let Ok(size) = size_str.parse::<usize>()
    {
        builder = builder.cache_max_entries(size);
    }

    if let Ok(ttl_str) = env::var(vars::MYSQL_CACHE_TTL)
        && let Ok(ms) = ttl_str.parse::<u64>()
    {
        builder = builder.cache_ttl(Duration::from_millis(ms));
    }

    if let Ok(policy) = env::var(vars::MYSQL_CACHE_EVICTION_POLICY) {
        builder = builder.cache_eviction_policy(policy.parse()?);
    }

    if let Ok(mode) = env::var(vars::MYSQL_CACHE_INVALIDATION_MODE) {
        builder = builder.cache_invalidation_mode(mode.parse()?);
    }

    if let Ok(interval_str) = env::var(vars::MYSQL_CACHE_CLEANUP_INTERVAL)
        && let Ok(secs) = interval_str.parse::<u64>()
    {
        builder = builder.cache_cleanup_interval(Duration::from_secs(secs));
    }

    // Telemetry
    if let Ok(level) = env::var(vars::MYSQL_LOG_LEVEL) {
        builder = builder.log_level(level);
    }

    if let Ok(val) = env::var(vars::MYSQL_JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&val));
    }

    Ok(builder)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn split_list(var: &str, separator: &str) -> Vec<String> {
    env::var(var)
        .map(|s| {
            s.split(separator)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

//! TOML configuration file loading

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::builder::ConfigBuilder;
use crate::Result;
use crate::security::{FilterMode, TableFilter};

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./mysql-mcp-guard.toml",
    "~/.config/mysql-mcp-guard/config.toml",
    "/etc/mysql-mcp-guard/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    builder = apply_file_config(builder, file_config)?;
    Ok(builder)
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> Result<ConfigBuilder> {
    // Security settings
    if let Some(sec) = config.security {
        if let Some(enabled) = sec.enabled {
            builder = builder.security_enabled(enabled);
        }

        if let Some(allow) = sec.allow_insert {
            builder = builder.allow_insert(allow);
        }

        if let Some(allow) = sec.allow_update {
            builder = builder.allow_update(allow);
        }

        if let Some(allow) = sec.allow_delete {
            builder = builder.allow_delete(allow);
        }

        if let Some(timeout) = sec.query_timeout_ms {
            builder = builder.query_timeout(Duration::from_millis(timeout));
        }

        if let Some(filter) = sec.filter {
            let mode = FilterMode::from_config(
                filter.mode.as_deref().unwrap_or("blacklist"),
                &filter.allowed_statements.unwrap_or_default(),
                &filter.denied_statements.unwrap_or_default(),
                &filter.denied_patterns.unwrap_or_default(),
            )?;
            builder = builder.filter_mode(mode);
        }

        if sec.allowed_tables.is_some() || sec.denied_tables.is_some() {
            builder = builder.table_filter(TableFilter::new(
                &sec.allowed_tables.unwrap_or_default(),
                &sec.denied_tables.unwrap_or_default(),
            ));
        }
    }

    // Rate limiter settings
    if let Some(rl) = config.rate_limit {
        if let Some(enabled) = rl.enabled {
            builder = builder.rate_limit_enabled(enabled);
        }

        if let Some(algorithm) = rl.algorithm {
            builder = builder.rate_limit_algorithm(algorithm.parse()?);
        }

        if let Some(rpm) = rl.requests_per_minute {
            builder = builder.requests_per_minute(rpm);
        }

        if let Some(burst) = rl.burst_size {
            builder = builder.burst_size(burst);
        }

        if let Some(secs) = rl.window_secs {
            builder = builder.rate_limit_window(Duration::from_secs(secs));
        }

        if let Some(secs) = rl.idle_client_ttl_secs {
            builder = builder.idle_client_ttl(Duration::from_secs(secs));
        }

        if let Some(max) = rl.max_concurrent_queries {
            builder = builder.max_concurrent_queries(max);
        }
    }

    // Cache settings
    if let Some(cache) = config.cache {
        if let Some(enabled) = cache.enabled {
            builder = builder.cache_enabled(enabled);
        }

        if let Some(max) = cache.max_entries {
            builder = builder.cache_max_entries(max);
        }

        if let Some(ttl) = cache.ttl_ms {
            builder = builder.cache_ttl(Duration::from_millis(ttl));
        }

        if let Some(policy) = cache.eviction_policy {
            builder = builder.cache_eviction_policy(policy.parse()?);
        }

        if let Some(mode) = cache.invalidation_mode {
            builder = builder.cache_invalidation_mode(mode.parse()?);
        }

        if let Some(max) = cache.max_value_size {
            builder = builder.cache_max_value_size(max);
        }

        if let Some(secs) = cache.cleanup_interval_secs {
            builder = builder.cache_cleanup_interval(Duration::from_secs(secs));
        }
    }

    // Observability settings
    if let Some(obs) = config.observability {
        if let Some(name) = obs.service_name {
            builder = builder.service_name(name);
        }

        if let Some(level) = obs.log_level {
            builder = builder.log_level(level);
        }

        if let Some(json) = obs.json_logs {
            builder = builder.json_logs(json);
        }
    }

    Ok(builder)
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    security: Option<SecurityConfig>,
    rate_limit: Option<RateLimitFileConfig>,
    cache: Option<CacheFileConfig>,
    observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Deserialize)]
struct SecurityConfig {
    enabled: Option<bool>,
    allow_insert: Option<bool>,
    allow_update: Option<bool>,
    allow_delete: Option<bool>,
    query_timeout_ms: Option<u64>,
    allowed_tables: Option<Vec<String>>,
    denied_tables: Option<Vec<String>>,
    filter: Option<FilterConfig>,
}

#[derive(Debug, Deserialize)]
struct FilterConfig {
    mode: Option<String>,
    allowed_statements: Option<Vec<String>>,
    denied_statements: Option<Vec<String>>,
    denied_patterns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RateLimitFileConfig {
    enabled: Option<bool>,
    algorithm: Option<String>,
    requests_per_minute: Option<u32>,
    burst_size: Option<u32>,
    window_secs: Option<u64>,
    idle_client_ttl_secs: Option<u64>,
    max_concurrent_queries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CacheFileConfig {
    enabled: Option<bool>,
    max_entries: Option<usize>,
    ttl_ms: Option<u64>,
    eviction_policy: Option<String>,
    invalidation_mode: Option<String>,
    max_value_size: Option<usize>,
    cleanup_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    service_name: Option<String>,
    log_level: Option<String>,
    json_logs: Option<bool>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::cache::{EvictionPolicy, InvalidationMode};
    use crate::rate_limit::RateLimitAlgorithm;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[security]
enabled = true
allow_insert = true
query_timeout_ms = 5000

[security.filter]
mode = "combined"
allowed_statements = ["SELECT", "INSERT"]
denied_statements = []
denied_patterns = ["information_schema"]

[rate_limit]
algorithm = "sliding_window"
requests_per_minute = 120
window_secs = 30

[cache]
max_entries = 500
ttl_ms = 10000
eviction_policy = "fifo"
invalidation_mode = "targeted"

[observability]
service_name = "guard"
log_level = "debug"
json_logs = true
"#;

        let config: FileConfig = toml::from_str(toml_content).unwrap();

        assert!(config.security.is_some());
        assert!(config.rate_limit.is_some());
        assert!(config.cache.is_some());
        assert!(config.observability.is_some());

        let sec = config.security.unwrap();
        assert_eq!(sec.allow_insert, Some(true));
        assert_eq!(sec.query_timeout_ms, Some(5000));
        let filter = sec.filter.unwrap();
        assert_eq!(filter.mode.as_deref(), Some("combined"));
        assert_eq!(filter.denied_patterns.unwrap().len(), 1);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml_content = r"
[cache]
enabled = false
";

        let config: FileConfig = toml::from_str(toml_content).unwrap();
        assert!(config.cache.is_some());
        assert!(config.security.is_none());
        assert!(config.rate_limit.is_none());
    }

    #[test]
    fn test_load_from_file_success() {
        let toml_content = r#"
[security]
allow_insert = true
allow_update = true
query_timeout_ms = 1500

[security.filter]
mode = "whitelist"
allowed_statements = ["SELECT", "INSERT", "UPDATE"]

[rate_limit]
algorithm = "fixed-window"
requests_per_minute = 30
window_secs = 10
idle_client_ttl_secs = 120

[cache]
max_entries = 50
ttl_ms = 2500
eviction_policy = "ttl"
invalidation_mode = "aggressive"
cleanup_interval_secs = 5
"#;
        let temp_file = create_temp_config(toml_content);

        let builder = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap();
        let config = builder.build().unwrap();

        assert_eq!(config.query_timeout, Duration::from_millis(1500));
        assert_eq!(config.filter_policy.mode().name(), "whitelist");
        assert!(config.filter_policy.writes().insert);
        assert!(config.filter_policy.writes().update);
        assert!(!config.filter_policy.writes().delete);

        assert_eq!(config.rate_limit.algorithm, RateLimitAlgorithm::FixedWindow);
        assert_eq!(config.rate_limit.requests_per_minute, 30);
        assert_eq!(config.rate_limit.window, Duration::from_secs(10));
        assert_eq!(config.rate_limit.idle_client_ttl, Duration::from_secs(120));

        assert_eq!(config.cache.max_entries, 50);
        assert_eq!(config.cache.ttl, Duration::from_millis(2500));
        assert_eq!(config.cache.eviction_policy, EvictionPolicy::Ttl);
        assert_eq!(config.cache.invalidation_mode, InvalidationMode::Aggressive);
        assert_eq!(config.cache.cleanup_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_load_table_lists_and_concurrency() {
        let toml_content = r#"
[security]
allowed_tables = ["users", "app.orders"]
denied_tables = ["`Secrets`"]

[rate_limit]
max_concurrent_queries = 4
"#;
        let temp_file = create_temp_config(toml_content);

        let config = load_from_file(temp_file.path(), ConfigBuilder::new())
            .unwrap()
            .build()
            .unwrap();

        let tables = config.filter_policy.tables();
        assert!(tables.allowed().contains("users"));
        assert!(tables.allowed().contains("orders"));
        assert!(tables.denied().contains("secrets"));
        assert_eq!(config.rate_limit.max_concurrent_queries, 4);
    }

    #[test]
    fn test_load_without_table_lists_keeps_filter_empty() {
        let temp_file = create_temp_config("[security]\nallow_insert = true\n");

        let config = load_from_file(temp_file.path(), ConfigBuilder::new())
            .unwrap()
            .build()
            .unwrap();
        assert!(config.filter_policy.tables().is_empty());
        assert_eq!(config.rate_limit.max_concurrent_queries, 10);
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(
            Path::new("/nonexistent/path/config.toml"),
            ConfigBuilder::new(),
        );
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let temp_file = create_temp_config("this is not valid toml {{{{");

        let result = load_from_file(temp_file.path(), ConfigBuilder::new());
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_invalid_filter_mode() {
        let toml_content = r#"
[security.filter]
mode = "strict"
"#;
        let temp_file = create_temp_config(toml_content);

        let result = load_from_file(temp_file.path(), ConfigBuilder::new());
        assert!(result.unwrap_err().to_string().contains("Invalid filter mode"));
    }

    #[test]
    fn test_load_whitelist_without_statements() {
        let toml_content = r#"
[security.filter]
mode = "whitelist"
"#;
        let temp_file = create_temp_config(toml_content);

        let result = load_from_file(temp_file.path(), ConfigBuilder::new());
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_load_invalid_denied_pattern() {
        let toml_content = r#"
[security.filter]
denied_patterns = ["(unclosed"]
"#;
        let temp_file = create_temp_config(toml_content);

        let result = load_from_file(temp_file.path(), ConfigBuilder::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_eviction_policy() {
        let toml_content = r#"
[cache]
eviction_policy = "random"
"#;
        let temp_file = create_temp_config(toml_content);

        let result = load_from_file(temp_file.path(), ConfigBuilder::new());
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_load_observability_config() {
        let toml_content = r#"
[observability]
service_name = "my-service"
log_level = "trace"
json_logs = true
"#;
        let temp_file = create_temp_config(toml_content);

        let builder = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap();
        let config = builder.build().unwrap();

        assert_eq!(config.telemetry.service_name, "my-service");
        assert_eq!(config.telemetry.log_level, "trace");
        assert!(config.telemetry.json_logs);
    }

    #[test]
    fn test_load_security_disabled() {
        let toml_content = r"
[security]
enabled = false
";
        let temp_file = create_temp_config(toml_content);

        let builder = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap();
        assert!(!builder.build().unwrap().security_enabled);
    }

    #[test]
    fn test_empty_config_file() {
        let temp_file = create_temp_config("");

        let builder = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap();
        let config = builder.build().unwrap();
        assert!(config.security_enabled);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_find_config_file_not_found() {
        let result = find_config_file();
        assert!(result.is_none() || result.unwrap().exists());
    }
}

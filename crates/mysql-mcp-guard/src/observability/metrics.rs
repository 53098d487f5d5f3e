//! Prometheus metrics for mysql-mcp-guard

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::Result;
use crate::error::Error;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

const METRIC_UPTIME: &str = "mysql_mcp_guard_uptime_seconds";
const METRIC_INFO: &str = "mysql_mcp_guard_info";

// Pipeline metrics
const METRIC_DECISIONS: &str = "mysql_mcp_guard_decisions_total";
const METRIC_RATE_LIMITED: &str = "mysql_mcp_guard_rate_limited_total";

// Cache metrics
const METRIC_CACHE_HITS: &str = "mysql_mcp_guard_cache_hits_total";
const METRIC_CACHE_MISSES: &str = "mysql_mcp_guard_cache_misses_total";
const METRIC_CACHE_EVICTIONS: &str = "mysql_mcp_guard_cache_evictions_total";
const METRIC_CACHE_ENTRIES: &str = "mysql_mcp_guard_cache_entries";
const METRIC_CACHE_BYTES: &str = "mysql_mcp_guard_cache_bytes";

/// Initialize Prometheus metrics recorder.
pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Config(format!("Failed to install metrics recorder: {e}")))?;

    PROMETHEUS_HANDLE.set(handle).ok();
    START_TIME.set(Instant::now()).ok();

    register_metrics();
    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

fn register_metrics() {
    describe_gauge!(METRIC_UPTIME, "Process uptime in seconds");
    describe_gauge!(METRIC_INFO, "Build information (always 1)");

    describe_counter!(METRIC_DECISIONS, "Pipeline decisions by verdict and reason");
    describe_counter!(METRIC_RATE_LIMITED, "Requests rejected by the rate limiter");

    describe_counter!(METRIC_CACHE_HITS, "Total cache hits");
    describe_counter!(METRIC_CACHE_MISSES, "Total cache misses");
    describe_counter!(METRIC_CACHE_EVICTIONS, "Capacity evictions by policy");
    describe_gauge!(METRIC_CACHE_ENTRIES, "Current cache size (entries)");
    describe_gauge!(METRIC_CACHE_BYTES, "Current cache size (bytes)");

    gauge!(
        METRIC_INFO,
        "version" => env!("CARGO_PKG_VERSION"),
    )
    .set(1.0);
}

/// Render metrics in Prometheus text format.
#[must_use]
pub fn render_metrics() -> String {
    if let Some(start) = START_TIME.get() {
        gauge!(METRIC_UPTIME).set(start.elapsed().as_secs_f64());
    }

    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Record a pipeline decision.
pub fn record_decision(verdict: &str, reason: Option<&str>) {
    counter!(
        METRIC_DECISIONS,
        "verdict" => verdict.to_owned(),
        "reason" => reason.unwrap_or("none").to_owned(),
    )
    .increment(1);
}

/// Record a rate-limited request.
pub fn record_rate_limited(algorithm: &str) {
    counter!(METRIC_RATE_LIMITED, "algorithm" => algorithm.to_owned()).increment(1);
}

/// Record a cache hit.
pub fn record_cache_hit() {
    counter!(METRIC_CACHE_HITS).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss() {
    counter!(METRIC_CACHE_MISSES).increment(1);
}

/// Record a capacity eviction.
pub fn record_cache_eviction(policy: &str) {
    counter!(METRIC_CACHE_EVICTIONS, "policy" => policy.to_owned()).increment(1);
}

/// Update cache size gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_cache_size(entries: u64, bytes: u64) {
    gauge!(METRIC_CACHE_ENTRIES).set(entries as f64);
    gauge!(METRIC_CACHE_BYTES).set(bytes as f64);
}

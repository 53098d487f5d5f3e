//! Observability module for logging and metrics

#[cfg(feature = "metrics")]
mod metrics;

#[cfg(feature = "metrics")]
pub use metrics::{
    init_metrics, record_cache_eviction, record_cache_hit, record_cache_miss, record_decision,
    record_rate_limited, render_metrics, set_cache_size,
};

use crate::Result;
use crate::config::TelemetryConfig;

/// Initialize observability stack
///
/// Fails if a global subscriber or metrics recorder is already installed.
pub fn init_observability(config: &TelemetryConfig) -> Result<()> {
    #[cfg(feature = "metrics")]
    {
        init_metrics()?;
    }

    init_basic_logging(config)
}

/// Install the `tracing` subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_basic_logging(config: &TelemetryConfig) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| crate::Error::Config(format!("Failed to install tracing subscriber: {e}")))?;

    tracing::debug!(service = %config.service_name, "Logging initialized");
    Ok(())
}

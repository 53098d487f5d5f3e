//! Background cache sweep and rate limiter pruning

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::CacheProvider;
use crate::rate_limit::{ConcurrencyLimiter, RateLimiter};

/// Result of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Expired cache entries removed
    pub expired: u64,
    /// Idle rate limiter and concurrency limiter clients removed
    pub pruned: usize,
}

/// Shortest accepted sweep period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic maintenance over shared pipeline state
pub struct MaintenanceTask {
    cache: Arc<dyn CacheProvider>,
    limiter: Arc<dyn RateLimiter>,
    concurrency: Option<Arc<ConcurrencyLimiter>>,
    interval: Duration,
    idle_client_ttl: Duration,
}

impl std::fmt::Debug for MaintenanceTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceTask")
            .field("limiter", &self.limiter)
            .field("interval", &self.interval)
            .field("idle_client_ttl", &self.idle_client_ttl)
            .finish_non_exhaustive()
    }
}

impl MaintenanceTask {
    /// `interval` is raised to at least one millisecond
    #[must_use]
    pub fn new(
        cache: Arc<dyn CacheProvider>,
        limiter: Arc<dyn RateLimiter>,
        interval: Duration,
        idle_client_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            limiter,
            concurrency: None,
            interval: interval.max(MIN_INTERVAL),
            idle_client_ttl,
        }
    }

    /// Also drop concurrency slots of clients with nothing in flight
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: Arc<ConcurrencyLimiter>) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Run one pass. A failed cache sweep is logged and the pass continues.
    pub async fn run_once(&self) -> MaintenanceReport {
        let expired = match self.cache.purge_expired().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "Cache expiry sweep failed");
                0
            }
        };

        let pruned = self.limiter.prune_idle(Instant::now(), self.idle_client_ttl)
            + self.concurrency.as_ref().map_or(0, |c| c.prune_idle());

        #[cfg(feature = "metrics")]
        {
            let stats = self.cache.stats().await;
            crate::observability::set_cache_size(stats.entry_count, stats.size_bytes);
        }

        if expired > 0 || pruned > 0 {
            tracing::debug!(expired, pruned, "Maintenance pass completed");
        }

        MaintenanceReport { expired, pruned }
    }

    pub fn spawn(
        self,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately; the first sweep waits one period
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    () = shutdown.cancelled() => {
                        tracing::debug!("Maintenance task shutting down");
                        break;
                    }
                }
            }
        })
    }
}

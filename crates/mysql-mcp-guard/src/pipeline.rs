//! Request pipeline
//!
//! Each request passes, in order:
//!
//! 1. Pattern matcher and query filter (skipped when security is disabled)
//! 2. Per-client concurrency slot, held until the run ends
//! 3. Rate limiter
//! 4. Cache lookup, for deterministic reads
//! 5. External execution under the query timeout
//! 6. Cache store, or invalidation after a successful write
//!
//! The first rejection ends the run. Every run emits exactly one audit record.
//! A result is not stored when any invalidation ran while it was executing.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::cache::{
    CacheKey, CacheProvider, CacheStats, InvalidationMode, InvalidationScope, create_cache,
    fetch_cached, store_cached_since,
};
use crate::config::Config;
use crate::maintenance::MaintenanceTask;
use crate::rate_limit::{
    Admission, ConcurrencyLimiter, RateLimiter, create_concurrency_limiter, create_rate_limiter,
};
use crate::security::{
    ExecuteError, FilterDecision, FilterPolicy, QueryGuard, Rejection, Statement, ThreatReport,
    patterns,
};
use crate::types::{Decision, QueryResult, RejectReason, Request, Verdict};

/// Executes admitted statements against the database
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    type Error: fmt::Display + Send;

    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        database: Option<&str>,
    ) -> Result<QueryResult, Self::Error>;
}

/// State of one run, carried into the decision and audit record
struct Run<'a> {
    request: &'a Request,
    statement: &'a Statement,
    threats: ThreatReport,
    started: Instant,
}

/// Request safety and throttling pipeline
pub struct Pipeline<X> {
    executor: Arc<X>,
    policy: ArcSwap<FilterPolicy>,
    security_enabled: bool,
    limiter: Arc<dyn RateLimiter>,
    concurrency: Option<Arc<ConcurrencyLimiter>>,
    cache: Arc<dyn CacheProvider>,
    cache_ttl: Option<Duration>,
    invalidation: InvalidationMode,
    audit: Arc<dyn AuditSink>,
    guard: QueryGuard,
    maintenance_interval: Duration,
    idle_client_ttl: Duration,
}

impl<X> fmt::Debug for Pipeline<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("policy", &self.policy.load_full())
            .field("security_enabled", &self.security_enabled)
            .field("limiter", &self.limiter)
            .field("concurrency", &self.concurrency)
            .field("cache_ttl", &self.cache_ttl)
            .field("invalidation", &self.invalidation)
            .field("audit", &self.audit)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl<X: QueryExecutor> Pipeline<X> {
    /// Create a pipeline with security enabled, the given policy, and no
    /// rate limiting or caching
    #[must_use]
    pub fn new(executor: Arc<X>, policy: FilterPolicy) -> Self {
        Self {
            executor,
            policy: ArcSwap::from_pointee(policy),
            security_enabled: true,
            limiter: Arc::new(crate::rate_limit::Unlimited),
            concurrency: None,
            cache: Arc::new(crate::cache::NoopCache::new()),
            cache_ttl: None,
            invalidation: InvalidationMode::default(),
            audit: Arc::new(TracingAuditSink),
            guard: QueryGuard::new(Duration::from_secs(30)),
            maintenance_interval: Duration::from_secs(30),
            idle_client_ttl: Duration::from_secs(600),
        }
    }

    /// Build a pipeline from resolved configuration
    pub fn from_config(executor: Arc<X>, config: &Config) -> crate::Result<Self> {
        config.rate_limit().validate()?;
        config.cache().validate()?;

        let cache = config.cache();
        let rate_limit = config.rate_limit();

        tracing::info!(
            security_enabled = config.security_enabled(),
            filter_mode = config.filter_policy().mode().name(),
            rate_limit_enabled = rate_limit.enabled,
            rate_limit_algorithm = rate_limit.algorithm.as_str(),
            max_concurrent_queries = rate_limit.max_concurrent_queries,
            cache_enabled = cache.enabled,
            cache_eviction = cache.eviction_policy.as_str(),
            cache_invalidation = cache.invalidation_mode.as_str(),
            "Pipeline configured"
        );

        let mut pipeline = Self::new(executor, config.filter_policy().clone())
            .with_security(config.security_enabled())
            .with_rate_limiter(create_rate_limiter(rate_limit))
            .with_cache(create_cache(cache), cache.ttl, cache.invalidation_mode)
            .with_query_timeout(config.query_timeout())
            .with_maintenance(cache.cleanup_interval, rate_limit.idle_client_ttl);
        pipeline.concurrency = create_concurrency_limiter(rate_limit);
        Ok(pipeline)
    }

    /// Enable or bypass the pattern matcher and query filter
    #[must_use]
    pub const fn with_security(mut self, enabled: bool) -> Self {
        self.security_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Limit each client to `max` queries in flight, 0 for no limit
    #[must_use]
    pub fn with_concurrency_limit(mut self, max: u32) -> Self {
        self.concurrency = (max > 0).then(|| Arc::new(ConcurrencyLimiter::new(max)));
        self
    }

    #[must_use]
    pub fn with_cache(
        mut self,
        cache: Arc<dyn CacheProvider>,
        ttl: Duration,
        invalidation: InvalidationMode,
    ) -> Self {
        self.cache = cache;
        self.cache_ttl = Some(ttl);
        self.invalidation = invalidation;
        self
    }

    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    #[must_use]
    pub const fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.guard = QueryGuard::new(timeout);
        self
    }

    #[must_use]
    pub const fn with_maintenance(mut self, interval: Duration, idle_client_ttl: Duration) -> Self {
        self.maintenance_interval = interval;
        self.idle_client_ttl = idle_client_ttl;
        self
    }

    /// Current filter policy snapshot
    #[must_use]
    pub fn policy(&self) -> Arc<FilterPolicy> {
        self.policy.load_full()
    }

    /// Replace the filter policy. Runs already in progress keep their snapshot.
    pub fn reload_policy(&self, policy: FilterPolicy) {
        tracing::info!(filter_mode = policy.mode().name(), "Filter policy reloaded");
        self.policy.store(Arc::new(policy));
    }

    /// Process one request.
    ///
    /// Rejections are `Ok` decisions. `Err` is returned only when an admitted
    /// statement fails or times out in the executor; nothing is cached then.
    pub async fn process(&self, request: Request) -> Result<Decision, ExecuteError<X::Error>> {
        let started = Instant::now();
        let statement = Statement::analyze(&request.sql);
        let policy = self.policy.load_full();

        let threats = if self.security_enabled {
            patterns::scan_statement(&statement, &request.params)
        } else {
            ThreatReport::default()
        };

        if !threats.is_empty() {
            tracing::warn!(
                client_id = %request.client_id,
                rules = ?threats.rule_ids(),
                severity = threats.highest_severity().map(|s| s.as_str()),
                "Threat signatures matched"
            );
        }

        let run = Run {
            request: &request,
            statement: &statement,
            threats,
            started,
        };

        if self.security_enabled
            && let FilterDecision::Reject(rejection) =
                policy.evaluate(&statement, &request.sql, &run.threats)
        {
            return Ok(self.reject(run, rejection, None));
        }

        // checked before the rate limiter so a refused request consumes no token
        let _slot = match &self.concurrency {
            Some(concurrency) => match concurrency.try_acquire(&request.client_id) {
                Some(permit) => Some(permit),
                None => {
                    #[cfg(feature = "metrics")]
                    crate::observability::record_rate_limited("concurrency");

                    let rejection = Rejection {
                        reason: RejectReason::RateLimited,
                        rule_id: Some("concurrency".into()),
                        message: format!(
                            "Too many concurrent queries (limit {})",
                            concurrency.max()
                        ),
                    };
                    return Ok(self.reject(run, rejection, None));
                }
            },
            None => None,
        };

        if let Admission::Limited { retry_after } =
            self.limiter.admit(&request.client_id, request.received_at)
        {
            #[cfg(feature = "metrics")]
            crate::observability::record_rate_limited(self.limiter.algorithm());

            let rejection = Rejection {
                reason: RejectReason::RateLimited,
                rule_id: Some(self.limiter.algorithm().to_string()),
                message: "Rate limit exceeded".into(),
            };
            return Ok(self.reject(run, rejection, retry_after));
        }

        let database = request.database.as_deref();
        let cache_key = statement
            .is_cacheable()
            .then(|| CacheKey::for_statement(&statement, &request.params, database));

        let mut generation = 0;
        if let Some(key) = &cache_key {
            if let Some(result) = fetch_cached::<QueryResult>(self.cache.as_ref(), key).await {
                #[cfg(feature = "metrics")]
                crate::observability::record_cache_hit();
                return Ok(self.admit(run, result, Verdict::ServeCached));
            }
            #[cfg(feature = "metrics")]
            crate::observability::record_cache_miss();
            generation = self.cache.generation().await;
        }

        let outcome = self
            .guard
            .execute_with_error(self.executor.execute(&request.sql, &request.params, database))
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    client_id = %request.client_id,
                    statement = statement.kind().as_str(),
                    timeout = err.is_timeout(),
                    error = %err,
                    "Query execution failed"
                );
                self.audit_failure(run);
                return Err(err);
            }
        };

        if let Some(key) = &cache_key {
            store_cached_since(self.cache.as_ref(), key, &result, self.cache_ttl, generation).await;
        } else if !statement.kind().is_read_only() || statement.is_stacked() {
            self.invalidate_statement(&statement, database).await;
        }

        Ok(self.admit(run, result, Verdict::Admit))
    }

    /// Invalidate cache entries affected by a write executed outside `process`.
    ///
    /// Returns the number of entries removed.
    pub async fn invalidate(&self, write_sql: &str, database: Option<&str>) -> u64 {
        let statement = Statement::analyze(write_sql);
        self.invalidate_statement(&statement, database).await
    }

    async fn invalidate_statement(&self, statement: &Statement, database: Option<&str>) -> u64 {
        // the tables of trailing statements are not extracted
        let scope = if statement.is_stacked() {
            InvalidationScope::All
        } else if statement.tables_complete() {
            self.invalidation.scope(database, statement.tables())
        } else {
            self.invalidation.scope(database, &[])
        };
        match self.cache.invalidate(&scope).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, scope = ?scope, "Cache invalidation failed");
                0
            }
        }
    }

    /// Start the background cache sweep and idle client pruning
    pub fn spawn_maintenance(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut task = MaintenanceTask::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.limiter),
            self.maintenance_interval,
            self.idle_client_ttl,
        );
        if let Some(concurrency) = &self.concurrency {
            task = task.with_concurrency(Arc::clone(concurrency));
        }
        task.spawn(shutdown)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    fn audit_record(&self, run: &Run<'_>, verdict: Verdict) -> AuditRecord {
        let mut record = AuditRecord::new(&run.request.client_id, run.statement.kind(), verdict);
        record.database.clone_from(&run.request.database);
        record.threats = run.threats.rule_ids();
        record.latency_us = run.started.elapsed().as_micros() as u64;
        record
    }

    fn emit(&self, record: &AuditRecord) {
        #[cfg(feature = "metrics")]
        crate::observability::record_decision(
            record.verdict.as_str(),
            record.reason.map(|r| r.as_str()),
        );
        self.audit.record(record);
    }

    fn admit(&self, run: Run<'_>, payload: QueryResult, verdict: Verdict) -> Decision {
        let audit = self.audit_record(&run, verdict);
        self.emit(&audit);

        tracing::debug!(
            client_id = %run.request.client_id,
            verdict = verdict.as_str(),
            rows = payload.row_count,
            "Request admitted"
        );

        Decision {
            verdict,
            reason: None,
            rule_id: None,
            message: None,
            retry_after: None,
            payload: Some(payload),
            threats: run.threats,
            audit,
        }
    }

    fn reject(&self, run: Run<'_>, rejection: Rejection, retry_after: Option<Duration>) -> Decision {
        let mut audit = self.audit_record(&run, Verdict::Reject);
        audit.reason = Some(rejection.reason);
        audit.rule_id.clone_from(&rejection.rule_id);
        self.emit(&audit);

        tracing::warn!(
            client_id = %run.request.client_id,
            reason = rejection.reason.as_str(),
            rule_id = rejection.rule_id.as_deref(),
            "Request rejected: {}",
            rejection.message
        );

        Decision {
            verdict: Verdict::Reject,
            reason: Some(rejection.reason),
            rule_id: rejection.rule_id,
            message: Some(rejection.message),
            retry_after,
            payload: None,
            threats: run.threats,
            audit,
        }
    }

    fn audit_failure(&self, run: Run<'_>) {
        let mut audit = self.audit_record(&run, Verdict::Admit);
        audit.execution_failed = true;
        self.emit(&audit);
    }
}

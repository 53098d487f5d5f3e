//! Request-safety and throttling pipeline for MySQL MCP servers
//!
//! Every request issued by an LLM client passes through [`Pipeline::process`]:
//! injection scanning and statement filtering, per-client rate limiting, and
//! a result cache in front of the database. Admitted statements run through a
//! caller-supplied [`QueryExecutor`].

pub mod audit;
pub mod cache;
pub mod config;
mod error;
pub mod maintenance;
pub mod observability;
pub mod pipeline;
pub mod rate_limit;
pub mod security;
pub mod types;

pub use audit::{AuditRecord, AuditSink, ChannelAuditSink, TracingAuditSink};
pub use cache::{
    CacheConfig, CacheError, CacheKey, CacheProvider, CacheResult, CacheStats, EvictionPolicy,
    InMemoryCache, InvalidationMode, InvalidationScope, NoopCache, TracedCache, create_cache,
};
pub use config::{Config, ConfigBuilder, TelemetryConfig, load_config, load_config_from_path};
pub use error::{Error, Result};
pub use maintenance::{MaintenanceReport, MaintenanceTask};
pub use pipeline::{Pipeline, QueryExecutor};
pub use rate_limit::{
    Admission, ConcurrencyLimiter, RateLimitAlgorithm, RateLimitConfig, RateLimiter,
    create_concurrency_limiter, create_rate_limiter,
};
pub use security::{
    ExecuteError, FilterDecision, FilterMode, FilterPolicy, QueryGuard, Statement, StatementKind,
    TableFilter, ThreatReport, WritePermissions,
};
pub use types::*;

//! Rate limiter configuration types

use std::str::FromStr;
use std::time::Duration;

use crate::Error;

/// Admission algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitAlgorithm {
    #[default]
    TokenBucket,
    SlidingWindow,
    FixedWindow,
}

impl RateLimitAlgorithm {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TokenBucket => "token_bucket",
            Self::SlidingWindow => "sliding_window",
            Self::FixedWindow => "fixed_window",
        }
    }
}

impl FromStr for RateLimitAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "token_bucket" | "bucket" => Ok(Self::TokenBucket),
            "sliding_window" | "sliding" => Ok(Self::SlidingWindow),
            "fixed_window" | "fixed" => Ok(Self::FixedWindow),
            _ => Err(Error::Config(format!(
                "Invalid rate limit algorithm: {s}. Use 'token_bucket', 'sliding_window', or 'fixed_window'"
            ))),
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,
    pub algorithm: RateLimitAlgorithm,
    /// Sustained rate; window algorithms admit this many requests per `window`
    pub requests_per_minute: u32,
    /// Token bucket capacity
    pub burst_size: u32,
    /// Window length for sliding and fixed windows
    pub window: Duration,
    /// Client state idle for longer than this is pruned by maintenance
    pub idle_client_ttl: Duration,
    /// Per-client limit on queries executing at once, 0 for no limit
    pub max_concurrent_queries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            algorithm: RateLimitAlgorithm::TokenBucket,
            requests_per_minute: 60,
            burst_size: 20,
            window: Duration::from_secs(60),
            idle_client_ttl: Duration::from_secs(600),
            max_concurrent_queries: 10,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        if self.requests_per_minute == 0 {
            return Err(Error::Config("requests_per_minute must be at least 1".into()));
        }
        if self.algorithm == RateLimitAlgorithm::TokenBucket && self.burst_size == 0 {
            return Err(Error::Config("burst_size must be at least 1".into()));
        }
        if self.window.is_zero() {
            return Err(Error::Config("rate limit window must be non-zero".into()));
        }
        Ok(())
    }
}

//! Per-client admission control
//!
//! Three algorithms share one [`RateLimiter`] interface:
//!
//! - [`TokenBucket`] - burst capacity with lazy refill
//! - [`SlidingWindow`] - exact count over a trailing window
//! - [`FixedWindow`] - counter reset at aligned window boundaries
//!
//! State is partitioned per client key. Each key has its own mutex, so two
//! concurrent requests from one client cannot both take the last slot, and
//! requests from different clients never contend on the same lock.
//!
//! [`ConcurrencyLimiter`] bounds how many queries one client has executing at
//! once, independent of the request rate.

mod concurrency;
mod config;
mod fixed_window;
mod sliding_window;
mod token_bucket;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

pub use concurrency::ConcurrencyLimiter;
pub use config::{RateLimitAlgorithm, RateLimitConfig};
pub use fixed_window::FixedWindow;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

/// Admission outcome for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Limited {
        /// Time until the next request would be admitted, where derivable
        retry_after: Option<Duration>,
    },
}

impl Admission {
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Admitted => None,
            Self::Limited { retry_after } => *retry_after,
        }
    }
}

/// Per-client rate limiter
pub trait RateLimiter: Send + Sync + fmt::Debug {
    /// Check and record one request. Never blocks on other clients.
    fn admit(&self, client_key: &str, now: Instant) -> Admission;

    /// Drop state of clients not seen for `idle_after`. Returns the number removed.
    fn prune_idle(&self, now: Instant, idle_after: Duration) -> usize;

    /// Number of clients with live state
    fn tracked_clients(&self) -> usize;

    fn algorithm(&self) -> &'static str;
}

/// Algorithm-specific state transitions
pub trait Algorithm: Send + Sync + fmt::Debug {
    type State: Send + fmt::Debug;

    const NAME: &'static str;

    fn new_state(&self, now: Instant) -> Self::State;

    fn admit(&self, state: &mut Self::State, now: Instant) -> Admission;

    /// Idle time after which a client's state is equivalent to a fresh one
    fn recovery_period(&self) -> Duration;
}

#[derive(Debug)]
struct ClientState<S> {
    state: S,
    last_seen: Instant,
}

/// Keyed store running one [`Algorithm`] per client
pub struct KeyedLimiter<A: Algorithm> {
    algorithm: A,
    clients: RwLock<HashMap<String, Arc<Mutex<ClientState<A::State>>>>>,
}

impl<A: Algorithm> fmt::Debug for KeyedLimiter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLimiter")
            .field("algorithm", &self.algorithm)
            .field("clients", &self.clients.read().len())
            .finish()
    }
}

impl<A: Algorithm> KeyedLimiter<A> {
    #[must_use]
    pub fn new(algorithm: A) -> Self {
        Self {
            algorithm,
            clients: RwLock::new(HashMap::new()),
        }
    }

    fn client(&self, key: &str, now: Instant) -> Arc<Mutex<ClientState<A::State>>> {
        if let Some(existing) = self.clients.read().get(key) {
            return Arc::clone(existing);
        }

        let mut clients = self.clients.write();
        Arc::clone(clients.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(ClientState {
                state: self.algorithm.new_state(now),
                last_seen: now,
            }))
        }))
    }
}

impl<A: Algorithm> RateLimiter for KeyedLimiter<A> {
    fn admit(&self, client_key: &str, now: Instant) -> Admission {
        let client = self.client(client_key, now);
        let mut guard = client.lock();
        if now > guard.last_seen {
            guard.last_seen = now;
        }
        let admission = self.algorithm.admit(&mut guard.state, now);
        drop(guard);

        if let Admission::Limited { retry_after } = admission {
            tracing::debug!(
                client_id = client_key,
                algorithm = A::NAME,
                retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                "Rate limit reached"
            );
        }
        admission
    }

    fn prune_idle(&self, now: Instant, idle_after: Duration) -> usize {
        let idle_after = idle_after.max(self.algorithm.recovery_period());
        let mut clients = self.clients.write();
        let before = clients.len();

        // An entry borrowed by an in-flight admit has a second strong reference
        clients.retain(|_, client| {
            Arc::strong_count(client) > 1
                || now.saturating_duration_since(client.lock().last_seen) < idle_after
        });

        let removed = before - clients.len();
        drop(clients);

        if removed > 0 {
            tracing::debug!(algorithm = A::NAME, removed, "Pruned idle rate limiter state");
        }
        removed
    }

    fn tracked_clients(&self) -> usize {
        self.clients.read().len()
    }

    fn algorithm(&self) -> &'static str {
        A::NAME
    }
}

/// Limiter used when rate limiting is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn admit(&self, _client_key: &str, _now: Instant) -> Admission {
        Admission::Admitted
    }

    fn prune_idle(&self, _now: Instant, _idle_after: Duration) -> usize {
        0
    }

    fn tracked_clients(&self) -> usize {
        0
    }

    fn algorithm(&self) -> &'static str {
        "unlimited"
    }
}

/// Create a rate limiter based on configuration
#[must_use]
pub fn create_rate_limiter(config: &RateLimitConfig) -> Arc<dyn RateLimiter> {
    if !config.enabled {
        return Arc::new(Unlimited);
    }

    match config.algorithm {
        RateLimitAlgorithm::TokenBucket => Arc::new(KeyedLimiter::new(TokenBucket::new(
            config.burst_size,
            config.requests_per_minute,
        ))),
        RateLimitAlgorithm::SlidingWindow => Arc::new(KeyedLimiter::new(SlidingWindow::new(
            config.requests_per_minute,
            config.window,
        ))),
        RateLimitAlgorithm::FixedWindow => Arc::new(KeyedLimiter::new(FixedWindow::new(
            config.requests_per_minute,
            config.window,
            Instant::now(),
        ))),
    }
}

/// Create a concurrency limiter, `None` when rate limiting is disabled or unbounded
#[must_use]
pub fn create_concurrency_limiter(config: &RateLimitConfig) -> Option<Arc<ConcurrencyLimiter>> {
    (config.enabled && config.max_concurrent_queries > 0)
        .then(|| Arc::new(ConcurrencyLimiter::new(config.max_concurrent_queries)))
}

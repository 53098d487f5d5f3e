//! Token bucket with lazy refill

use std::time::{Duration, Instant};

use super::{Admission, Algorithm};

/// Bucket of `capacity` tokens refilled at `requests_per_minute / 60` per second
#[derive(Debug, Clone, Copy)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
}

#[derive(Debug)]
pub struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    #[must_use]
    pub fn new(capacity: u32, requests_per_minute: u32) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_per_sec: f64::from(requests_per_minute) / 60.0,
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // Requests may carry an arrival time older than the last refill
        if now <= state.last_refill {
            return;
        }
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = elapsed
            .mul_add(self.refill_per_sec, state.tokens)
            .min(self.capacity);
        state.last_refill = now;
    }
}

impl Algorithm for TokenBucket {
    type State = BucketState;

    const NAME: &'static str = "token_bucket";

    fn new_state(&self, now: Instant) -> Self::State {
        BucketState {
            tokens: self.capacity,
            last_refill: now,
        }
    }

    fn admit(&self, state: &mut Self::State, now: Instant) -> Admission {
        self.refill(state, now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Admission::Admitted;
        }

        let retry_after = (self.refill_per_sec > 0.0)
            .then(|| Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec));
        Admission::Limited { retry_after }
    }

    fn recovery_period(&self) -> Duration {
        if self.refill_per_sec > 0.0 {
            Duration::from_secs_f64(self.capacity / self.refill_per_sec)
        } else {
            Duration::MAX
        }
    }
}

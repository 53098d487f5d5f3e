//! Fixed window counter

use std::time::{Duration, Instant};

use super::{Admission, Algorithm};

/// Admits at most `limit` requests per window; windows are aligned to `origin`
#[derive(Debug, Clone, Copy)]
pub struct FixedWindow {
    limit: u32,
    window: Duration,
    origin: Instant,
}

#[derive(Debug)]
pub struct WindowState {
    index: u64,
    count: u32,
}

impl FixedWindow {
    #[must_use]
    pub const fn new(limit: u32, window: Duration, origin: Instant) -> Self {
        Self {
            limit,
            window,
            origin,
        }
    }

    fn window_index(&self, now: Instant) -> u64 {
        let window_nanos = self.window.as_nanos().max(1);
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        u64::try_from(elapsed / window_nanos).unwrap_or(u64::MAX)
    }

    fn time_until_reset(&self, index: u64, now: Instant) -> Option<Duration> {
        let next_index = u32::try_from(index.checked_add(1)?).ok()?;
        let boundary = self.origin.checked_add(self.window.checked_mul(next_index)?)?;
        Some(boundary.saturating_duration_since(now))
    }
}

impl Algorithm for FixedWindow {
    type State = WindowState;

    const NAME: &'static str = "fixed_window";

    fn new_state(&self, now: Instant) -> Self::State {
        WindowState {
            index: self.window_index(now),
            count: 0,
        }
    }

    fn admit(&self, state: &mut Self::State, now: Instant) -> Admission {
        let index = self.window_index(now);
        if index > state.index {
            state.index = index;
            state.count = 0;
        }

        if state.count < self.limit {
            state.count += 1;
            return Admission::Admitted;
        }

        Admission::Limited {
            retry_after: self.time_until_reset(state.index, now),
        }
    }

    fn recovery_period(&self) -> Duration {
        self.window
    }
}

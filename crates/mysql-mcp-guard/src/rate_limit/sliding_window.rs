//! Sliding window log

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::{Admission, Algorithm};

/// Admits at most `limit` requests within any trailing `window`
#[derive(Debug, Clone, Copy)]
pub struct SlidingWindow {
    limit: usize,
    window: Duration,
}

impl SlidingWindow {
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
        }
    }
}

impl Algorithm for SlidingWindow {
    type State = VecDeque<Instant>;

    const NAME: &'static str = "sliding_window";

    fn new_state(&self, _now: Instant) -> Self::State {
        VecDeque::with_capacity(self.limit.min(64))
    }

    fn admit(&self, log: &mut Self::State, now: Instant) -> Admission {
        while log
            .front()
            .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= self.window)
        {
            log.pop_front();
        }

        if log.len() < self.limit {
            log.push_back(now);
            return Admission::Admitted;
        }

        let retry_after = log
            .front()
            .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)));
        Admission::Limited { retry_after }
    }

    fn recovery_period(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_within_window() {
        let window = SlidingWindow::new(3, Duration::from_secs(10));
        let start = Instant::now();
        let mut log = window.new_state(start);

        assert!(window.admit(&mut log, start).is_admitted());
        assert!(window.admit(&mut log, start + Duration::from_secs(1)).is_admitted());
        assert!(window.admit(&mut log, start + Duration::from_secs(2)).is_admitted());

        let limited = window.admit(&mut log, start + Duration::from_secs(3));
        assert_eq!(
            limited,
            Admission::Limited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[test]
    fn test_oldest_request_slides_out() {
        let window = SlidingWindow::new(2, Duration::from_secs(10));
        let start = Instant::now();
        let mut log = window.new_state(start);

        assert!(window.admit(&mut log, start).is_admitted());
        assert!(window.admit(&mut log, start + Duration::from_secs(5)).is_admitted());
        assert!(!window.admit(&mut log, start + Duration::from_secs(9)).is_admitted());

        // first request expires at exactly start + 10s
        assert!(window.admit(&mut log, start + Duration::from_secs(10)).is_admitted());
        assert!(!window.admit(&mut log, start + Duration::from_secs(11)).is_admitted());
        assert!(window.admit(&mut log, start + Duration::from_secs(15)).is_admitted());
    }

    #[test]
    fn test_rejected_requests_not_logged() {
        let window = SlidingWindow::new(1, Duration::from_secs(10));
        let start = Instant::now();
        let mut log = window.new_state(start);

        assert!(window.admit(&mut log, start).is_admitted());
        for s in 1..10 {
            assert!(!window.admit(&mut log, start + Duration::from_secs(s)).is_admitted());
        }
        assert_eq!(log.len(), 1);
        assert!(window.admit(&mut log, start + Duration::from_secs(10)).is_admitted());
    }
}

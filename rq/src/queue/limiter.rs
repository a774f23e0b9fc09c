//! Fixed-window rate limiter
//!
//! Each identifier gets a window that opens on its first admission and
//! lasts `window`. Up to `limit` admissions fit in one window. Because windows
//! reset at fixed points, a burst of up to `2 * limit` admissions can straddle
//! a boundary; that approximation is accepted.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Admission count for one identifier's current window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub reset_at: Instant,
}

/// Rate limiter keyed by identifier
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<String, RateWindow>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: HashMap::new(),
            limit,
            window,
        }
    }

    /// Admit one request for `identifier` if its window has budget left
    pub fn try_admit(&mut self, identifier: &str) -> bool {
        self.try_admit_at(identifier, Instant::now())
    }

    /// Like [`try_admit`](Self::try_admit) with an explicit clock reading
    pub fn try_admit_at(&mut self, identifier: &str, now: Instant) -> bool {
        match self.windows.get_mut(identifier) {
            Some(window) if now < window.reset_at => {
                if window.count < self.limit {
                    window.count += 1;
                    true
                } else {
                    debug!(%identifier, count = window.count, "RateLimiter::try_admit_at: window exhausted");
                    false
                }
            }
            _ => {
                self.windows.insert(
                    identifier.to_string(),
                    RateWindow {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }

    /// When `identifier` regains budget, if it is currently exhausted
    pub fn window_reset_at(&self, identifier: &str) -> Option<Instant> {
        self.windows
            .get(identifier)
            .filter(|w| w.count >= self.limit)
            .map(|w| w.reset_at)
    }

    pub fn window(&self, identifier: &str) -> Option<&RateWindow> {
        self.windows.get(identifier)
    }

    /// Whether the next admission for `identifier` would be refused right now
    pub fn is_exhausted(&self, identifier: &str) -> bool {
        self.is_exhausted_at(identifier, Instant::now())
    }

    pub fn is_exhausted_at(&self, identifier: &str, now: Instant) -> bool {
        self.windows
            .get(identifier)
            .is_some_and(|w| now < w.reset_at && w.count >= self.limit)
    }

    pub fn clear(&mut self, identifier: &str) {
        self.windows.remove(identifier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_admits_up_to_limit_then_denies() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(1));
        let now = Instant::now();

        assert!(limiter.try_admit_at("fast", now));
        assert!(limiter.try_admit_at("fast", now));
        assert!(limiter.try_admit_at("fast", now));
        assert!(!limiter.try_admit_at("fast", now));
        assert!(limiter.is_exhausted_at("fast", now));

        // Denial does not mutate the window
        assert_eq!(limiter.window("fast").map(|w| w.count), Some(3));
    }

    #[test]
    fn test_window_resets_after_duration() {
        let mut limiter = RateLimiter::new(2, Duration::from_millis(1000));
        let start = Instant::now();

        assert!(limiter.try_admit_at("slow", start));
        assert!(limiter.try_admit_at("slow", start + Duration::from_millis(10)));
        assert!(!limiter.try_admit_at("slow", start + Duration::from_millis(999)));
        assert_eq!(limiter.window_reset_at("slow"), Some(start + Duration::from_millis(1000)));

        assert!(limiter.try_admit_at("slow", start + Duration::from_millis(1000)));
        let window = limiter.window("slow").unwrap();
        assert_eq!(window.count, 1);
        assert_eq!(window.reset_at, start + Duration::from_millis(2000));
        assert_eq!(limiter.window_reset_at("slow"), None);
    }

    #[test]
    fn test_identifiers_are_independent() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.try_admit_at("a", now));
        assert!(!limiter.try_admit_at("a", now));
        assert!(limiter.try_admit_at("b", now));
        assert!(!limiter.is_exhausted_at("c", now));
    }

    #[test]
    fn test_boundary_burst_is_allowed() {
        let mut limiter = RateLimiter::new(3, Duration::from_millis(100));
        let start = Instant::now();

        // Window opens at t=0; spend the budget at the very end of it
        assert!(limiter.try_admit_at("x", start));
        assert!(limiter.try_admit_at("x", start + Duration::from_millis(99)));
        assert!(limiter.try_admit_at("x", start + Duration::from_millis(99)));

        // And again right after the reset: 5 admissions within ~1ms
        let after = start + Duration::from_millis(100);
        assert!(limiter.try_admit_at("x", after));
        assert!(limiter.try_admit_at("x", after));
        assert!(limiter.try_admit_at("x", after));
        assert!(!limiter.try_admit_at("x", after));
    }

    #[test]
    fn test_clear() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.try_admit_at("a", now));
        limiter.clear("a");
        assert!(limiter.try_admit_at("a", now));
    }

    proptest! {
        #[test]
        fn prop_admissions_bounded_per_window(
            limit in 1u32..6,
            window_ms in 10u64..200,
            gaps in prop::collection::vec(0u64..50, 1..200),
        ) {
            let window = Duration::from_millis(window_ms);
            let mut limiter = RateLimiter::new(limit, window);
            let start = Instant::now();

            let mut now = start;
            let mut admitted = Vec::new();
            for gap in gaps {
                now += Duration::from_millis(gap);
                if limiter.try_admit_at("id", now) {
                    admitted.push(now);
                }
            }

            // Any span of one window length holds at most 2x the limit
            for (i, t) in admitted.iter().enumerate() {
                let in_span = admitted[i..].iter().take_while(|u| **u < *t + window).count();
                prop_assert!(in_span as u32 <= 2 * limit);
            }
        }
    }
}

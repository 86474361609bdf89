//! Sliding-window rate limiter
//!
//! Exact sliding window: each client keeps the timestamps of its admitted
//! requests that are still inside the trailing window. A request is admitted
//! only while fewer than `max_requests` timestamps remain, so no trailing
//! interval of `window` ever holds more than `max_requests` admissions.
//!
//! Memory is O(admitted requests in window) per client. Clients whose window
//! drained are dropped by [`SlidingWindowLimiter::sweep`].
//!
//! The registry sits behind one mutex. Each decision is a few deque pops and
//! a push, so a single lock holds up at dashboard scale.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::{SystemClock, TimeSource};
use crate::error::ValidationError;

/// A (limit, window) pair applied to a group of routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, ValidationError> {
        if max_requests == 0 {
            return Err(ValidationError::TooSmall {
                field: "max_requests",
                min: 1,
            });
        }
        if window.is_zero() {
            return Err(ValidationError::TooSmall {
                field: "window_seconds",
                min: 1,
            });
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window: Duration::from_secs(60),
        }
    }
}

/// Outcome of one admission check, with everything needed for the
/// `X-RateLimit-*` and `Retry-After` headers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix time (seconds) at which the oldest counted request leaves the window.
    pub reset_at: u64,
    /// Seconds until `reset_at`, rounded up. Zero for admitted requests that
    /// still have headroom.
    pub retry_after: u64,
    pub window: Duration,
}

/// Per-client sliding-window limiter.
pub struct SlidingWindowLimiter<C = SystemClock> {
    clock: C,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for SlidingWindowLimiter<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: TimeSource> SlidingWindowLimiter<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether `client_id` may make another request under
    /// `max_requests` per `window`.
    pub fn is_allowed(
        &self,
        client_id: &str,
        max_requests: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let now = self.clock.now();

        let (allowed, remaining, reset) = {
            let mut clients = self.clients.lock();
            let timestamps = clients.entry(client_id.to_string()).or_default();

            prune(timestamps, now, window);

            let count = timestamps.len() as u32;
            let reset = timestamps
                .front()
                .map(|oldest| *oldest + window)
                .unwrap_or(now + window);

            if count >= max_requests {
                (false, 0, reset)
            } else {
                timestamps.push_back(now);
                (true, max_requests - count - 1, reset)
            }
        };

        let retry_after = if allowed {
            0
        } else {
            reset.saturating_duration_since(now).as_secs_f64().ceil() as u64
        };

        if !allowed {
            tracing::debug!(client = client_id, limit = max_requests, retry_after, "rate limit exceeded");
        }

        RateLimitDecision {
            allowed,
            limit: max_requests,
            remaining,
            reset_at: self.clock.unix_seconds_at(reset).ceil().max(0.0) as u64,
            retry_after,
            window,
        }
    }

    /// Convenience wrapper over [`is_allowed`](Self::is_allowed) for a rule.
    pub fn check(&self, client_id: &str, rule: RateLimitRule) -> RateLimitDecision {
        self.is_allowed(client_id, rule.max_requests, rule.window)
    }

    /// Drop clients with no timestamps left inside `window`.
    ///
    /// Returns the number of clients removed.
    pub fn sweep(&self, window: Duration) -> usize {
        let now = self.clock.now();
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, timestamps| {
            prune(timestamps, now, window);
            !timestamps.is_empty()
        });
        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }
}

/// Pop timestamps strictly older than `now - window`.
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = timestamps.front() {
        if now.saturating_duration_since(*front) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    const MINUTE: Duration = Duration::from_secs(60);

    fn limiter() -> (SlidingWindowLimiter<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (SlidingWindowLimiter::with_clock(clock.clone()), clock)
    }

    #[test]
    fn three_per_minute_scenario() {
        let (limiter, _clock) = limiter();

        let remaining: Vec<u32> = (0..3)
            .map(|_| {
                let d = limiter.is_allowed("10.0.0.5", 3, MINUTE);
                assert!(d.allowed);
                d.remaining
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let rejected = limiter.is_allowed("10.0.0.5", 3, MINUTE);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.limit, 3);
        assert!(rejected.retry_after > 0);
        assert_eq!(rejected.retry_after, 60);
    }

    #[test]
    fn admits_exactly_n_in_any_window() {
        let (limiter, clock) = limiter();
        let mut admitted = 0;
        // 10 requests spread over 50 seconds, limit 5 per minute
        for _ in 0..10 {
            if limiter.is_allowed("c", 5, MINUTE).allowed {
                admitted += 1;
            }
            clock.advance(Duration::from_secs(5));
        }
        assert_eq!(admitted, 5);
    }

    #[test]
    fn window_slides_rather_than_resetting() {
        let (limiter, clock) = limiter();
        assert!(limiter.is_allowed("c", 2, MINUTE).allowed); // t=0
        clock.advance(Duration::from_secs(30));
        assert!(limiter.is_allowed("c", 2, MINUTE).allowed); // t=30
        clock.advance(Duration::from_secs(31));
        // t=61: the t=0 request has left, the t=30 one has not
        let d = limiter.is_allowed("c", 2, MINUTE);
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
        assert!(!limiter.is_allowed("c", 2, MINUTE).allowed);
    }

    #[test]
    fn boundary_timestamp_is_still_counted() {
        let (limiter, clock) = limiter();
        assert!(limiter.is_allowed("c", 1, MINUTE).allowed);
        clock.advance(MINUTE);
        // exactly `window` old is not strictly older
        assert!(!limiter.is_allowed("c", 1, MINUTE).allowed);
        clock.advance(Duration::from_millis(1));
        assert!(limiter.is_allowed("c", 1, MINUTE).allowed);
    }

    #[test]
    fn recovers_after_window() {
        let (limiter, clock) = limiter();
        for _ in 0..4 {
            limiter.is_allowed("c", 4, MINUTE);
        }
        assert!(!limiter.is_allowed("c", 4, MINUTE).allowed);

        clock.advance(MINUTE + Duration::from_secs(1));
        let d = limiter.is_allowed("c", 4, MINUTE);
        assert!(d.allowed);
        assert_eq!(d.remaining, 3);
    }

    #[test]
    fn rejected_requests_are_not_recorded() {
        let (limiter, clock) = limiter();
        limiter.is_allowed("c", 1, MINUTE);
        for _ in 0..5 {
            clock.advance(Duration::from_secs(10));
            assert!(!limiter.is_allowed("c", 1, MINUTE).allowed);
        }
        // only the first admission counts, so it frees up at t=60+
        clock.advance(Duration::from_secs(11));
        assert!(limiter.is_allowed("c", 1, MINUTE).allowed);
    }

    #[test]
    fn clients_are_independent() {
        let (limiter, _clock) = limiter();
        assert!(limiter.is_allowed("a", 1, MINUTE).allowed);
        assert!(!limiter.is_allowed("a", 1, MINUTE).allowed);
        assert!(limiter.is_allowed("b", 1, MINUTE).allowed);
    }

    #[test]
    fn reset_tracks_oldest_timestamp() {
        let (limiter, clock) = limiter();
        let first = limiter.is_allowed("c", 3, MINUTE);
        // empty window: reset is now + window
        assert_eq!(first.reset_at, 1_700_000_060);

        clock.advance(Duration::from_secs(20));
        let second = limiter.is_allowed("c", 3, MINUTE);
        // oldest is still the t=0 request
        assert_eq!(second.reset_at, 1_700_000_060);
    }

    #[test]
    fn sweep_drops_idle_clients() {
        let (limiter, clock) = limiter();
        limiter.is_allowed("a", 5, MINUTE);
        clock.advance(Duration::from_secs(40));
        limiter.is_allowed("b", 5, MINUTE);
        assert_eq!(limiter.tracked_clients(), 2);

        clock.advance(Duration::from_secs(30));
        assert_eq!(limiter.sweep(MINUTE), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn rule_validation() {
        assert!(RateLimitRule::new(0, MINUTE).is_err());
        assert!(RateLimitRule::new(3, Duration::ZERO).is_err());
        let rule = RateLimitRule::new(3, MINUTE).unwrap();
        assert_eq!(rule, RateLimitRule::per_minute(3));
    }

    #[test]
    fn concurrent_callers_never_exceed_limit() {
        let limiter = Arc::new(SlidingWindowLimiter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.is_allowed("shared", 100, MINUTE).allowed)
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
    }
}

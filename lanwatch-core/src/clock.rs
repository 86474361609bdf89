//! Time sources for admission control
//!
//! The limiter only needs a monotonic instant for window arithmetic and a
//! wall clock for the `X-RateLimit-Reset` header. Both are behind one trait so
//! tests can step time manually.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

/// Source of "now" for rate limiting.
pub trait TimeSource: Send + Sync {
    /// Monotonic instant used for window bookkeeping.
    fn now(&self) -> Instant;

    /// Wall clock time, used only to report reset times to clients.
    fn wall_now(&self) -> SystemTime {
        SystemTime::now()
    }

    /// Convert a monotonic instant into unix seconds, relative to `now`.
    fn unix_seconds_at(&self, at: Instant) -> f64 {
        let now = self.now();
        let wall = unix_seconds(self.wall_now());
        if at >= now {
            wall + (at - now).as_secs_f64()
        } else {
            wall - (now - at).as_secs_f64()
        }
    }
}

fn unix_seconds(t: SystemTime) -> f64 {
    // Clocks set before 1970 report the epoch.
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
///
/// Cloning shares the underlying time, so a test can keep one handle and give
/// another to the limiter.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<RwLock<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    instant: Instant,
    wall: SystemTime,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }

    /// Start with a fixed wall clock reading.
    pub fn starting_at(wall: SystemTime) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ManualState {
                instant: Instant::now(),
                wall,
            })),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.inner.write();
        state.instant += by;
        state.wall += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Instant {
        self.inner.read().instant
    }

    fn wall_now(&self) -> SystemTime {
        self.inner.read().wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_both_clocks() {
        let clock = ManualClock::new();
        let start = clock.now();
        let wall = clock.wall_now();

        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.now() - start, Duration::from_secs(90));
        assert_eq!(
            clock.wall_now().duration_since(wall).unwrap(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn clones_share_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), handle.now());
    }

    #[test]
    fn unix_seconds_at_future_instant() {
        let clock = ManualClock::new();
        let at = clock.now() + Duration::from_secs(60);
        assert_eq!(clock.unix_seconds_at(at), 1_700_000_060.0);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}

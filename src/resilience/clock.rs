//! Time abstraction for deterministic resilience tests
//!
//! The circuit breaker's Open→HalfOpen transition depends on elapsed time.
//! Abstracting the monotonic clock lets production code use real time while
//! tests drive the transition with a controlled mock, without real waits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time source for resilience components.
pub trait Clock: Send + Sync + 'static {
    /// Current instant (monotonic time)
    fn now(&self) -> Instant;
}

/// Real system clock for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Mock clock for deterministic testing.
///
/// Clones share the same elapsed counter, so a test can hold one handle
/// while the component under test holds another.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock anchored at the current instant with zero elapsed
    /// time.
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the clock by `duration` without any real delay.
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Advance the clock by milliseconds (convenience method).
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Current elapsed time.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock()
    }
}

//! Resilience primitives for calls to unreliable dependencies
//!
//! Two composable mechanisms:
//!
//! - [`RetryPolicy`]: re-invoke a failed operation with fixed or
//!   exponential backoff, optionally gated by a [`RetryCondition`]
//!   predicate. Operation errors pass through unchanged.
//! - [`CircuitBreaker`]: stop calling a dependency that keeps failing,
//!   probe it with a single trial call after a cool-down, and surface
//!   rejections as [`ResilienceError::CircuitOpen`].
//!
//! They nest naturally: a breaker-guarded call can be the operation a
//! retry policy executes, or vice versa, depending on whether retries
//! should count against the breaker's failure threshold.
//!
//! The [`Clock`] trait decouples the breaker's timeout logic from real
//! time; [`MockClock`] drives state transitions deterministically in tests.

pub mod circuit_breaker;
pub mod clock;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState, ConfigError, ConfigResult, ResilienceError, ResilienceResult,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use retry::{transient_only, RetryCondition, RetryPolicy, RetryPolicyBuilder};

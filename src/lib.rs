//! Resilience and error-handling toolkit for chat bot frameworks.
//!
//! The crate is built around a closed error taxonomy ([`BotError`]) and the
//! three patterns that consume it:
//! - **Retry**: bounded retry with optional exponential backoff, gated by a
//!   caller-supplied predicate ([`resilience::retry`])
//! - **Circuit Breaker**: a three-state failure gate protecting a single
//!   downstream dependency ([`resilience::circuit_breaker`])
//! - **Error dispatch**: a registry routing errors to per-kind and global
//!   handlers for centralized observation ([`error::manager`])
//!
//! Retry state is call-local; breaker state is shared per protected
//! dependency; the dispatch registry is an explicitly constructed object
//! passed to the call sites that need it.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod resilience;

// Re-export commonly used types for convenience
pub use error::manager::{tracing_handler, DispatchContext, ErrorHandler, ErrorManager};
pub use error::{BotError, ErrorDetails, ErrorKind, ErrorRecord, ErrorSeverity};
pub use resilience::{
    transient_only, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerMetrics, CircuitState, Clock, ConfigError, ConfigResult, MockClock,
    ResilienceError, ResilienceResult, RetryCondition, RetryPolicy, RetryPolicyBuilder,
    SystemClock,
};

//! Three-state circuit breaker protecting a downstream dependency
//!
//! One breaker instance guards exactly one external dependency. Sharing an
//! instance across unrelated dependencies would conflate their fault
//! domains, so don't.
//!
//! States:
//! - `CLOSED` (initial): calls pass through; failures increment a
//!   consecutive-failure count, and reaching the threshold trips to `OPEN`.
//! - `OPEN`: calls are rejected immediately with a distinguished
//!   [`ResilienceError::CircuitOpen`] without invoking the operation. Once
//!   `open_timeout` has elapsed since the last failure, the next call is
//!   evaluated in `HALF_OPEN`.
//! - `HALF_OPEN`: exactly one trial call is admitted. Success closes the
//!   circuit and resets the failure count; failure reopens it. Concurrent
//!   calls during an in-flight trial are rejected exactly as in `OPEN`.
//!
//! Every transition, including trial admission, happens inside a single
//! mutex-guarded critical section, so two simultaneous callers can never
//! both be the trial.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};

/// Configuration validation error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Failure surface of a breaker-guarded call.
///
/// Generic over the operation's error type `E` so the original failure is
/// carried through unmodified. The only synthetic variant is `CircuitOpen`,
/// the breaker's own rejection, which has no underlying cause.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open, rejecting calls
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen,

    /// The wrapped operation failed; the original error is the source
    #[error("Operation failed")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Recover the original operation error, if any.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::CircuitOpen => None,
            Self::OperationFailed { source } => Some(source),
        }
    }
}

/// Result type for breaker-guarded operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, admitting a single trial request
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit trips open
    pub failure_threshold: u32,
    /// Time to wait in open state before admitting a trial call
    pub open_timeout: Duration,
    /// Reserved: accepted for interface compatibility but currently has no
    /// behavioral effect. The source contract names the parameter without
    /// specifying its semantics, and inventing a sliding window here would
    /// change failure accounting.
    pub monitoring_period: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
            monitoring_period: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    pub fn monitoring_period(mut self, period: Duration) -> Self {
        self.config.monitoring_period = Some(period);
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Snapshot of breaker state for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub last_failure_time: Option<Instant>,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    trial_started: Option<Instant>,
}

/// Circuit breaker guarding a single downstream dependency.
///
/// Clones share state, so a breaker can be handed to several tasks that
/// call the same dependency. Supports both async ([`execute`](Self::execute))
/// and sync ([`call`](Self::call)) operations, with a pluggable [`Clock`]
/// for deterministic tests.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
    total_calls: Arc<AtomicU64>,
    rejected_calls: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            total_calls: Arc::clone(&self.total_calls),
            rejected_calls: Arc::clone(&self.rejected_calls),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker with the given configuration using the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a breaker with default configuration
    pub fn with_defaults() -> Self {
        match Self::new(CircuitBreakerConfig::default()) {
            Ok(breaker) => breaker,
            // Default config passes its own validation
            Err(_) => unreachable!("default circuit breaker config is valid"),
        }
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                trial_started: None,
            })),
            total_calls: Arc::new(AtomicU64::new(0)),
            rejected_calls: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        })
    }

    /// Admission decision for one call, claiming the trial slot when the
    /// circuit is half-open.
    ///
    /// Open→HalfOpen and trial admission happen in the same critical
    /// section, so only one caller can ever hold the trial.
    fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let timeout_elapsed = inner
                    .last_failure_time
                    .is_some_and(|t| now.duration_since(t) >= self.config.open_timeout);
                if timeout_elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started = Some(now);
                    info!("Circuit breaker half-open, admitting trial call");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => match inner.trial_started {
                None => {
                    inner.trial_started = Some(now);
                    true
                }
                // A trial whose caller was cancelled would otherwise wedge
                // the breaker; a trial older than open_timeout is expired
                // and may be taken over.
                Some(started) if now.duration_since(started) >= self.config.open_timeout => {
                    inner.trial_started = Some(now);
                    warn!("Circuit breaker trial call expired, admitting replacement");
                    true
                }
                Some(_) => false,
            },
        }
    }

    /// Fast check whether the circuit is currently rejecting calls.
    ///
    /// A pure read: does not transition state and does not claim the trial
    /// slot.
    pub fn is_available(&self) -> bool {
        self.inner.lock().state != CircuitState::Open
    }

    /// Execute an async operation under breaker protection.
    ///
    /// Returns the operation's result on success. On failure the original
    /// error is re-raised as [`ResilienceError::OperationFailed`]; a
    /// rejection while open yields [`ResilienceError::CircuitOpen`] without
    /// invoking the operation.
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.try_acquire() {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            debug!("Circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen);
        }

        self.total_calls.fetch_add(1, Ordering::Relaxed);

        match operation().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                warn!("Circuit breaker: operation failed");
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Execute a synchronous operation under breaker protection.
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.try_acquire() {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            debug!("Circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen);
        }

        self.total_calls.fetch_add(1, Ordering::Relaxed);

        match operation() {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                warn!("Circuit breaker: operation failed");
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Record a successful operation.
    ///
    /// In closed state this resets the consecutive-failure count; a
    /// successful half-open trial closes the circuit.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.last_failure_time = None;
                inner.trial_started = None;
                info!("Circuit breaker closed after successful trial call");
            }
            CircuitState::Open => {
                warn!("Received success while circuit is open");
            }
        }
    }

    /// Record a failed operation.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(now);
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(failures = inner.failure_count, "Circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.last_failure_time = Some(now);
                inner.trial_started = None;
                warn!("Circuit breaker reopened after failed trial call");
            }
            CircuitState::Open => {
                // Rejected callers never reach here; a straggler's failure
                // must not extend the open window.
            }
        }
    }

    /// Current circuit state (pure read)
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            state: inner.state,
            failure_count: inner.failure_count,
            total_calls: self.total_calls.load(Ordering::Acquire),
            rejected_calls: self.rejected_calls.load(Ordering::Acquire),
            last_failure_time: inner.last_failure_time,
        }
    }

    /// Force the breaker to closed with zero failures, from any state.
    ///
    /// An administrative override, not a normal transition.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        inner.trial_started = None;
        info!("Circuit breaker manually reset to closed state");
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

//! Retry with configurable backoff
//!
//! [`RetryPolicy`] wraps a fallible async operation and re-invokes it until
//! it succeeds, a non-retryable error occurs, or the attempt budget is
//! spent. The budget is `max_retries + 1` total attempts: the initial call
//! plus up to `max_retries` retries.
//!
//! Backoff is fixed (`delay` between every pair of attempts) or exponential
//! (`delay` doubling after each failed attempt, so the wait before attempt
//! `k` is `delay * 2^(k-2)`). An optional [`RetryCondition`] predicate is
//! consulted after each failure; returning `false` stops retrying and the
//! error from that attempt is propagated to the caller unchanged. Retry
//! never wraps, converts, or annotates operation errors.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::BotError;

/// Predicate deciding whether a failed attempt should be retried.
///
/// A first-class function value rather than a fixed error-classification
/// scheme, so callers can express arbitrary retryability rules.
pub type RetryCondition<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Condition that retries only errors the taxonomy marks transient.
///
/// Currently that is connection errors flagged retryable; everything else
/// fails fast.
pub fn transient_only() -> RetryCondition<BotError> {
    Arc::new(|error: &BotError| error.is_retryable())
}

/// Policy describing how to retry a fallible operation.
pub struct RetryPolicy<E> {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Base delay between attempts
    pub delay: Duration,
    /// Double the delay after each failed attempt
    pub exponential_backoff: bool,
    /// Optional predicate limiting which errors are retried; `None` retries
    /// every error
    pub retry_condition: Option<RetryCondition<E>>,
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1000),
            exponential_backoff: false,
            retry_condition: None,
        }
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            delay: self.delay,
            exponential_backoff: self.exponential_backoff,
            retry_condition: self.retry_condition.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .field("exponential_backoff", &self.exponential_backoff)
            .field("retry_condition", &self.retry_condition.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl<E> RetryPolicy<E> {
    /// Create a policy builder
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Delay to wait after `failed_attempt` (1-based) before the next
    /// attempt.
    fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return self.delay;
        }
        let exponent = failed_attempt.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let millis = (self.delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis)
    }

    /// Execute `operation`, retrying per this policy.
    ///
    /// Returns the first `Ok`, or the error of the final attempt unchanged.
    /// An error rejected by the retry condition is returned immediately,
    /// also unchanged.
    #[instrument(skip(self, operation), fields(max_retries = self.max_retries))]
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let attempts = self.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let retryable =
                        self.retry_condition.as_ref().map_or(true, |condition| condition(&error));
                    if !retryable {
                        debug!(attempt, "Error not retryable, giving up");
                        return Err(error);
                    }
                    if attempt >= attempts {
                        warn!(attempt, "All retry attempts exhausted");
                        return Err(error);
                    }

                    let wait = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        error = %error,
                        wait_ms = wait.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Execute `operation` with retries, aborting between attempts when
    /// `token` is cancelled.
    ///
    /// Cancellation is observed before each attempt and during backoff
    /// sleeps; an attempt already in flight runs to completion. A cancelled
    /// run yields a timeout error carrying the elapsed time.
    #[instrument(skip(self, token, operation), fields(max_retries = self.max_retries))]
    pub async fn execute_cancellable<F, Fut, T>(
        &self,
        token: &CancellationToken,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BotError> + fmt::Display,
    {
        let start = Instant::now();
        let attempts = self.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            if token.is_cancelled() {
                debug!(attempt, "Retry cancelled before attempt");
                return Err(BotError::timeout("retry cancelled", start.elapsed()).into());
            }

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let retryable =
                        self.retry_condition.as_ref().map_or(true, |condition| condition(&error));
                    if !retryable {
                        debug!(attempt, "Error not retryable, giving up");
                        return Err(error);
                    }
                    if attempt >= attempts {
                        warn!(attempt, "All retry attempts exhausted");
                        return Err(error);
                    }

                    let wait = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        error = %error,
                        wait_ms = wait.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(attempt, "Retry cancelled during backoff");
                            return Err(
                                BotError::timeout("retry cancelled", start.elapsed()).into(),
                            );
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Builder for [`RetryPolicy`]
pub struct RetryPolicyBuilder<E> {
    policy: RetryPolicy<E>,
}

impl<E> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self { policy: RetryPolicy::default() }
    }
}

impl<E> RetryPolicyBuilder<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.policy.delay = delay;
        self
    }

    pub fn exponential_backoff(mut self, enabled: bool) -> Self {
        self.policy.exponential_backoff = enabled;
        self
    }

    pub fn retry_if(mut self, condition: RetryCondition<E>) -> Self {
        self.policy.retry_condition = Some(condition);
        self
    }

    pub fn build(self) -> RetryPolicy<E> {
        self.policy
    }
}

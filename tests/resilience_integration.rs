//! Integration tests for the resilience primitives
//!
//! Exercises retry and circuit breaker end to end through the public API,
//! including their composition and deterministic breaker timing via the
//! mock clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use botguard::{
    transient_only, BotError, CircuitBreaker, CircuitBreakerConfig, CircuitState, MockClock,
    ResilienceError, RetryPolicy,
};
use tokio_util::sync::CancellationToken;

/// Validates retry with exponential backoff recovering from transient
/// failures.
///
/// # Test Steps
/// 1. Configure a 10ms base delay with exponential backoff
/// 2. Fail the first 3 attempts, succeed on the 4th
/// 3. Confirm exactly 4 attempts were made
/// 4. Confirm the waits summed to at least 10 + 20 + 40 = 70ms
#[tokio::test(flavor = "multi_thread")]
async fn test_retry_exponential_backoff_success() {
    let attempt_count = Arc::new(AtomicU32::new(0));
    let attempt_count_clone = Arc::clone(&attempt_count);

    let policy: RetryPolicy<BotError> = RetryPolicy::builder()
        .max_retries(5)
        .delay(Duration::from_millis(10))
        .exponential_backoff(true)
        .build();

    let started = Instant::now();
    let result = policy
        .execute(move || {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 3 {
                    Err(BotError::connection("transient failure", true))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

    assert_eq!(result.expect("Should succeed"), "success");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 4);
    assert!(started.elapsed() >= Duration::from_millis(70));
}

/// Validates retry gives up after the attempt budget and propagates the
/// final error unchanged.
///
/// # Test Steps
/// 1. Configure max_retries = 2 (three attempts total)
/// 2. Fail every attempt with a connection error
/// 3. Confirm three attempts, then the original error back verbatim
#[tokio::test(flavor = "multi_thread")]
async fn test_retry_exhaustion_propagates_original_error() {
    let attempt_count = Arc::new(AtomicU32::new(0));
    let attempt_count_clone = Arc::clone(&attempt_count);

    let policy: RetryPolicy<BotError> =
        RetryPolicy::builder().max_retries(2).delay(Duration::from_millis(5)).build();

    let result: Result<(), BotError> = policy
        .execute(move || {
            attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            async { Err(BotError::connection("persistent failure", true)) }
        })
        .await;

    let error = result.expect_err("Should exhaust retries");
    assert_eq!(error.to_string(), "[CONNECTION_ERROR] persistent failure");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

/// Validates the transient-only condition distinguishing retryable from
/// permanent errors.
///
/// # Test Steps
/// 1. Retry with the transient_only condition
/// 2. A non-retryable connection error fails on the first attempt
/// 3. A retryable connection error is retried to success
#[tokio::test(flavor = "multi_thread")]
async fn test_retry_condition_selects_errors() {
    let policy: RetryPolicy<BotError> = RetryPolicy::builder()
        .max_retries(4)
        .delay(Duration::from_millis(5))
        .retry_if(transient_only())
        .build();

    let permanent_calls = Arc::new(AtomicU32::new(0));
    let permanent_clone = Arc::clone(&permanent_calls);
    let result: Result<(), BotError> = policy
        .execute(move || {
            permanent_clone.fetch_add(1, Ordering::SeqCst);
            async { Err(BotError::connection("authentication rejected", false)) }
        })
        .await;
    assert!(result.is_err());
    assert_eq!(permanent_calls.load(Ordering::SeqCst), 1);

    let transient_calls = Arc::new(AtomicU32::new(0));
    let transient_clone = Arc::clone(&transient_calls);
    let result = policy
        .execute(move || {
            let count = transient_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(BotError::connection("socket reset", true))
                } else {
                    Ok(count)
                }
            }
        })
        .await;
    assert_eq!(result.expect("Should recover"), 2);
    assert_eq!(transient_calls.load(Ordering::SeqCst), 3);
}

/// Validates the full breaker lifecycle with the documented defaults-style
/// configuration (threshold 5, 60s open timeout).
///
/// # Test Steps
/// 1. Fail five consecutive calls, tripping the circuit
/// 2. Confirm the sixth call is rejected without invoking the operation
/// 3. Advance the mock clock past the open timeout
/// 4. Confirm the next call runs as the trial and closes the circuit
#[tokio::test(flavor = "multi_thread")]
async fn test_circuit_breaker_lifecycle() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(5)
        .open_timeout(Duration::from_secs(60))
        .build()
        .expect("Failed to build config");
    let breaker = CircuitBreaker::with_clock(config, clock.clone()).expect("Failed to build");

    for _ in 0..5 {
        let result: Result<(), ResilienceError<BotError>> = breaker
            .execute(|| async { Err(BotError::connection("service down", true)) })
            .await;
        assert!(matches!(result, Err(ResilienceError::OperationFailed { .. })));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let invoked = Arc::new(AtomicU32::new(0));
    let invoked_clone = Arc::clone(&invoked);
    let result: Result<u32, ResilienceError<BotError>> = breaker
        .execute(move || async move {
            invoked_clone.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
        .await;
    assert!(matches!(result, Err(ResilienceError::CircuitOpen)));
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    clock.advance_millis(60_001);
    let result: Result<u32, ResilienceError<BotError>> = breaker.execute(|| async { Ok(42) }).await;
    assert_eq!(result.expect("Trial call should run"), 42);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.metrics().failure_count, 0);
}

/// Validates that a failed trial call reopens the circuit for a full
/// timeout window.
#[tokio::test(flavor = "multi_thread")]
async fn test_circuit_breaker_failed_trial_reopens() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(1)
        .open_timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build config");
    let breaker = CircuitBreaker::with_clock(config, clock.clone()).expect("Failed to build");

    let _: Result<(), ResilienceError<BotError>> =
        breaker.execute(|| async { Err(BotError::connection("down", true)) }).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance_millis(30_001);
    let result: Result<(), ResilienceError<BotError>> =
        breaker.execute(|| async { Err(BotError::connection("still down", true)) }).await;
    assert!(matches!(result, Err(ResilienceError::OperationFailed { .. })));
    assert_eq!(breaker.state(), CircuitState::Open);

    // The new window starts at the trial failure
    clock.advance_millis(15_000);
    let result: Result<u32, ResilienceError<BotError>> = breaker.execute(|| async { Ok(1) }).await;
    assert!(matches!(result, Err(ResilienceError::CircuitOpen)));
}

/// Validates single-trial admission under concurrency.
///
/// # Test Steps
/// 1. Trip the breaker, then advance past the open timeout
/// 2. Start a trial call that blocks on a oneshot gate
/// 3. Confirm a second concurrent call is rejected while the trial runs
/// 4. Release the gate and confirm the trial's success closes the circuit
#[tokio::test(flavor = "multi_thread")]
async fn test_circuit_breaker_single_trial_under_concurrency() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(1)
        .open_timeout(Duration::from_secs(60))
        .build()
        .expect("Failed to build config");
    let breaker = CircuitBreaker::with_clock(config, clock.clone()).expect("Failed to build");

    breaker.record_failure();
    clock.advance_millis(60_001);

    let (release, gate) = tokio::sync::oneshot::channel::<()>();
    let trial_breaker = breaker.clone();
    let trial = tokio::spawn(async move {
        trial_breaker
            .execute(|| async move {
                gate.await.expect("gate sender dropped");
                Ok::<_, BotError>("trial done")
            })
            .await
    });

    // Give the trial task time to claim the slot
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let result: Result<u32, ResilienceError<BotError>> = breaker.execute(|| async { Ok(2) }).await;
    assert!(matches!(result, Err(ResilienceError::CircuitOpen)));

    release.send(()).expect("trial task should be waiting");
    let trial_result = trial.await.expect("trial task should not panic");
    assert_eq!(trial_result.expect("trial should succeed"), "trial done");
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Validates composing retry around a breaker-guarded call.
///
/// # Test Steps
/// 1. Guard a flaky operation with a breaker (threshold high enough not to
///    trip)
/// 2. Drive it with a retry policy
/// 3. Confirm the composed call recovers and the breaker stays closed
#[tokio::test(flavor = "multi_thread")]
async fn test_retry_wrapping_circuit_breaker() {
    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig::builder()
            .failure_threshold(10)
            .open_timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build config"),
    )
    .expect("Failed to build");

    let attempt_count = Arc::new(AtomicU32::new(0));
    let attempt_count_clone = Arc::clone(&attempt_count);

    let policy: RetryPolicy<ResilienceError<BotError>> =
        RetryPolicy::builder().max_retries(4).delay(Duration::from_millis(5)).build();

    let result = policy
        .execute(|| {
            let breaker = breaker.clone();
            let attempts = Arc::clone(&attempt_count_clone);
            async move {
                breaker
                    .execute(|| async move {
                        let count = attempts.fetch_add(1, Ordering::SeqCst);
                        if count < 2 {
                            Err(BotError::connection("flaky", true))
                        } else {
                            Ok("recovered")
                        }
                    })
                    .await
            }
        })
        .await;

    assert_eq!(result.expect("Should recover"), "recovered");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Validates cancellation interrupting a long backoff sleep.
#[tokio::test(flavor = "multi_thread")]
async fn test_cancellation_interrupts_backoff() {
    let token = CancellationToken::new();
    let policy: RetryPolicy<BotError> =
        RetryPolicy::builder().max_retries(3).delay(Duration::from_secs(60)).build();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let result: Result<(), BotError> = policy
        .execute_cancellable(&token, || async { Err(BotError::connection("down", true)) })
        .await;

    assert!(result.is_err());
    // Must return long before the 60s backoff would elapse
    assert!(started.elapsed() < Duration::from_secs(5));
}

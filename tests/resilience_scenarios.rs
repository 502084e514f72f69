//! End-to-end resilience scenarios
//!
//! Exercises the full retry + circuit breaker + fallback composition the
//! way a client wrapping an unreliable dependency would use it:
//!
//! 1. Breaker lifecycle: trip on sustained failures, fail fast while open,
//!    probe after the reset timeout, close on a successful trial
//! 2. Backoff cadence: exponential delays between attempts, verified under
//!    a paused clock
//! 3. Degraded service: fallbacks consulted in order once the primary path
//!    is exhausted
//! 4. Half-open exclusivity under concurrent callers
//! 5. Cancellation of an in-flight attempt

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ballast::error::preclassified;
use ballast::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ClassifiedError, Jitter, ResilienceError,
    ResilientExecutor, RetryPolicy,
};

fn single_attempt() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        ..Default::default()
    }
}

/// Breaker with max_failures=3 and reset_timeout=5s: three failures open
/// the circuit, a fourth call fails fast without touching the operation,
/// and after the timeout a successful probe closes it again.
#[tokio::test(start_paused = true)]
async fn test_breaker_lifecycle_end_to_end() {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        max_failures: 3,
        reset_timeout: Duration::from_secs(5),
    })
    .unwrap();

    let invocations = Arc::new(AtomicU32::new(0));
    let executor = ResilientExecutor::builder()
        .retry_policy(single_attempt())
        .circuit_breaker(breaker.clone())
        .classifier(preclassified)
        .build()
        .unwrap();

    // Three failing calls trip the breaker.
    for _ in 0..3 {
        let counter = invocations.clone();
        let err = executor
            .execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(ClassifiedError::transient("backend down")) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::Operation(_)));
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.state().await, CircuitState::Open);

    // Fourth call inside the window fails fast; the operation never runs.
    let counter = invocations.clone();
    let err = executor
        .execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<u32, ClassifiedError>(1) }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ResilienceError::CircuitOpen));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    // After the reset timeout the next call becomes the half-open trial.
    tokio::time::advance(Duration::from_secs(5)).await;
    let counter = invocations.clone();
    let value = executor
        .execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<u32, ClassifiedError>(99) }
        })
        .await
        .unwrap();

    assert_eq!(value, 99);
    assert_eq!(invocations.load(Ordering::SeqCst), 4);
    assert_eq!(breaker.state().await, CircuitState::Closed);
    assert_eq!(breaker.failure_count().await, 0);
}

/// max_attempts=3, base=100ms, multiplier=2: an always-failing operation is
/// tried exactly three times with ~100ms then ~200ms delays in between.
#[tokio::test(start_paused = true)]
async fn test_backoff_cadence() {
    let attempts = Arc::new(AtomicU32::new(0));
    let executor = ResilientExecutor::builder()
        .retry_policy(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: Jitter::None,
            retry_on: None,
        })
        .classifier(preclassified)
        .build()
        .unwrap();

    let start = tokio::time::Instant::now();
    let counter = attempts.clone();
    let err = executor
        .execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(ClassifiedError::transient("still failing")) }
        })
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(matches!(err, ResilienceError::Operation(_)));
    // 100ms + 200ms of backoff under the paused clock.
    assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "elapsed {elapsed:?}");
}

/// Primary exhausted with two fallbacks: the first fails, the second serves
/// a degraded value, and no further fallback is consulted.
#[tokio::test(start_paused = true)]
async fn test_degraded_service_fallback() {
    let third_called = Arc::new(AtomicU32::new(0));

    let executor = {
        let third_called = third_called.clone();
        ResilientExecutor::builder()
            .retry_policy(RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(10),
                ..Default::default()
            })
            .classifier(preclassified)
            .fallback(|| async { Err(ClassifiedError::transient("cache cold")) })
            .fallback(|| async { Ok("served from replica".to_string()) })
            .fallback(move || {
                third_called.fetch_add(1, Ordering::SeqCst);
                async { Ok("never reached".to_string()) }
            })
            .build()
            .unwrap()
    };

    let value = executor
        .execute(|| async { Err::<String, _>(ClassifiedError::timeout("primary timed out")) })
        .await
        .unwrap();

    assert_eq!(value, "served from replica");
    assert_eq!(third_called.load(Ordering::SeqCst), 0);
}

/// When everything fails, the terminal error carries the whole causal
/// chain: last fallback, earlier fallbacks, and the primary failure.
#[tokio::test(start_paused = true)]
async fn test_total_failure_preserves_provenance() {
    let executor = ResilientExecutor::builder()
        .retry_policy(single_attempt())
        .classifier(preclassified)
        .fallback(|| async { Err::<u32, _>(ClassifiedError::transient("cache miss")) })
        .fallback(|| async { Err::<u32, _>(ClassifiedError::transient("replica down")) })
        .build()
        .unwrap();

    let err = executor
        .execute(|| async { Err::<u32, _>(ClassifiedError::permanent("schema mismatch")) })
        .await
        .unwrap_err();

    match err {
        ResilienceError::FallbacksExhausted {
            last,
            earlier,
            primary,
        } => {
            assert_eq!(last.message(), "replica down");
            assert_eq!(earlier.len(), 1);
            assert_eq!(earlier[0].message(), "cache miss");
            match *primary {
                ResilienceError::Operation(ref e) => {
                    assert_eq!(e.message(), "schema mismatch")
                }
                ref other => panic!("expected Operation primary, got {other:?}"),
            }
        }
        other => panic!("expected FallbacksExhausted, got {other:?}"),
    }
}

/// Many concurrent callers observing a half-open breaker: exactly one is
/// granted the trial request, the rest are rejected as if still open.
#[tokio::test(start_paused = true)]
async fn test_half_open_grants_exactly_one_trial() {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        max_failures: 1,
        reset_timeout: Duration::from_millis(50),
    })
    .unwrap();

    breaker.record_failure().await;
    assert_eq!(breaker.state().await, CircuitState::Open);
    tokio::time::advance(Duration::from_millis(50)).await;

    let granted = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let breaker = breaker.clone();
        let granted = granted.clone();
        handles.push(tokio::spawn(async move {
            if breaker.allow_request().await {
                granted.fetch_add(1, Ordering::SeqCst);
                // Simulate a slow trial; nobody else may enter meanwhile.
                tokio::task::yield_now().await;
                breaker.record_success().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(granted.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.state().await, CircuitState::Closed);
}

/// Cancelling while the operation is in flight: the call returns Cancelled,
/// the half-open probe slot is released, and the breaker is not charged.
#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_releases_probe() {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        max_failures: 1,
        reset_timeout: Duration::from_millis(50),
    })
    .unwrap();
    breaker.record_failure().await;
    tokio::time::advance(Duration::from_millis(50)).await;

    let executor = ResilientExecutor::builder()
        .retry_policy(single_attempt())
        .circuit_breaker(breaker.clone())
        .classifier(preclassified)
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let handle = {
        let token = token.clone();
        let executor = ResilientExecutor::builder()
            .retry_policy(single_attempt())
            .circuit_breaker(breaker.clone())
            .classifier(preclassified)
            .build()
            .unwrap();
        tokio::spawn(async move {
            executor
                .execute_cancellable(
                    || async {
                        // Hangs until cancelled.
                        std::future::pending::<Result<u32, ClassifiedError>>().await
                    },
                    &token,
                )
                .await
        })
    };

    // Give the trial a chance to start, then abort it.
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    token.cancel();
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(ResilienceError::Cancelled)));

    // The probe slot was released: the next caller becomes the new trial.
    let value = executor
        .execute(|| async { Ok::<u32, ClassifiedError>(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);
    assert_eq!(breaker.state().await, CircuitState::Closed);
}

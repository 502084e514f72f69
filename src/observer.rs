//! Observability hooks for resilient execution
//!
//! The executor and circuit breaker report retries, fallback invocations,
//! and breaker state transitions through a [`ResilienceObserver`]. Hooks are
//! fire-and-forget: every method is infallible by signature and defaults to
//! a no-op, so observer behavior can never alter the executor's control
//! flow. Implementations should be cheap; heavy work belongs on a channel.

use crate::circuit_breaker::CircuitState;
use crate::error::ClassifiedError;

/// Receiver for resilience events.
///
/// All methods have no-op defaults; implement only what you need.
pub trait ResilienceObserver: Send + Sync {
    /// The circuit breaker moved from one state to another.
    fn on_state_change(&self, from: CircuitState, to: CircuitState) {
        let _ = (from, to);
    }

    /// Attempt `attempt` (1-indexed) failed and a retry is scheduled.
    fn on_retry(&self, attempt: u32, error: &ClassifiedError) {
        let _ = (attempt, error);
    }

    /// The fallback at `index` (0-indexed, registration order) failed.
    fn on_fallback(&self, index: usize, error: &ClassifiedError) {
        let _ = (index, error);
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ResilienceObserver for NoopObserver {}

/// Observer that emits `tracing` events.
///
/// Breaker recovery is logged at info, degradation at warn, individual
/// retry and fallback attempts at debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ResilienceObserver for TracingObserver {
    fn on_state_change(&self, from: CircuitState, to: CircuitState) {
        match to {
            CircuitState::Closed => {
                tracing::info!(%from, %to, "circuit breaker closed");
            }
            CircuitState::Open => {
                tracing::warn!(%from, %to, "circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                tracing::info!(%from, %to, "circuit breaker probing for recovery");
            }
        }
    }

    fn on_retry(&self, attempt: u32, error: &ClassifiedError) {
        tracing::debug!(attempt, kind = %error.kind(), error = %error, "retrying after failure");
    }

    fn on_fallback(&self, index: usize, error: &ClassifiedError) {
        tracing::debug!(index, kind = %error.kind(), error = %error, "fallback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_observer_accepts_events() {
        let observer = NoopObserver;
        observer.on_state_change(CircuitState::Closed, CircuitState::Open);
        observer.on_retry(1, &ClassifiedError::transient("flaky"));
        observer.on_fallback(0, &ClassifiedError::transient("cache miss"));
    }
}

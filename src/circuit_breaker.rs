//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a
//! dependency is experiencing issues. It has three states:
//! - Closed: Normal operation, requests pass through
//! - Open: Dependency is unhealthy, requests fail immediately
//! - HalfOpen: Testing if the dependency has recovered
//!
//! # State Transitions
//!
//! ```text
//! Closed → Open: max_failures consecutive failures
//! Open → HalfOpen: reset_timeout elapsed (lazy, on next allow_request)
//! HalfOpen → Closed: the single trial request succeeds
//! HalfOpen → Open: the single trial request fails
//! ```
//!
//! # Key Concepts
//!
//! - **Lazy probing**: the Open → HalfOpen transition happens on the next
//!   `allow_request` after the timeout, no background timer is involved
//! - **Single trial**: HalfOpen admits exactly one in-flight probe; every
//!   other caller is rejected as if the circuit were still Open until the
//!   probe resolves
//! - **Shared per dependency**: one breaker instance guards one dependency;
//!   `Clone` shares the same state, so concurrent callers cooperate

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ResilienceError;
use crate::observer::{NoopObserver, ResilienceObserver};

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally.
    Closed,
    /// Circuit is open, requests fail immediately.
    Open,
    /// Circuit is half-open, testing dependency recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed state before the circuit opens.
    /// Must be at least 1.
    pub max_failures: u32,

    /// How long the circuit stays Open before admitting a probe.
    ///
    /// A zero timeout is legal but degrades the breaker to "probe
    /// immediately after opening", which defeats its purpose.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Check the configuration parameters.
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.max_failures == 0 {
            return Err(ResilienceError::InvalidConfig(
                "max_failures must be at least 1: a zero threshold would trip \
                 the breaker before any request is allowed"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Internal state of the circuit breaker.
#[derive(Debug, Clone, Copy)]
enum InnerState {
    Closed,
    /// Open until the deadline, after which the next request may probe.
    Open { until: Instant },
    /// Probing; at most one trial request is in flight at a time.
    HalfOpen { probe_in_flight: bool },
}

impl InnerState {
    fn public(&self) -> CircuitState {
        match self {
            InnerState::Closed => CircuitState::Closed,
            InnerState::Open { .. } => CircuitState::Open,
            InnerState::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: InnerState,
    consecutive_failures: u32,
}

/// Circuit breaker guarding a single dependency.
///
/// Mutated only through its own `allow_request` / `record_success` /
/// `record_failure` operations; all state lives behind one mutex, so
/// concurrent callers racing to trip or reset the breaker cannot corrupt
/// the failure count or observe an invalid transition.
///
/// # Example
/// ```no_run
/// use ballast::{CircuitBreaker, CircuitBreakerConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), ballast::ResilienceError> {
/// let breaker = CircuitBreaker::new(CircuitBreakerConfig::default())?;
///
/// if breaker.allow_request().await {
///     // run the protected operation, then:
///     breaker.record_success().await;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<Mutex<Inner>>,
    observer: Arc<dyn ResilienceObserver>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("inner", &self.inner)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ResilienceError> {
        Self::with_observer(config, Arc::new(NoopObserver))
    }

    /// Create a circuit breaker that reports state transitions to `observer`.
    pub fn with_observer(
        config: CircuitBreakerConfig,
        observer: Arc<dyn ResilienceObserver>,
    ) -> Result<Self, ResilienceError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner {
                state: InnerState::Closed,
                consecutive_failures: 0,
            })),
            observer,
        })
    }

    /// Snapshot of the current state.
    ///
    /// Purely observational: an expired Open deadline is still reported as
    /// Open until the next `allow_request` performs the lazy transition.
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state.public()
    }

    /// Current consecutive failure count.
    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.consecutive_failures
    }

    /// Whether a request may proceed right now.
    ///
    /// Performs the lazy Open → HalfOpen transition when the reset timeout
    /// has elapsed; the caller that triggers it becomes the single trial.
    /// A `true` return must be matched by exactly one `record_success`,
    /// `record_failure`, or `record_abandoned` call.
    pub async fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().await;

        match inner.state {
            InnerState::Closed => true,
            InnerState::Open { until } => {
                if Instant::now() >= until {
                    // This caller becomes the trial request.
                    self.transition(&mut inner, InnerState::HalfOpen {
                        probe_in_flight: true,
                    });
                    true
                } else {
                    false
                }
            }
            InnerState::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    // Trial slot taken; treat as still open.
                    false
                } else {
                    inner.state = InnerState::HalfOpen {
                        probe_in_flight: true,
                    };
                    true
                }
            }
        }
    }

    /// Record the success of a permitted request.
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;

        match inner.state {
            InnerState::Closed => {
                inner.consecutive_failures = 0;
            }
            InnerState::HalfOpen { .. } => {
                // Trial succeeded, the dependency has recovered.
                self.transition(&mut inner, InnerState::Closed);
            }
            InnerState::Open { .. } => {
                // A stale attempt resolved after the circuit reopened.
                tracing::debug!("success recorded while circuit open, ignoring");
            }
        }
    }

    /// Record the failure of a permitted request.
    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;

        match inner.state {
            InnerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.max_failures {
                    self.transition(&mut inner, InnerState::Open {
                        until: Instant::now() + self.config.reset_timeout,
                    });
                }
            }
            InnerState::HalfOpen { .. } => {
                // Trial failed, back to open with a fresh deadline.
                self.transition(&mut inner, InnerState::Open {
                    until: Instant::now() + self.config.reset_timeout,
                });
            }
            InnerState::Open { .. } => {}
        }
    }

    /// Release a permitted request without attributing an outcome.
    ///
    /// Used when an attempt is cancelled mid-flight: the half-open trial
    /// slot is freed for the next caller, and neither the failure count nor
    /// the state changes.
    pub async fn record_abandoned(&self) {
        let mut inner = self.inner.lock().await;

        if let InnerState::HalfOpen {
            probe_in_flight: true,
        } = inner.state
        {
            inner.state = InnerState::HalfOpen {
                probe_in_flight: false,
            };
            tracing::debug!("half-open trial abandoned, probe slot released");
        }
    }

    /// Force the breaker back to Closed with a zeroed failure count.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        self.transition(&mut inner, InnerState::Closed);
    }

    /// Apply a state transition, resetting counters and notifying the
    /// observer. No-op when the public state does not change.
    fn transition(&self, inner: &mut Inner, next: InnerState) {
        let from = inner.state.public();
        let to = next.public();
        inner.state = next;

        if let InnerState::Closed = inner.state {
            inner.consecutive_failures = 0;
        }

        if from != to {
            tracing::debug!(%from, %to, "circuit breaker state transition");
            self.observer.on_state_change(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: 3,
            reset_timeout: Duration::from_millis(100),
        }
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(test_config()).expect("valid config")
    }

    #[tokio::test]
    async fn test_closed_to_open_at_threshold() {
        let breaker = breaker();
        assert_eq!(breaker.state().await, CircuitState::Closed);

        breaker.record_failure().await;
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);

        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
        assert!(!breaker.allow_request().await);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = breaker();

        breaker.record_failure().await;
        breaker.record_failure().await;
        breaker.record_success().await;
        assert_eq!(breaker.failure_count().await, 0);

        breaker.record_failure().await;
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_until_timeout() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure().await;
        }

        assert!(!breaker.allow_request().await);

        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(!breaker.allow_request().await);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(breaker.allow_request().await);
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure().await;
        }
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(breaker.allow_request().await);
        breaker.record_success().await;

        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert_eq!(breaker.failure_count().await, 0);
        assert!(breaker.allow_request().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure().await;
        }
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(breaker.allow_request().await);
        breaker.record_failure().await;

        assert_eq!(breaker.state().await, CircuitState::Open);
        // Deadline restamped: still rejecting just before the new timeout.
        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(!breaker.allow_request().await);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(breaker.allow_request().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure().await;
        }
        tokio::time::advance(Duration::from_millis(100)).await;

        // First caller takes the trial slot; everyone else is rejected.
        assert!(breaker.allow_request().await);
        assert!(!breaker.allow_request().await);
        assert!(!breaker.allow_request().await);

        breaker.record_success().await;
        assert!(breaker.allow_request().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_releases_slot() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure().await;
        }
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(breaker.allow_request().await);
        assert!(!breaker.allow_request().await);

        // Cancelled mid-flight: slot freed, no failure charged, still probing.
        breaker.record_abandoned().await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        assert!(breaker.allow_request().await);
    }

    #[tokio::test]
    async fn test_reset_restores_closed() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure().await;
        }
        assert_eq!(breaker.state().await, CircuitState::Open);

        breaker.reset().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert_eq!(breaker.failure_count().await, 0);
        assert!(breaker.allow_request().await);
    }

    #[tokio::test]
    async fn test_zero_threshold_rejected() {
        let result = CircuitBreaker::new(CircuitBreakerConfig {
            max_failures: 0,
            reset_timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(ResilienceError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let breaker = breaker();
        let other = breaker.clone();

        for _ in 0..3 {
            breaker.record_failure().await;
        }
        assert_eq!(other.state().await, CircuitState::Open);
        assert!(!other.allow_request().await);
    }
}

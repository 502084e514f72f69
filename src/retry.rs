//! Retry policy with exponential backoff
//!
//! Decides, given a failed attempt, whether another attempt should be made
//! and how long to wait first. The policy is a plain configuration value:
//! immutable after construction and free of shared state, so one instance
//! can be reused concurrently by any number of executors.
//!
//! # Key Concepts
//!
//! - **Attempt numbering**: 1-indexed — the first try is attempt 1, not a
//!   "retry". Delays are only consulted before attempts `2..=max_attempts`
//! - **Backoff**: `min(base_delay * backoff_multiplier^(attempt-1), max_delay)`
//! - **Jitter**: optional randomization applied after the exponential
//!   computation, to avoid synchronized retry storms
//!
//! # Example
//!
//! ```
//! use ballast::retry::{Jitter, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy {
//!     max_attempts: 5,
//!     base_delay: Duration::from_millis(100),
//!     max_delay: Duration::from_secs(10),
//!     backoff_multiplier: 2.0,
//!     jitter: Jitter::None,
//!     retry_on: None,
//! };
//!
//! assert_eq!(policy.delay_for(1), Duration::from_millis(100));
//! assert_eq!(policy.delay_for(2), Duration::from_millis(200));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::{ClassifiedError, ResilienceError};

/// Custom retryability predicate, overriding the kind-based default.
pub type RetryPredicate = Arc<dyn Fn(&ClassifiedError) -> bool + Send + Sync>;

/// Jitter applied to a computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// No jitter; delays are fully deterministic.
    #[default]
    None,
    /// Uniformly random delay in `[0, computed]`.
    Full,
    /// Half the computed delay plus a random half: `[computed/2, computed]`.
    Equal,
}

/// Retry policy configuration.
///
/// Stateless across calls; share freely between executors.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (must be >= 1).
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub base_delay: Duration,

    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,

    /// Multiplier applied per attempt (must be >= 1.0).
    pub backoff_multiplier: f64,

    /// Jitter strategy applied after the exponential computation.
    pub jitter: Jitter,

    /// Optional predicate deciding which errors are retryable.
    ///
    /// When `None`, retryability follows the error kind: `Transient` and
    /// `Timeout` are retried, `Permanent` and `Unknown` are not.
    pub retry_on: Option<RetryPredicate>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: Jitter::None,
            retry_on: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("retry_on", &self.retry_on.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

impl RetryPolicy {
    /// A policy for fast retries against rate-limited or flaky services.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            jitter: Jitter::Full,
            ..Default::default()
        }
    }

    /// A policy for slow or expensive operations.
    pub fn conservative() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            ..Default::default()
        }
    }

    /// Check the policy parameters.
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.max_attempts == 0 {
            return Err(ResilienceError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ResilienceError::InvalidConfig(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Whether another attempt should be made after `attempt` failed.
    ///
    /// `attempt` is 1-indexed. Returns false once the attempt budget is
    /// spent or when the error is not retryable; a `Permanent` error is
    /// never retried regardless of remaining attempts.
    pub fn should_retry(&self, attempt: u32, error: &ClassifiedError) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }

        match &self.retry_on {
            Some(predicate) => predicate(error),
            None => error.is_retryable(),
        }
    }

    /// Backoff delay to wait after the failure of 1-indexed `attempt`.
    ///
    /// Deterministic for a given attempt unless jitter is configured.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponential =
            self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32 - 1);
        let capped = exponential.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            Jitter::None => capped,
            Jitter::Full => rand::rng().random_range(0.0..=capped.max(f64::EPSILON)),
            Jitter::Equal => {
                let half = capped / 2.0;
                half + rand::rng().random_range(0.0..=half.max(f64::EPSILON))
            }
        };

        Duration::from_secs_f64(jittered)
    }
}

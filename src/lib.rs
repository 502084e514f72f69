//! Ballast: Pure-logic fault tolerance execution primitives
//!
//! # Overview
//!
//! This crate wraps an arbitrary fallible async operation (a network call, a
//! database query) with predictable failure-handling behavior. It includes:
//!
//! - **Retry Policy**: Retries transient failures with exponential backoff
//!   and optional jitter
//! - **Circuit Breaker**: Trips after sustained failures to stop wasting
//!   resources on a degraded dependency, then self-heals through a single
//!   half-open probe
//! - **Fallback Chain**: Serves degraded-but-available results when the
//!   primary path is exhausted
//! - **Resilient Executor**: Composes the three around a caller-supplied
//!   operation; the public entry point
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Network protocols (HTTP, gRPC, SQL)
//! - Storage systems
//! - Application-specific concerns
//!
//! The boundary is purely in-process: the caller supplies a zero-argument
//! async operation, and gets back a value or a single terminal error with
//! the full causal chain preserved. The circuit breaker is a single-process,
//! single-dependency guard, not a distributed health registry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │ execute(op)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Gate: open circuit
//! │  (Closed / Open / Half-Open)            │    fails fast
//! └─────────────┬───────────────────────────┘
//!               │ allowed
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Loop                        │  ← Transient failures
//! │  (Exponential backoff + jitter)         │    retried with backoff
//! └─────────────┬───────────────────────────┘
//!               │ exhausted / circuit open
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Fallback Chain                    │  ← Degraded sources,
//! │  (Lazy, first success wins)             │    left to right
//! └─────────────────────────────────────────┘
//!
//!  Throughout: observer hooks report retries, fallback invocations,
//!  and breaker state transitions (fire-and-forget).
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use ballast::prelude::*;
//! use ballast::error::preclassified;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ballast::ResilienceError> {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig {
//!     max_failures: 5,
//!     reset_timeout: Duration::from_secs(60),
//! })?;
//!
//! let executor = ResilientExecutor::builder()
//!     .retry_policy(RetryPolicy {
//!         max_attempts: 3,
//!         base_delay: Duration::from_millis(100),
//!         jitter: Jitter::Equal,
//!         ..Default::default()
//!     })
//!     .circuit_breaker(breaker)
//!     .classifier(preclassified)
//!     .fallback(|| async { Ok("cached".to_string()) })
//!     .build()?;
//!
//! let value = executor
//!     .execute(|| async {
//!         // Your potentially failing operation
//!         Ok::<_, ClassifiedError>("fresh".to_string())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod observer;
pub mod retry;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{ClassifiedError, Classifier, ErrorKind, Outcome, ResilienceError};
pub use executor::{ExecutorBuilder, ResilientExecutor};
pub use fallback::FallbackChain;
pub use observer::{NoopObserver, ResilienceObserver, TracingObserver};
pub use retry::{Jitter, RetryPolicy};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use ballast::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::error::{ClassifiedError, ErrorKind, Outcome, ResilienceError};
    pub use super::executor::ResilientExecutor;
    pub use super::fallback::FallbackChain;
    pub use super::observer::{ResilienceObserver, TracingObserver};
    pub use super::retry::{Jitter, RetryPolicy};
}

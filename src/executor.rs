//! Resilient executor: retry + circuit breaker + fallback composition
//!
//! [`ResilientExecutor`] wraps an arbitrary fallible async operation with
//! predictable failure handling. For a single `execute` call:
//!
//! ```text
//! 1. Circuit breaker gates the call (open circuit → fallbacks)
//! 2. Operation runs; success is recorded and returned
//! 3. Failure is classified once, charged to the breaker, and either
//!    retried after backoff or handed to the fallback chain
//! 4. Caller sees one terminal value or error; intermediate attempts are
//!    visible only through observer hooks
//! ```
//!
//! The executor itself is stateless: the circuit breaker is the only shared
//! mutable resource, and it is safely shared between many concurrent
//! callers protecting the same dependency. Retry policy and fallback chain
//! are immutable values.
//!
//! # Example
//!
//! ```no_run
//! use ballast::{ClassifiedError, ResilientExecutor};
//! use ballast::error::preclassified;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ballast::ResilienceError> {
//! let executor = ResilientExecutor::builder()
//!     .classifier(preclassified)
//!     .fallback(|| async { Ok("cached".to_string()) })
//!     .build()?;
//!
//! let value = executor
//!     .execute(|| async {
//!         // the protected operation, e.g. a network call
//!         Ok::<_, ClassifiedError>("fresh".to_string())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{default_classifier, ClassifiedError, Classifier, Outcome, ResilienceError};
use crate::fallback::FallbackChain;
use crate::observer::{NoopObserver, ResilienceObserver};
use crate::retry::RetryPolicy;

/// Builder for [`ResilientExecutor`].
pub struct ExecutorBuilder<T, E> {
    retry: RetryPolicy,
    breaker: Option<CircuitBreaker>,
    fallbacks: FallbackChain<T>,
    classifier: Option<Classifier<E>>,
    observer: Arc<dyn ResilienceObserver>,
}

impl<T, E> Default for ExecutorBuilder<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> ExecutorBuilder<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Start a builder with default policy, breaker, and classifier.
    pub fn new() -> Self {
        Self {
            retry: RetryPolicy::default(),
            breaker: None,
            fallbacks: FallbackChain::new(),
            classifier: None,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Set the retry policy.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use an existing circuit breaker, typically shared by every executor
    /// protecting the same dependency.
    pub fn circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Append a fallback operation to the chain.
    pub fn fallback<F, Fut>(mut self, fallback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        self.fallbacks.push(fallback);
        self
    }

    /// Replace the fallback chain wholesale.
    pub fn fallbacks(mut self, fallbacks: FallbackChain<T>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Set the error classifier, applied once per failed attempt.
    ///
    /// Defaults to [`default_classifier`]; operations that already return
    /// [`ClassifiedError`] should pass [`preclassified`](crate::error::preclassified)
    /// to keep their own classification.
    pub fn classifier(
        mut self,
        classifier: impl Fn(E) -> ClassifiedError + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Set the observer for retry, fallback, and breaker transition events.
    pub fn observer(mut self, observer: Arc<dyn ResilienceObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate the configuration and build the executor.
    ///
    /// When no breaker was supplied, a fresh one with default configuration
    /// is created and wired to the builder's observer.
    pub fn build(self) -> Result<ResilientExecutor<T, E>, ResilienceError> {
        self.retry.validate()?;

        let breaker = match self.breaker {
            Some(breaker) => breaker,
            None => {
                CircuitBreaker::with_observer(CircuitBreakerConfig::default(), self.observer.clone())?
            }
        };

        let classifier: Classifier<E> = self
            .classifier
            .unwrap_or_else(|| Arc::new(default_classifier::<E>));

        Ok(ResilientExecutor {
            retry: self.retry,
            breaker,
            fallbacks: self.fallbacks,
            classifier,
            observer: self.observer,
        })
    }
}

/// Executes operations under a retry policy, circuit breaker, and fallback
/// chain.
///
/// Generic over the success type `T` and the raw error type `E` of the
/// wrapped operation. The executor holds no mutable state of its own; it
/// may be shared or cheaply rebuilt per call site.
pub struct ResilientExecutor<T, E> {
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    fallbacks: FallbackChain<T>,
    classifier: Classifier<E>,
    observer: Arc<dyn ResilienceObserver>,
}

impl<T, E> ResilientExecutor<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Start building an executor.
    pub fn builder() -> ExecutorBuilder<T, E> {
        ExecutorBuilder::new()
    }

    /// The circuit breaker guarding this executor's dependency.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Execute `op` under the configured policies.
    ///
    /// Returns the operation's value, a fallback's value, or a single
    /// terminal [`ResilienceError`].
    pub async fn execute<F, Fut>(&self, mut op: F) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(&mut op, None).await
    }

    /// Execute `op`, aborting as soon as `token` is cancelled.
    ///
    /// Cancellation wins over any pending backoff sleep and over the
    /// in-flight attempt; it never charges the circuit breaker (a held
    /// half-open probe slot is released), and surfaces as
    /// [`ResilienceError::Cancelled`].
    pub async fn execute_cancellable<F, Fut>(
        &self,
        mut op: F,
        token: &CancellationToken,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(&mut op, Some(token)).await
    }

    /// The single-call state machine: breaker gate, retry loop, fallbacks.
    async fn run<F, Fut>(
        &self,
        op: &mut F,
        token: Option<&CancellationToken>,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 1;

        let primary = loop {
            if let Some(token) = token {
                if token.is_cancelled() {
                    return Err(ResilienceError::Cancelled);
                }
            }

            if !self.breaker.allow_request().await {
                break ResilienceError::CircuitOpen;
            }

            let outcome = match token {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            // The permitted attempt never resolves; free a
                            // held half-open probe slot without charging it.
                            self.breaker.record_abandoned().await;
                            return Err(ResilienceError::Cancelled);
                        }
                        outcome = op() => outcome,
                    }
                }
                None => op().await,
            };

            match outcome {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(raw) => {
                    // Classified once, never revised downstream.
                    let error = (self.classifier)(raw);
                    self.breaker.record_failure().await;

                    if !self.retry.should_retry(attempt, &error) {
                        break ResilienceError::Operation(error);
                    }

                    self.observer.on_retry(attempt, &error);
                    let delay = self.retry.delay_for(attempt);

                    match token {
                        Some(token) => {
                            tokio::select! {
                                _ = token.cancelled() => {
                                    return Err(ResilienceError::Cancelled);
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }

                    attempt += 1;
                }
            }
        };

        self.fallbacks
            .resolve_observed(primary, self.observer.as_ref())
            .await
    }
}

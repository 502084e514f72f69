//! Fallback chains for degraded data sources
//!
//! When the primary path is exhausted — retries used up, or the circuit
//! breaker open — the executor consults an ordered chain of alternate
//! operations (typically cheaper, degraded sources such as an in-memory
//! cache). Evaluation is lazy and left-to-right, stopping at the first
//! success.
//!
//! The chain itself never retries or circuit-breaks its fallbacks; they are
//! assumed cheap and safe. A fallback that needs its own resilience should
//! be wrapped in its own executor by the caller.
//!
//! # Example
//!
//! ```
//! use ballast::fallback::FallbackChain;
//! use ballast::ClassifiedError;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let chain: FallbackChain<String> = FallbackChain::new()
//!     .with(|| async { Err(ClassifiedError::transient("cache cold")) })
//!     .with(|| async { Ok("stale-but-served".to_string()) });
//!
//! let value = chain
//!     .resolve(ClassifiedError::timeout("primary timed out").into())
//!     .await
//!     .unwrap();
//! assert_eq!(value, "stale-but-served");
//! # }
//! ```

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;

use crate::error::{ClassifiedError, Outcome, ResilienceError};
use crate::observer::{NoopObserver, ResilienceObserver};

type FallbackFn<T> = Box<dyn Fn() -> BoxFuture<'static, Outcome<T>> + Send + Sync>;

/// Ordered sequence of fallback operations.
///
/// Immutable once built; holds no mutable state, so one chain can be shared
/// by concurrent callers.
pub struct FallbackChain<T> {
    fallbacks: Vec<FallbackFn<T>>,
}

impl<T> fmt::Debug for FallbackChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackChain")
            .field("len", &self.fallbacks.len())
            .finish()
    }
}

impl<T> Default for FallbackChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FallbackChain<T> {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            fallbacks: Vec::new(),
        }
    }

    /// Append a fallback operation, builder-style.
    pub fn with<F, Fut>(mut self, fallback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        self.push(fallback);
        self
    }

    /// Append a fallback operation.
    pub fn push<F, Fut>(&mut self, fallback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        self.fallbacks.push(Box::new(move || Box::pin(fallback())));
    }

    /// Number of registered fallbacks.
    pub fn len(&self) -> usize {
        self.fallbacks.len()
    }

    /// Whether the chain has no fallbacks.
    pub fn is_empty(&self) -> bool {
        self.fallbacks.is_empty()
    }

    /// Resolve the chain after `primary` failed.
    ///
    /// Invokes fallbacks in registration order and returns the first
    /// success without invoking any later fallback. If the chain is empty,
    /// `primary` is returned unchanged; if every fallback fails, the result
    /// is [`ResilienceError::FallbacksExhausted`] carrying each fallback
    /// error in order with `primary` chained as cause.
    pub async fn resolve(&self, primary: ResilienceError) -> Result<T, ResilienceError> {
        self.resolve_observed(primary, &NoopObserver).await
    }

    /// Like [`resolve`](Self::resolve), reporting each fallback failure to
    /// the observer.
    pub async fn resolve_observed(
        &self,
        primary: ResilienceError,
        observer: &dyn ResilienceObserver,
    ) -> Result<T, ResilienceError> {
        let mut errors: Vec<ClassifiedError> = Vec::new();

        for (index, fallback) in self.fallbacks.iter().enumerate() {
            match fallback().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    observer.on_fallback(index, &error);
                    errors.push(error);
                }
            }
        }

        let last = match errors.pop() {
            Some(last) => last,
            // Empty chain: surface the primary failure as-is.
            None => return Err(primary),
        };

        Err(ResilienceError::FallbacksExhausted {
            last,
            earlier: errors,
            primary: Box::new(primary),
        })
    }
}

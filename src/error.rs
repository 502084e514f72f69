//! Error taxonomy for resilient execution
//!
//! Every attempt at a protected operation produces either a value or a
//! [`ClassifiedError`]. Classification happens exactly once, when the raw
//! error is first observed, and is never revised downstream: the assigned
//! [`ErrorKind`] is what the retry policy and circuit breaker act on.
//!
//! # Key Concepts
//!
//! - **ErrorKind**: Transient and Timeout failures are retryable; Permanent
//!   and Unknown failures are not
//! - **Cause chain**: `ClassifiedError` carries an optional boxed source so
//!   failure provenance survives across layers (`std::error::Error::source`)
//! - **ResilienceError**: the terminal error surfaced by the executor, which
//!   may be synthetic (`CircuitOpen`, `Cancelled`) and is then never charged
//!   against the circuit breaker

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result of one attempt at an operation: a value, or a classified failure.
pub type Outcome<T> = Result<T, ClassifiedError>;

/// Classification of a failed attempt.
///
/// Assigned once at creation and never changed afterwards. The kind decides
/// retry eligibility; every kind except the synthetic errors in
/// [`ResilienceError`] still counts toward the circuit breaker, because the
/// dependency call itself failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Short-lived failure (network blip, throttling). Retryable.
    Transient,
    /// Failure retrying cannot fix (validation, auth). Never retried.
    Permanent,
    /// The operation timed out. Retryable, but tracked as its own kind
    /// so observers can distinguish slow dependencies from broken ones.
    Timeout,
    /// Unclassifiable failure. Not retried.
    Unknown,
}

impl ErrorKind {
    /// Whether errors of this kind are eligible for retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A failed attempt with its classification and cause chain.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ClassifiedError {
    /// Create an error with an explicit kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// Shorthand for a permanent error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    /// Shorthand for a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Shorthand for an unclassified error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Attach the underlying cause, preserving provenance for diagnostics.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The kind assigned at classification time.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable description of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the retry policy may attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Terminal error surfaced by the resilient executor.
///
/// Callers see exactly one of these per `execute` call; intermediate retry
/// and fallback attempts are only visible through observer hooks.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The primary operation failed and no fallback recovered it.
    #[error(transparent)]
    Operation(#[from] ClassifiedError),

    /// The circuit breaker rejected the request before the operation ran.
    ///
    /// Synthetic: produced locally, never charged against the breaker.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The caller cancelled the execution.
    ///
    /// Synthetic: neither a retry trigger nor a breaker failure.
    #[error("operation cancelled")]
    Cancelled,

    /// Both the primary path and every configured fallback failed.
    ///
    /// `last` is the proximate failure; `earlier` holds the preceding
    /// fallback errors in invocation order; `primary` is the original
    /// primary-path failure, reachable through `Error::source`.
    #[error("all fallbacks exhausted, last: {last}")]
    FallbacksExhausted {
        /// Error from the final fallback.
        last: ClassifiedError,
        /// Errors from earlier fallbacks, in invocation order.
        earlier: Vec<ClassifiedError>,
        /// The primary-path failure that triggered fallback resolution.
        #[source]
        primary: Box<ResilienceError>,
    },

    /// A policy or breaker was built with invalid parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ResilienceError {
    /// The classification of the proximate failure, when one exists.
    ///
    /// Synthetic errors (`CircuitOpen`, `Cancelled`, `InvalidConfig`) carry
    /// no classification.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ResilienceError::Operation(e) => Some(e.kind()),
            ResilienceError::FallbacksExhausted { last, .. } => Some(last.kind()),
            _ => None,
        }
    }
}

/// Converts a raw operation error into a [`ClassifiedError`], exactly once.
pub type Classifier<E> = Arc<dyn Fn(E) -> ClassifiedError + Send + Sync>;

/// Classify an arbitrary error by sniffing its message.
///
/// Heuristics cover the common wire-level markers: timeouts, connection
/// failures, throttling, and server-side 5xx responses are considered
/// worth retrying; authorization and validation failures are not.
/// Anything unrecognized is [`ErrorKind::Unknown`].
pub fn default_classifier<E>(error: E) -> ClassifiedError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = error.to_string();
    let kind = classify_message(&message);
    ClassifiedError {
        kind,
        message,
        source: Some(Box::new(error)),
    }
}

/// Identity classifier for operations that already return
/// [`ClassifiedError`]. Preserves the kind assigned at the source.
pub fn preclassified(error: ClassifiedError) -> ClassifiedError {
    error
}

fn classify_message(message: &str) -> ErrorKind {
    let msg = message.to_lowercase();

    if msg.contains("timeout") || msg.contains("timed out") {
        return ErrorKind::Timeout;
    }

    if msg.contains("connection")
        || msg.contains("throttl")
        || msg.contains("slow down")
        || msg.contains("unavailable")
        || msg.contains("503")
        || msg.contains("500")
    {
        return ErrorKind::Transient;
    }

    if msg.contains("denied")
        || msg.contains("forbidden")
        || msg.contains("unauthorized")
        || msg.contains("not found")
        || msg.contains("invalid")
    {
        return ErrorKind::Permanent;
    }

    ErrorKind::Unknown
}

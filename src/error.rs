//! Failure and usage-error types.
//!
//! - [`Failure`]: the outcome recorded by a [`Deferred`](crate::Deferred) that did
//!   not complete normally. Failures flow along the dependency graph.
//! - [`StateError`]: returned by the non-blocking `try_*` accessors when they are
//!   called against the wrong state. This is a caller bug, not a data-flow outcome.
//! - [`ExecutorError`]: invalid executor configuration.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The shared, cloneable cause of a [`Failure::Computation`].
///
/// Every continuation of a failed cell observes the same cause, so it is held
/// behind an `Arc`. Two causes compare equal when they render the same message.
///
/// # Examples
///
/// ```rust
/// use settle::Cause;
///
/// let cause = Cause::message("disk full");
/// assert_eq!(cause.to_string(), "disk full");
/// ```
#[derive(Clone)]
pub struct Cause(Arc<dyn Error + Send + Sync + 'static>);

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl Error for Message {}

impl Cause {
    /// Wraps an error value.
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Creates a cause carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self(Arc::new(Message(message.into())))
    }

    /// Returns the underlying error.
    pub fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.0
    }

    /// Attempts to downcast the underlying error to a concrete type.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, formatter)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, formatter)
    }
}

impl PartialEq for Cause {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.to_string() == other.to_string()
    }
}

/// Why a [`Deferred`](crate::Deferred) did not complete with a value.
///
/// # Examples
///
/// ```rust
/// use settle::{Deferred, Failure};
///
/// let cell = Deferred::<i32>::failed(Failure::message("boom"));
/// assert_eq!(cell.join(), Err(Failure::message("boom")));
/// assert_eq!(Failure::Timeout.to_string(), "deferred timed out");
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Failure {
    /// A user computation panicked or produced an explicit error.
    #[error("computation failed: {0}")]
    Computation(Cause),

    /// The cell was canceled, or its token was canceled before the supplier ran.
    #[error("deferred canceled")]
    Canceled,

    /// A deadline elapsed before the cell completed.
    #[error("deferred timed out")]
    Timeout,

    /// A flat-mapping or recovering function returned no cell to adopt.
    #[error("continuation returned no deferred to adopt")]
    NilContinuation,

    /// A race was requested over an empty set of sources.
    #[error("no candidates to race")]
    NoCandidates,
}

impl Failure {
    /// Wraps an error as a computation failure.
    pub fn computation<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Computation(Cause::new(error))
    }

    /// Creates a computation failure carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Computation(Cause::message(message))
    }

    /// Returns the cause of a computation failure.
    pub const fn cause(&self) -> Option<&Cause> {
        match self {
            Self::Computation(cause) => Some(cause),
            _ => None,
        }
    }

    /// Returns `true` for [`Failure::Canceled`].
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Returns `true` for [`Failure::Timeout`].
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// A non-blocking accessor was called against the wrong state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    /// The cell has not completed yet.
    #[error("deferred not completed")]
    NotCompleted,

    /// A failure was requested but the cell completed normally.
    #[error("deferred completed normally")]
    NotFailed,

    /// A value was requested but the cell failed.
    #[error("deferred completed exceptionally: {0}")]
    Failed(Failure),
}

/// Invalid executor configuration, or a thread the runtime could not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The executor capacity was set to zero.
    #[error("executor capacity must be greater than 0")]
    InvalidCapacity,

    /// The operating system refused to create a thread.
    #[error("could not start a {0} thread")]
    ThreadUnavailable(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug)]
    struct Refused;

    impl fmt::Display for Refused {
        fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("connection refused")
        }
    }

    impl Error for Refused {}

    #[rstest]
    fn computation_failure_display_includes_cause() {
        let failure = Failure::computation(Refused);
        assert_eq!(failure.to_string(), "computation failed: connection refused");
    }

    #[rstest]
    fn cause_downcasts_to_original_error() {
        let failure = Failure::computation(Refused);
        let cause = failure.cause().unwrap();
        assert!(cause.downcast_ref::<Refused>().is_some());
    }

    #[rstest]
    fn causes_with_same_message_are_equal() {
        assert_eq!(Cause::message("x"), Cause::message("x"));
        assert_ne!(Cause::message("x"), Cause::message("y"));
    }

    #[rstest]
    #[case(Failure::Canceled, "deferred canceled")]
    #[case(Failure::Timeout, "deferred timed out")]
    #[case(Failure::NilContinuation, "continuation returned no deferred to adopt")]
    #[case(Failure::NoCandidates, "no candidates to race")]
    fn failure_display(#[case] failure: Failure, #[case] expected: &str) {
        assert_eq!(failure.to_string(), expected);
    }

    #[rstest]
    fn failure_predicates() {
        assert!(Failure::Canceled.is_canceled());
        assert!(!Failure::Canceled.is_timeout());
        assert!(Failure::Timeout.is_timeout());
        assert!(Failure::Timeout.cause().is_none());
    }

    #[rstest]
    fn state_error_display() {
        assert_eq!(StateError::NotCompleted.to_string(), "deferred not completed");
        assert_eq!(
            StateError::Failed(Failure::Timeout).to_string(),
            "deferred completed exceptionally: deferred timed out"
        );
    }

    #[rstest]
    fn executor_error_display() {
        assert_eq!(
            ExecutorError::InvalidCapacity.to_string(),
            "executor capacity must be greater than 0"
        );
        assert_eq!(
            ExecutorError::ThreadUnavailable("settle-timer").to_string(),
            "could not start a settle-timer thread"
        );
    }
}

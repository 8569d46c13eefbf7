//! Continuation operators: each derives a new cell from a source cell.
//!
//! Every operator has an inline form (`map`) and a dispatch-taking form
//! (`map_with`). The destination is created up front and returned at once;
//! the step runs when the source settles. User code runs behind the fault
//! boundary, so a panicking step fails the destination instead of unwinding
//! into the completing thread.

use std::convert::identity;

use super::Deferred;
use crate::error::Failure;
use crate::executor::Dispatch;
use crate::fault;

/// Something a `flat_map` or `or_else` step may return: a cell to adopt, or
/// nothing.
///
/// `Option<Deferred<T>>` lets a step report "no cell". The destination then
/// fails with [`Failure::NilContinuation`].
pub trait IntoDeferred<T> {
    /// Converts into the cell to adopt, if any.
    fn into_deferred(self) -> Option<Deferred<T>>;
}

impl<T> IntoDeferred<T> for Deferred<T> {
    #[inline]
    fn into_deferred(self) -> Option<Deferred<T>> {
        Some(self)
    }
}

impl<T> IntoDeferred<T> for Option<Deferred<T>> {
    #[inline]
    fn into_deferred(self) -> Self {
        self
    }
}

/// Settles `target` with the eventual outcome of what a step produced.
fn adopt<V>(target: &Deferred<V>, produced: Result<Option<Deferred<V>>, Failure>)
where
    V: Clone + Send + 'static,
{
    match produced {
        Err(failure) => {
            target.fail(failure);
        }
        Ok(None) => {
            target.fail(Failure::NilContinuation);
        }
        Ok(Some(relay)) => {
            let target = target.clone();
            relay.subscribe(move |outcome| {
                target.resolve(outcome);
            });
        }
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Creates the destination and wires `step` to run once `self` settles.
    fn chain<V, F>(&self, dispatch: Dispatch, step: F) -> Deferred<V>
    where
        V: Clone + Send + 'static,
        F: FnOnce(Result<T, Failure>, &Deferred<V>) + Send + 'static,
    {
        let destination = Deferred::new();
        let target = destination.clone();
        self.subscribe(move |outcome| {
            dispatch.execute(move || step(outcome, &target));
        });
        destination
    }

    // =========================================================================
    // map / then_accept / then_run
    // =========================================================================

    /// Transforms the value; failures pass through untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::{Deferred, Failure};
    ///
    /// assert_eq!(Deferred::completed(2).map(|value| value + 1).join(), Ok(3));
    ///
    /// let failed = Deferred::<i32>::failed(Failure::Timeout).map(|value| value + 1);
    /// assert_eq!(failed.join(), Err(Failure::Timeout));
    /// ```
    pub fn map<V, F>(&self, function: F) -> Deferred<V>
    where
        V: Clone + Send + 'static,
        F: FnOnce(T) -> V + Send + 'static,
    {
        self.map_with(Dispatch::Inline, function)
    }

    /// [`map`](Self::map) with an explicit dispatch for the step.
    pub fn map_with<V, F>(&self, dispatch: Dispatch, function: F) -> Deferred<V>
    where
        V: Clone + Send + 'static,
        F: FnOnce(T) -> V + Send + 'static,
    {
        self.chain(dispatch, move |outcome, target| match outcome {
            Ok(value) => {
                target.resolve(fault::trap(move || function(value)));
            }
            Err(failure) => {
                target.fail(failure);
            }
        })
    }

    /// Consumes the value for its side effect.
    pub fn then_accept<F>(&self, action: F) -> Deferred<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.map_with(Dispatch::Inline, action)
    }

    /// [`then_accept`](Self::then_accept) with an explicit dispatch.
    pub fn then_accept_with<F>(&self, dispatch: Dispatch, action: F) -> Deferred<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.map_with(dispatch, action)
    }

    /// Runs `action` after a successful completion, ignoring the value.
    pub fn then_run<F>(&self, action: F) -> Deferred<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.then_run_with(Dispatch::Inline, action)
    }

    /// [`then_run`](Self::then_run) with an explicit dispatch.
    pub fn then_run_with<F>(&self, dispatch: Dispatch, action: F) -> Deferred<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.map_with(dispatch, move |_| action())
    }

    // =========================================================================
    // flat_map
    // =========================================================================

    /// Chains a step that itself produces a cell; the destination adopts that
    /// cell's eventual outcome.
    ///
    /// The step may return `Option<Deferred<V>>`; returning `None` fails the
    /// destination with [`Failure::NilContinuation`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::{Deferred, Failure};
    ///
    /// let lookup = Deferred::completed(7).flat_map(|id| Deferred::supply(move || id * 6));
    /// assert_eq!(lookup.join(), Ok(42));
    ///
    /// let missing = Deferred::completed(7).flat_map(|_| None::<Deferred<i32>>);
    /// assert_eq!(missing.join(), Err(Failure::NilContinuation));
    /// ```
    pub fn flat_map<V, R, F>(&self, function: F) -> Deferred<V>
    where
        V: Clone + Send + 'static,
        R: IntoDeferred<V>,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.flat_map_with(Dispatch::Inline, function)
    }

    /// [`flat_map`](Self::flat_map) with an explicit dispatch.
    pub fn flat_map_with<V, R, F>(&self, dispatch: Dispatch, function: F) -> Deferred<V>
    where
        V: Clone + Send + 'static,
        R: IntoDeferred<V>,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.chain(dispatch, move |outcome, target| match outcome {
            Ok(value) => adopt(target, fault::trap(move || function(value).into_deferred())),
            Err(failure) => {
                target.fail(failure);
            }
        })
    }

    // =========================================================================
    // peek
    // =========================================================================

    /// Observes the outcome without changing it.
    ///
    /// A panic inside `observer` is logged and swallowed; the destination still
    /// gets the source outcome.
    pub fn peek<F>(&self, observer: F) -> Self
    where
        F: FnOnce(&Result<T, Failure>) + Send + 'static,
    {
        self.peek_with(Dispatch::Inline, observer)
    }

    /// [`peek`](Self::peek) with an explicit dispatch.
    pub fn peek_with<F>(&self, dispatch: Dispatch, observer: F) -> Self
    where
        F: FnOnce(&Result<T, Failure>) + Send + 'static,
    {
        self.chain(dispatch, move |outcome, target| {
            if let Err(failure) = fault::trap(|| observer(&outcome)) {
                tracing::warn!(%failure, "peek observer panicked");
            }
            target.resolve(outcome);
        })
    }

    // =========================================================================
    // recover / or_else
    // =========================================================================

    /// Turns a failure into a fallback value, or into a different failure.
    ///
    /// Runs only when the source failed. Successful values pass through.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::{Deferred, Failure};
    ///
    /// let fallback = Deferred::<i32>::failed(Failure::Timeout).recover(|_| Ok(0));
    /// assert_eq!(fallback.join(), Ok(0));
    ///
    /// let remapped = Deferred::<i32>::failed(Failure::Timeout)
    ///     .recover(|_| Err(Failure::message("upstream too slow")));
    /// assert_eq!(remapped.join(), Err(Failure::message("upstream too slow")));
    /// ```
    pub fn recover<F>(&self, function: F) -> Self
    where
        F: FnOnce(Failure) -> Result<T, Failure> + Send + 'static,
    {
        self.recover_with(Dispatch::Inline, function)
    }

    /// [`recover`](Self::recover) with an explicit dispatch.
    pub fn recover_with<F>(&self, dispatch: Dispatch, function: F) -> Self
    where
        F: FnOnce(Failure) -> Result<T, Failure> + Send + 'static,
    {
        self.chain(dispatch, move |outcome, target| match outcome {
            Ok(value) => {
                target.complete(value);
            }
            Err(failure) => {
                target.resolve(fault::trap(move || function(failure)).and_then(identity));
            }
        })
    }

    /// Replaces a failed source with another cell.
    ///
    /// Runs only when the source failed; the destination adopts the
    /// replacement's outcome. Returning `None` fails the destination with
    /// [`Failure::NilContinuation`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::{Deferred, Failure};
    ///
    /// let primary = Deferred::<&str>::failed(Failure::message("primary down"));
    /// let answer = primary.or_else(|_| Deferred::supply(|| "replica"));
    /// assert_eq!(answer.join(), Ok("replica"));
    /// ```
    pub fn or_else<R, F>(&self, function: F) -> Self
    where
        R: IntoDeferred<T>,
        F: FnOnce(Failure) -> R + Send + 'static,
    {
        self.or_else_with(Dispatch::Inline, function)
    }

    /// [`or_else`](Self::or_else) with an explicit dispatch.
    pub fn or_else_with<R, F>(&self, dispatch: Dispatch, function: F) -> Self
    where
        R: IntoDeferred<T>,
        F: FnOnce(Failure) -> R + Send + 'static,
    {
        self.chain(dispatch, move |outcome, target| match outcome {
            Ok(value) => {
                target.complete(value);
            }
            Err(failure) => adopt(
                target,
                fault::trap(move || function(failure).into_deferred()),
            ),
        })
    }

    // =========================================================================
    // handle / handle_into
    // =========================================================================

    /// Folds either outcome into a value of the same type.
    pub fn handle<F>(&self, function: F) -> Self
    where
        F: FnOnce(Result<T, Failure>) -> T + Send + 'static,
    {
        self.handle_into_with(Dispatch::Inline, function)
    }

    /// [`handle`](Self::handle) with an explicit dispatch.
    pub fn handle_with<F>(&self, dispatch: Dispatch, function: F) -> Self
    where
        F: FnOnce(Result<T, Failure>) -> T + Send + 'static,
    {
        self.handle_into_with(dispatch, function)
    }

    /// Folds either outcome into a value of a new type.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::{Deferred, Failure};
    ///
    /// let status = Deferred::<u16>::failed(Failure::Canceled).handle_into(|outcome| match outcome {
    ///     Ok(code) => format!("status {code}"),
    ///     Err(failure) => format!("no status: {failure}"),
    /// });
    /// assert_eq!(status.join(), Ok("no status: deferred canceled".to_string()));
    /// ```
    pub fn handle_into<V, F>(&self, function: F) -> Deferred<V>
    where
        V: Clone + Send + 'static,
        F: FnOnce(Result<T, Failure>) -> V + Send + 'static,
    {
        self.handle_into_with(Dispatch::Inline, function)
    }

    /// [`handle_into`](Self::handle_into) with an explicit dispatch.
    pub fn handle_into_with<V, F>(&self, dispatch: Dispatch, function: F) -> Deferred<V>
    where
        V: Clone + Send + 'static,
        F: FnOnce(Result<T, Failure>) -> V + Send + 'static,
    {
        self.chain(dispatch, move |outcome, target| {
            target.resolve(fault::trap(move || function(outcome)));
        })
    }
}

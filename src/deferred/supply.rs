//! Producers: start a computation on an executor and hand back its cell.

use std::convert::identity;

use super::Deferred;
use crate::cancel::CancelToken;
use crate::error::Failure;
use crate::executor::{Executor, default_executor};
use crate::fault;

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Runs `supplier` on the default executor.
    ///
    /// Blocks while the default executor is at capacity. A panicking supplier
    /// fails the cell with [`Failure::Computation`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::Deferred;
    ///
    /// let sum = Deferred::supply(|| (1..=10).sum::<u32>());
    /// assert_eq!(sum.join(), Ok(55));
    /// ```
    pub fn supply<F>(supplier: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::supply_on(&*default_executor(), supplier)
    }

    /// Runs `supplier` on `executor`.
    pub fn supply_on<E, F>(executor: &E, supplier: F) -> Self
    where
        E: Executor + ?Sized,
        F: FnOnce() -> T + Send + 'static,
    {
        Self::new().produce_on(executor, move |_| Ok(supplier()))
    }

    /// Runs a cancellable `supplier` on the default executor.
    ///
    /// The cell's token is a child of `parent` and is handed to the supplier to
    /// poll. If it is already canceled when the unit starts, the cell fails
    /// with [`Failure::Canceled`] and the supplier never runs.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::{CancelToken, Deferred, Failure};
    ///
    /// let parent = CancelToken::new();
    /// parent.cancel();
    /// let skipped = Deferred::supply_cancellable(&parent, |_token| 1);
    /// assert_eq!(skipped.join(), Err(Failure::Canceled));
    /// ```
    pub fn supply_cancellable<F>(parent: &CancelToken, supplier: F) -> Self
    where
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        Self::supply_cancellable_on(parent, &*default_executor(), supplier)
    }

    /// [`supply_cancellable`](Self::supply_cancellable) on `executor`.
    pub fn supply_cancellable_on<E, F>(parent: &CancelToken, executor: &E, supplier: F) -> Self
    where
        E: Executor + ?Sized,
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        Self::with_parent(parent).produce_on(executor, move |token| Ok(supplier(token)))
    }

    /// Runs a fallible `supplier` on the default executor; an `Err` fails the
    /// cell with [`Failure::Computation`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::{Deferred, Failure};
    ///
    /// let parsed = Deferred::try_supply(|| "17".parse::<u32>());
    /// assert_eq!(parsed.join(), Ok(17));
    ///
    /// let rejected = Deferred::try_supply(|| "x".parse::<u32>());
    /// assert!(matches!(rejected.join(), Err(Failure::Computation(_))));
    /// ```
    pub fn try_supply<E, F>(supplier: F) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::try_supply_on(&*default_executor(), supplier)
    }

    /// [`try_supply`](Self::try_supply) on `executor`.
    pub fn try_supply_on<X, E, F>(executor: &X, supplier: F) -> Self
    where
        X: Executor + ?Sized,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::new().produce_on(executor, move |_| supplier().map_err(Failure::computation))
    }

    /// Completes this cell from `supplier`, run on the default executor.
    /// Returns a handle to the same cell.
    ///
    /// Whoever settles the cell first wins; a later supplier result is dropped.
    #[must_use = "the returned handle refers to the same cell"]
    pub fn complete_async<F>(&self, supplier: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.complete_async_on(&*default_executor(), supplier)
    }

    /// [`complete_async`](Self::complete_async) on `executor`.
    #[must_use = "the returned handle refers to the same cell"]
    pub fn complete_async_on<E, F>(&self, executor: &E, supplier: F) -> Self
    where
        E: Executor + ?Sized,
        F: FnOnce() -> T + Send + 'static,
    {
        self.clone().produce_on(executor, move |_| Ok(supplier()))
    }

    /// Submits `body` to `executor` and settles `self` with its outcome.
    fn produce_on<E, F>(self, executor: &E, body: F) -> Self
    where
        E: Executor + ?Sized,
        F: FnOnce(&CancelToken) -> Result<T, Failure> + Send + 'static,
    {
        let cell = self.clone();
        executor.submit(Box::new(move || {
            if cell.token().is_canceled() {
                cell.fail(Failure::Canceled);
                return;
            }
            let outcome = fault::trap(|| body(cell.token())).and_then(identity);
            cell.resolve(outcome);
        }));
        self
    }
}

impl Deferred<()> {
    /// Runs `action` on the default executor.
    pub fn run<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::supply(action)
    }

    /// Runs `action` on `executor`.
    pub fn run_on<E, F>(executor: &E, action: F) -> Self
    where
        E: Executor + ?Sized,
        F: FnOnce() + Send + 'static,
    {
        Self::supply_on(executor, action)
    }

    /// Runs a cancellable `action` on the default executor.
    pub fn run_cancellable<F>(parent: &CancelToken, action: F) -> Self
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        Self::supply_cancellable(parent, action)
    }

    /// Runs a cancellable `action` on `executor`.
    pub fn run_cancellable_on<E, F>(parent: &CancelToken, executor: &E, action: F) -> Self
    where
        E: Executor + ?Sized,
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        Self::supply_cancellable_on(parent, executor, action)
    }
}

//! Combinators over two or more cells.
//!
//! None of these block a helper thread: each source gets one inline
//! subscription and the destination settles from whichever completing thread
//! makes the result known.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::Deferred;
use crate::error::Failure;
use crate::executor::Dispatch;
use crate::fault;

/// Values collected so far by `join_both`, plus the function to call once.
struct BothState<A, B, F> {
    left: Option<A>,
    right: Option<B>,
    function: Option<F>,
}

impl<A, B, F> BothState<A, B, F> {
    fn take_ready(&mut self) -> Option<(A, B, F)> {
        if self.left.is_none() || self.right.is_none() {
            return None;
        }
        Some((self.left.take()?, self.right.take()?, self.function.take()?))
    }
}

fn settle_both<A, B, V, F>(ready: Option<(A, B, F)>, target: Deferred<V>, dispatch: &Dispatch)
where
    A: Send + 'static,
    B: Send + 'static,
    V: Clone + Send + 'static,
    F: FnOnce(A, B) -> V + Send + 'static,
{
    if let Some((left, right, function)) = ready {
        dispatch.execute(move || {
            target.resolve(fault::trap(move || function(left, right)));
        });
    }
}

/// Fails `target` from the dispatch's thread, like the value path.
fn forward_failure<V>(failure: Failure, target: Deferred<V>, dispatch: &Dispatch)
where
    V: Clone + Send + 'static,
{
    dispatch.execute(move || {
        target.fail(failure);
    });
}

/// First-settle-wins guard plus the function only the winner may call.
struct Race<F> {
    won: AtomicBool,
    function: Mutex<Option<F>>,
}

impl<F> Race<F> {
    fn new(function: F) -> Self {
        Self {
            won: AtomicBool::new(false),
            function: Mutex::new(Some(function)),
        }
    }

    /// `true` for exactly one caller.
    fn claim(&self) -> bool {
        !self.won.swap(true, Ordering::AcqRel)
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    // =========================================================================
    // Both
    // =========================================================================

    /// Combines two cells once both succeed.
    ///
    /// If either source fails, the destination fails with the first failure
    /// observed and `function` never runs. With the `_with` form the failure
    /// is forwarded through the same dispatch as `function`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::Deferred;
    ///
    /// let width = Deferred::supply(|| 4);
    /// let height = Deferred::supply(|| 5);
    /// assert_eq!(width.join_both(&height, |w, h| w * h).join(), Ok(20));
    /// ```
    pub fn join_both<U, V, F>(&self, other: &Deferred<U>, function: F) -> Deferred<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        self.join_both_with(other, Dispatch::Inline, function)
    }

    /// [`join_both`](Self::join_both) with an explicit dispatch for `function`.
    pub fn join_both_with<U, V, F>(
        &self,
        other: &Deferred<U>,
        dispatch: Dispatch,
        function: F,
    ) -> Deferred<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let destination = Deferred::new();
        let state = Arc::new(Mutex::new(BothState {
            left: None,
            right: None,
            function: Some(function),
        }));

        {
            let state = Arc::clone(&state);
            let target = destination.clone();
            let dispatch = dispatch.clone();
            self.subscribe(move |outcome| match outcome {
                Ok(value) => {
                    let ready = {
                        let mut both = state.lock();
                        both.left = Some(value);
                        both.take_ready()
                    };
                    settle_both(ready, target, &dispatch);
                }
                Err(failure) => forward_failure(failure, target, &dispatch),
            });
        }

        let target = destination.clone();
        other.subscribe(move |outcome| match outcome {
            Ok(value) => {
                let ready = {
                    let mut both = state.lock();
                    both.right = Some(value);
                    both.take_ready()
                };
                settle_both(ready, target, &dispatch);
            }
            Err(failure) => forward_failure(failure, target, &dispatch),
        });

        destination
    }

    /// Consumes both values once both succeed.
    pub fn accept_both<U, F>(&self, other: &Deferred<U>, action: F) -> Deferred<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T, U) + Send + 'static,
    {
        self.join_both_with(other, Dispatch::Inline, action)
    }

    /// [`accept_both`](Self::accept_both) with an explicit dispatch.
    pub fn accept_both_with<U, F>(
        &self,
        other: &Deferred<U>,
        dispatch: Dispatch,
        action: F,
    ) -> Deferred<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T, U) + Send + 'static,
    {
        self.join_both_with(other, dispatch, action)
    }

    /// Runs `action` once both succeed.
    pub fn run_after_both<U, F>(&self, other: &Deferred<U>, action: F) -> Deferred<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.join_both_with(other, Dispatch::Inline, move |_, _| action())
    }

    /// [`run_after_both`](Self::run_after_both) with an explicit dispatch.
    pub fn run_after_both_with<U, F>(
        &self,
        other: &Deferred<U>,
        dispatch: Dispatch,
        action: F,
    ) -> Deferred<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.join_both_with(other, dispatch, move |_, _| action())
    }

    // =========================================================================
    // Either
    // =========================================================================

    /// Applies `function` to whichever of two cells settles first.
    ///
    /// The first settle wins whether it is a value or a failure; a winning
    /// failure fails the destination and `function` never runs. The loser is
    /// left alone.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::Deferred;
    ///
    /// let never = Deferred::new();
    /// let ready = Deferred::completed("cache");
    /// assert_eq!(never.race_two(&ready, |source| source.len()).join(), Ok(5));
    /// ```
    pub fn race_two<V, F>(&self, other: &Self, function: F) -> Deferred<V>
    where
        V: Clone + Send + 'static,
        F: FnOnce(T) -> V + Send + 'static,
    {
        self.race_two_with(other, Dispatch::Inline, function)
    }

    /// [`race_two`](Self::race_two) with an explicit dispatch for `function`.
    pub fn race_two_with<V, F>(&self, other: &Self, dispatch: Dispatch, function: F) -> Deferred<V>
    where
        V: Clone + Send + 'static,
        F: FnOnce(T) -> V + Send + 'static,
    {
        let destination = Deferred::new();
        let race = Arc::new(Race::new(function));

        for source in [self, other] {
            let race = Arc::clone(&race);
            let target = destination.clone();
            let dispatch = dispatch.clone();
            source.subscribe(move |outcome| {
                if !race.claim() {
                    return;
                }
                match outcome {
                    Ok(value) => {
                        let function = race.function.lock().take();
                        if let Some(function) = function {
                            dispatch.execute(move || {
                                target.resolve(fault::trap(move || function(value)));
                            });
                        }
                    }
                    Err(failure) => forward_failure(failure, target, &dispatch),
                }
            });
        }

        destination
    }

    /// Consumes whichever value arrives first.
    pub fn accept_either<F>(&self, other: &Self, action: F) -> Deferred<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.race_two_with(other, Dispatch::Inline, action)
    }

    /// [`accept_either`](Self::accept_either) with an explicit dispatch.
    pub fn accept_either_with<F>(&self, other: &Self, dispatch: Dispatch, action: F) -> Deferred<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.race_two_with(other, dispatch, action)
    }

    /// Runs `action` once either cell succeeds first.
    pub fn run_after_either<F>(&self, other: &Self, action: F) -> Deferred<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.race_two_with(other, Dispatch::Inline, move |_| action())
    }

    /// [`run_after_either`](Self::run_after_either) with an explicit dispatch.
    pub fn run_after_either_with<F>(
        &self,
        other: &Self,
        dispatch: Dispatch,
        action: F,
    ) -> Deferred<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.race_two_with(other, dispatch, move |_| action())
    }
}

// =============================================================================
// N-ary
// =============================================================================

/// Completes once every input succeeds; fails fast on the first failure.
///
/// An empty input completes immediately. Remaining inputs are not canceled
/// after a failure.
///
/// # Examples
///
/// ```rust
/// use settle::{Deferred, Failure, join_all};
///
/// let all = join_all((1..=3).map(|index| Deferred::supply(move || index)));
/// assert_eq!(all.join(), Ok(()));
///
/// let empty = join_all(Vec::<Deferred<i32>>::new());
/// assert!(empty.is_done());
///
/// let failing = join_all([Deferred::new(), Deferred::<u8>::failed(Failure::Timeout)]);
/// assert_eq!(failing.join(), Err(Failure::Timeout));
/// ```
pub fn join_all<T, I>(inputs: I) -> Deferred<()>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let inputs: Vec<_> = inputs.into_iter().collect();
    if inputs.is_empty() {
        return Deferred::completed(());
    }

    let destination = Deferred::new();
    let remaining = Arc::new(AtomicUsize::new(inputs.len()));
    let failed = Arc::new(AtomicBool::new(false));

    for input in &inputs {
        let remaining = Arc::clone(&remaining);
        let failed = Arc::clone(&failed);
        let target = destination.clone();
        input.subscribe(move |outcome| match outcome {
            Ok(_) => {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    target.complete(());
                }
            }
            Err(failure) => {
                if !failed.swap(true, Ordering::AcqRel) {
                    target.fail(failure);
                }
            }
        });
    }

    destination
}

/// Completes with every input's value, in input order; fails fast on the first
/// failure.
///
/// # Examples
///
/// ```rust
/// use settle::{Deferred, join_all_values};
///
/// let sizes = join_all_values(["a", "bb", "ccc"].map(|text| Deferred::supply(move || text.len())));
/// assert_eq!(sizes.join(), Ok(vec![1, 2, 3]));
/// ```
pub fn join_all_values<T, I>(inputs: I) -> Deferred<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let inputs: Vec<_> = inputs.into_iter().collect();
    if inputs.is_empty() {
        return Deferred::completed(Vec::new());
    }

    let destination = Deferred::new();
    let slots = Arc::new(Mutex::new(vec![None; inputs.len()]));
    let remaining = Arc::new(AtomicUsize::new(inputs.len()));

    for (index, input) in inputs.iter().enumerate() {
        let slots = Arc::clone(&slots);
        let remaining = Arc::clone(&remaining);
        let target = destination.clone();
        input.subscribe(move |outcome| match outcome {
            Ok(value) => {
                slots.lock()[index] = Some(value);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let values = mem::take(&mut *slots.lock());
                    target.complete(values.into_iter().flatten().collect());
                }
            }
            Err(failure) => {
                target.fail(failure);
            }
        });
    }

    destination
}

/// Settles with the outcome of whichever input settles first.
///
/// # Examples
///
/// ```rust
/// use settle::{Deferred, Failure, race_any};
///
/// let winner = race_any([Deferred::new(), Deferred::completed(9), Deferred::new()]);
/// assert_eq!(winner.join(), Ok(9));
///
/// assert_eq!(race_any(Vec::<Deferred<i32>>::new()).join(), Err(Failure::NoCandidates));
/// ```
pub fn race_any<T, I>(candidates: I) -> Deferred<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let candidates: Vec<_> = candidates.into_iter().collect();
    if candidates.is_empty() {
        return Deferred::failed(Failure::NoCandidates);
    }

    let destination = Deferred::new();
    let won = Arc::new(AtomicBool::new(false));

    for candidate in &candidates {
        let won = Arc::clone(&won);
        let target = destination.clone();
        candidate.subscribe(move |outcome| {
            if !won.swap(true, Ordering::AcqRel) {
                target.resolve(outcome);
            }
        });
    }

    destination
}

//! The deferred result cell and everything built on it.
//!
//! A [`Deferred<T>`] is a single-assignment slot for a value or a [`Failure`].
//! It is completed exactly once, by whichever thread wins the race, and every
//! continuation registered on it observes that one outcome.
//!
//! # State machine
//!
//! ```text
//! Pending --CAS--> Completing --store--> Done
//! ```
//!
//! - `Pending → Completing` is a lock-free compare-exchange; the single winner
//!   is the completing thread. Every other `complete`/`fail`/`cancel` returns
//!   `false` without touching the cell.
//! - While `Completing`, the winner holds the slot lock, writes the outcome,
//!   takes the continuation list and the wait signal, and stores `Done` before
//!   releasing the lock. Nobody can observe `Done` without an outcome.
//! - A continuation registered before `Done` is queued and run by the
//!   completing thread, in registration order, before `complete` returns.
//!   A continuation registered at or after `Done` runs immediately on the
//!   registering thread.
//! - The wait signal is created only when a thread actually has to block, and
//!   is readied only by the completing thread.
//!
//! # Examples
//!
//! ```rust
//! use settle::{Deferred, Failure};
//!
//! let doubled = Deferred::supply(|| 10).map(|value| value * 2);
//! assert_eq!(doubled.join(), Ok(20));
//!
//! let recovered = Deferred::supply(|| -> &'static str { panic!("boom") })
//!     .recover(|_failure| Ok("fallback"));
//! assert_eq!(recovered.join(), Ok("fallback"));
//!
//! let slow = Deferred::<i32>::new();
//! assert_eq!(slow.join_timeout(std::time::Duration::from_millis(5)), Err(Failure::Timeout));
//! ```

#[cfg(feature = "async")]
mod bridge;
mod chain;
mod combine;
mod signal;
mod supply;
mod timeout;

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::cancel::CancelToken;
use crate::error::{Failure, StateError};
use crate::executor::Dispatch;
use crate::fault;

#[cfg(feature = "async")]
pub use bridge::DeferredFuture;
pub use chain::IntoDeferred;
pub use combine::{join_all, join_all_values, race_any};
use signal::Signal;

/// State: no outcome yet.
const STATE_PENDING: u8 = 0;
/// State: the winning thread is writing the outcome.
const STATE_COMPLETING: u8 = 1;
/// State: outcome recorded.
const STATE_DONE: u8 = 2;

/// Continuation stored on a pending cell.
type Continuation<T> = Box<dyn FnOnce(Result<T, Failure>) + Send>;

/// Queued continuations keyed by registration number.
type Continuations<T> = SmallVec<[(u64, Continuation<T>); 4]>;

struct Slot<T> {
    outcome: Option<Result<T, Failure>>,
    continuations: Continuations<T>,
    next_key: u64,
    signal: Option<Arc<Signal>>,
}

struct Shared<T> {
    state: AtomicU8,
    slot: Mutex<Slot<T>>,
    token: CancelToken,
}

/// Everything the completing thread takes out of the slot.
struct Drained<T> {
    outcome: Result<T, Failure>,
    continuations: Continuations<T>,
    signal: Option<Arc<Signal>>,
}

/// What a blocking caller found under the slot lock.
enum Wait<T> {
    Settled(Result<T, Failure>),
    Blocked(Arc<Signal>),
}

/// A deferred result: a cell completed exactly once with a value or a failure.
///
/// `Deferred` is a cheap handle; clones refer to the same cell. Values are
/// cloned out to each observer, hence the `T: Clone` bound on most operations.
///
/// # Thread Safety
///
/// `Deferred<T>` is `Send + Sync` when `T: Send`. Any thread may complete,
/// observe, or chain onto a cell.
///
/// # Examples
///
/// ```rust
/// use settle::Deferred;
///
/// let cell = Deferred::new();
/// let observer = cell.map(|value: i32| value + 1);
///
/// assert!(cell.complete(41));
/// assert!(!cell.complete(0));
/// assert_eq!(observer.join(), Ok(42));
/// ```
pub struct Deferred<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Creates a pending cell with a fresh root cancellation token.
    pub fn new() -> Self {
        Self::with_token(CancelToken::new())
    }

    /// Creates a pending cell whose token is a child of `parent`.
    ///
    /// Canceling `parent` signals this cell's token, which producers check
    /// before running the supplier.
    pub fn with_parent(parent: &CancelToken) -> Self {
        Self::with_token(parent.child())
    }

    fn with_token(token: CancelToken) -> Self {
        Self::from_parts(STATE_PENDING, None, token)
    }

    fn from_parts(state: u8, outcome: Option<Result<T, Failure>>, token: CancelToken) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(state),
                slot: Mutex::new(Slot {
                    outcome,
                    continuations: SmallVec::new(),
                    next_key: 0,
                    signal: None,
                }),
                token,
            }),
        }
    }

    /// Creates a cell that has already completed with `value`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::Deferred;
    ///
    /// let cell = Deferred::completed("ready");
    /// assert!(cell.is_done());
    /// assert_eq!(cell.join(), Ok("ready"));
    /// ```
    pub fn completed(value: T) -> Self {
        Self::from_parts(STATE_DONE, Some(Ok(value)), CancelToken::new())
    }

    /// Creates a cell that has already failed with `failure`.
    pub fn failed(failure: Failure) -> Self {
        Self::from_parts(STATE_DONE, Some(Err(failure)), CancelToken::new())
    }

    // =========================================================================
    // State inspection
    // =========================================================================

    /// Returns `true` once an outcome has been recorded. Lock-free.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == STATE_DONE
    }

    /// Returns `true` if the cell completed with [`Failure::Canceled`].
    pub fn is_canceled(&self) -> bool {
        matches!(self.snapshot(), Some(Err(Failure::Canceled)))
    }

    /// Returns `true` if the cell failed for a reason other than cancellation.
    pub fn is_completed_exceptionally(&self) -> bool {
        matches!(self.snapshot(), Some(Err(failure)) if !failure.is_canceled())
    }

    /// The cell's cancellation token; suppliers poll it to stop early.
    pub fn token(&self) -> &CancelToken {
        &self.shared.token
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Completes the cell with `value`.
    ///
    /// Returns `true` iff this call performed the transition. On success the
    /// wait signal is readied and queued continuations run on this thread
    /// before the call returns.
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Fails the cell with `failure`. Same contract as [`complete`](Self::complete).
    pub fn fail(&self, failure: Failure) -> bool {
        self.resolve(Err(failure))
    }

    /// Fails the cell with an arbitrary error wrapped in [`Failure::Computation`].
    pub fn fail_with<E>(&self, error: E) -> bool
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.fail(Failure::computation(error))
    }

    /// Cancels the cell, recording [`Failure::Canceled`] and canceling its token.
    ///
    /// Cancellation is cooperative: a running supplier keeps running until it
    /// polls the token. `may_interrupt` is accepted for API familiarity and has
    /// no further effect.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::{Deferred, Failure};
    ///
    /// let cell = Deferred::<u8>::new();
    /// assert!(cell.cancel(true));
    /// assert!(cell.is_canceled());
    /// assert!(cell.token().is_canceled());
    /// assert_eq!(cell.join(), Err(Failure::Canceled));
    /// ```
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        let Some(drained) = self.transition(Err(Failure::Canceled)) else {
            return false;
        };
        tracing::trace!(may_interrupt, "deferred canceled");
        self.shared.token.cancel();
        Self::fire(drained);
        true
    }

    /// Overwrites the outcome with `value`, whatever the current state.
    ///
    /// If the cell is still pending this is an ordinary completion. If it is
    /// already done, only the stored outcome changes: continuations that already
    /// ran are not run again and keep whatever they observed.
    ///
    /// Meant for diagnostics and tests; it can make the cell disagree with its
    /// observers.
    pub fn force_set(&self, value: T) {
        self.force(Ok(value));
    }

    /// Overwrites the outcome with `failure`, whatever the current state.
    /// See [`force_set`](Self::force_set).
    pub fn force_fail(&self, failure: Failure) {
        self.force(Err(failure));
    }

    fn force(&self, outcome: Result<T, Failure>) {
        if let Some(drained) = self.transition(outcome.clone()) {
            Self::fire(drained);
            return;
        }
        self.spin_until_done();
        self.shared.slot.lock().outcome = Some(outcome);
    }

    /// Ordinary completion path shared by `complete`, `fail`, and operators.
    fn resolve(&self, outcome: Result<T, Failure>) -> bool {
        match self.transition(outcome) {
            Some(drained) => {
                Self::fire(drained);
                true
            }
            None => false,
        }
    }

    /// Performs `Pending → Completing → Done`; `None` if another call won.
    fn transition(&self, outcome: Result<T, Failure>) -> Option<Drained<T>> {
        self.shared
            .state
            .compare_exchange(
                STATE_PENDING,
                STATE_COMPLETING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()?;

        let mut slot = self.shared.slot.lock();
        slot.outcome = Some(outcome.clone());
        let continuations = mem::take(&mut slot.continuations);
        let signal = slot.signal.take();
        self.shared.state.store(STATE_DONE, Ordering::Release);
        drop(slot);

        Some(Drained {
            outcome,
            continuations,
            signal,
        })
    }

    fn fire(drained: Drained<T>) {
        let Drained {
            outcome,
            continuations,
            signal,
        } = drained;
        if let Some(signal) = signal {
            signal.ready();
        }
        for (_, continuation) in continuations {
            continuation(outcome.clone());
        }
    }

    /// Waits out another thread's `Completing` window.
    fn spin_until_done(&self) {
        let mut spin_count = 0u32;
        while self.shared.state.load(Ordering::Acquire) != STATE_DONE {
            for _ in 0..(1u32 << spin_count.min(6)) {
                std::hint::spin_loop();
            }
            spin_count += 1;
            if spin_count > 10 {
                std::thread::yield_now();
            }
        }
    }

    // =========================================================================
    // Non-blocking access
    // =========================================================================

    /// The recorded outcome, if done.
    fn snapshot(&self) -> Option<Result<T, Failure>> {
        if !self.is_done() {
            return None;
        }
        self.shared.slot.lock().outcome.clone()
    }

    /// Returns the outcome if done, otherwise `Ok(default)`. Never blocks.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::Deferred;
    ///
    /// let cell = Deferred::new();
    /// assert_eq!(cell.get_now(0), Ok(0));
    /// cell.complete(5);
    /// assert_eq!(cell.get_now(0), Ok(5));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the recorded failure if the cell failed.
    pub fn get_now(&self, default: T) -> Result<T, Failure> {
        self.snapshot().unwrap_or(Ok(default))
    }

    /// Returns the value of a normally completed cell.
    ///
    /// # Errors
    ///
    /// - [`StateError::NotCompleted`] if the cell is not done.
    /// - [`StateError::Failed`] if the cell failed.
    pub fn try_result_now(&self) -> Result<T, StateError> {
        match self.snapshot() {
            None => Err(StateError::NotCompleted),
            Some(Ok(value)) => Ok(value),
            Some(Err(failure)) => Err(StateError::Failed(failure)),
        }
    }

    /// Returns the value of a normally completed cell.
    ///
    /// # Panics
    ///
    /// Panics if the cell is not done or failed; calling this in the wrong state
    /// is a logic error. Use [`try_result_now`](Self::try_result_now) otherwise.
    pub fn result_now(&self) -> T {
        match self.try_result_now() {
            Ok(value) => value,
            Err(error) => panic!("result_now: {error}"),
        }
    }

    /// Returns the failure of a failed cell.
    ///
    /// # Errors
    ///
    /// - [`StateError::NotCompleted`] if the cell is not done.
    /// - [`StateError::NotFailed`] if the cell completed normally.
    pub fn try_failure_now(&self) -> Result<Failure, StateError> {
        match self.snapshot() {
            None => Err(StateError::NotCompleted),
            Some(Ok(_)) => Err(StateError::NotFailed),
            Some(Err(failure)) => Ok(failure),
        }
    }

    /// Returns the failure of a failed cell.
    ///
    /// # Panics
    ///
    /// Panics if the cell is not done or completed normally.
    pub fn failure_now(&self) -> Failure {
        match self.try_failure_now() {
            Ok(failure) => failure,
            Err(error) => panic!("failure_now: {error}"),
        }
    }

    // =========================================================================
    // Blocking access
    // =========================================================================

    /// Returns the outcome if done; otherwise the (lazily created) wait signal.
    fn waiter(&self) -> Wait<T> {
        let mut slot = self.shared.slot.lock();
        if self.is_done()
            && let Some(outcome) = slot.outcome.clone()
        {
            return Wait::Settled(outcome);
        }
        let signal = slot.signal.get_or_insert_with(|| Arc::new(Signal::new()));
        Wait::Blocked(Arc::clone(signal))
    }

    /// Blocks the calling thread until the cell is done.
    ///
    /// # Errors
    ///
    /// Returns the recorded failure if the cell failed. `join` itself never
    /// panics for a data-flow failure.
    pub fn join(&self) -> Result<T, Failure> {
        loop {
            match self.waiter() {
                Wait::Settled(outcome) => return outcome,
                Wait::Blocked(signal) => signal.wait(),
            }
        }
    }

    /// Blocks until the cell is done or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::Timeout`] if the time ran out first, otherwise the
    /// recorded failure if the cell failed. The cell itself is left untouched
    /// on timeout.
    pub fn join_timeout(&self, timeout: Duration) -> Result<T, Failure> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            match (self.waiter(), deadline) {
                (Wait::Settled(outcome), _) => return outcome,
                (Wait::Blocked(signal), Some(deadline)) => {
                    if !signal.wait_until(deadline) {
                        return Err(Failure::Timeout);
                    }
                }
                (Wait::Blocked(signal), None) => signal.wait(),
            }
        }
    }

    /// Blocks until the cell is done or `token` is canceled.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::Canceled`] if the token fired first, otherwise the
    /// recorded failure if the cell failed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::{CancelToken, Deferred, Failure};
    ///
    /// let token = CancelToken::new();
    /// token.cancel();
    /// assert_eq!(Deferred::<i32>::new().join_cancellable(&token), Err(Failure::Canceled));
    /// ```
    pub fn join_cancellable(&self, token: &CancelToken) -> Result<T, Failure> {
        if let Some(outcome) = self.snapshot() {
            return outcome;
        }
        let wake = Arc::new(Signal::new());
        let on_done = Arc::clone(&wake);
        let key = self.register(move |_| on_done.ready());
        let on_cancel = Arc::clone(&wake);
        let hook = token.on_cancel(move || on_cancel.ready());

        wake.wait();
        token.remove_hook(hook);
        if let Some(key) = key {
            self.unsubscribe(key);
        }
        self.snapshot().unwrap_or(Err(Failure::Canceled))
    }

    // =========================================================================
    // Continuations
    // =========================================================================

    /// Registers `continuation` without any fault trapping.
    ///
    /// Runs it immediately when the cell is already done, otherwise queues it
    /// for the completing thread. Only for crate-internal continuations that
    /// trap user code themselves.
    fn subscribe<F>(&self, continuation: F)
    where
        F: FnOnce(Result<T, Failure>) + Send + 'static,
    {
        let _ = self.register(continuation);
    }

    /// Like `subscribe`, returning the queue key when the continuation was
    /// queued rather than run. `None` means it already ran.
    fn register<F>(&self, continuation: F) -> Option<u64>
    where
        F: FnOnce(Result<T, Failure>) + Send + 'static,
    {
        if let Some(outcome) = self.snapshot() {
            continuation(outcome);
            return None;
        }

        let mut slot = self.shared.slot.lock();
        if !self.is_done() {
            let key = slot.next_key;
            slot.next_key += 1;
            slot.continuations.push((key, Box::new(continuation)));
            return Some(key);
        }
        let outcome = slot.outcome.clone();
        drop(slot);
        if let Some(outcome) = outcome {
            continuation(outcome);
        }
        None
    }

    /// Drops a queued continuation. A no-op once the completing thread has
    /// taken the queue.
    fn unsubscribe(&self, key: u64) {
        let mut slot = self.shared.slot.lock();
        let position = slot.continuations.iter().position(|(queued, _)| *queued == key);
        let removed = position.map(|index| slot.continuations.remove(index));
        drop(slot);
        drop(removed);
    }

    /// Registers a callback to run with the outcome.
    ///
    /// If the cell is already done the callback runs immediately on the calling
    /// thread (or is submitted, for a pooled dispatch). Otherwise it is queued
    /// and runs on the completing thread in registration order. A panic inside
    /// the callback is trapped and logged; it never disturbs other callbacks.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::mpsc;
    /// use settle::{Deferred, Dispatch};
    ///
    /// let (sender, receiver) = mpsc::channel();
    /// let cell = Deferred::new();
    /// cell.on_complete(Dispatch::Inline, move |outcome| sender.send(outcome).unwrap());
    /// cell.complete("done");
    /// assert_eq!(receiver.recv().unwrap(), Ok("done"));
    /// ```
    pub fn on_complete<F>(&self, dispatch: Dispatch, callback: F)
    where
        F: FnOnce(Result<T, Failure>) + Send + 'static,
    {
        self.subscribe(move |outcome| {
            dispatch.execute(move || {
                if let Err(failure) = fault::trap(move || callback(outcome)) {
                    tracing::warn!(%failure, "completion callback panicked");
                }
            });
        });
    }
}

impl<T: Clone + Send + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + fmt::Debug + 'static> fmt::Debug for Deferred<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = formatter.debug_struct("Deferred");
        match self.shared.state.load(Ordering::Acquire) {
            STATE_PENDING => debug.field("state", &"Pending"),
            STATE_COMPLETING => debug.field("state", &"Completing"),
            _ => debug
                .field("state", &"Done")
                .field("outcome", &self.snapshot()),
        };
        debug.finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Deferred<i32>: Send, Sync, Clone);
static_assertions::assert_impl_all!(Deferred<String>: Send, Sync, Clone);

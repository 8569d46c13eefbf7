//! Deadline guards that settle a cell if it takes too long.
//!
//! Each guard parks one `settle-timer` thread on a private signal. The signal
//! is readied by an inline continuation on the cell, so the timer exits as soon
//! as the cell settles on its own. Cells that are already done spawn nothing.

use std::sync::Arc;
use std::time::Duration;

use super::{Deferred, Signal};
use crate::error::{ExecutorError, Failure};
use crate::executor::spawn_named;

const TIMER_THREAD: &str = "settle-timer";

/// Body of a timer thread.
type TimerJob = Box<dyn FnOnce() + Send>;

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Fails the cell with [`Failure::Timeout`] unless it settles within
    /// `timeout`. Returns a handle to the same cell.
    ///
    /// If the operating system refuses to start the timer thread the guard is
    /// not armed: an `error` event is logged and the cell is left to settle on
    /// its own. Use [`try_or_timeout`](Self::try_or_timeout) to observe that.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use settle::{Deferred, Failure};
    ///
    /// let stalled = Deferred::<i32>::new().or_timeout(Duration::from_millis(10));
    /// assert_eq!(stalled.join(), Err(Failure::Timeout));
    /// ```
    #[must_use = "the returned handle refers to the guarded cell"]
    pub fn or_timeout(&self, timeout: Duration) -> Self {
        if let Err(error) = self.try_or_timeout(timeout) {
            tracing::error!(%error, ?timeout, "deadline guard left unarmed");
        }
        self.clone()
    }

    /// Like [`or_timeout`](Self::or_timeout), but reports a guard that could
    /// not be armed.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ThreadUnavailable`] if no timer thread could be
    /// started. The cell is untouched and carries no guard in that case.
    pub fn try_or_timeout(&self, timeout: Duration) -> Result<Self, ExecutorError> {
        let cell = self.clone();
        self.arm_timer(timeout, move || {
            if cell.fail(Failure::Timeout) {
                tracing::debug!(?timeout, "deadline elapsed, failing deferred");
            }
        })?;
        Ok(self.clone())
    }

    /// Completes the cell with `value` unless it settles within `timeout`.
    /// Returns a handle to the same cell.
    ///
    /// Like [`or_timeout`](Self::or_timeout), a guard whose timer thread cannot
    /// start is logged and left unarmed; see
    /// [`try_complete_on_timeout`](Self::try_complete_on_timeout).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use settle::Deferred;
    ///
    /// let answer = Deferred::new().complete_on_timeout("default", Duration::from_millis(10));
    /// assert_eq!(answer.join(), Ok("default"));
    /// ```
    #[must_use = "the returned handle refers to the guarded cell"]
    pub fn complete_on_timeout(&self, value: T, timeout: Duration) -> Self {
        if let Err(error) = self.try_complete_on_timeout(value, timeout) {
            tracing::error!(%error, ?timeout, "deadline guard left unarmed");
        }
        self.clone()
    }

    /// Like [`complete_on_timeout`](Self::complete_on_timeout), but reports a
    /// guard that could not be armed.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ThreadUnavailable`] if no timer thread could be
    /// started.
    pub fn try_complete_on_timeout(&self, value: T, timeout: Duration) -> Result<Self, ExecutorError> {
        let cell = self.clone();
        self.arm_timer(timeout, move || {
            if cell.complete(value) {
                tracing::debug!(?timeout, "deadline elapsed, completing deferred with fallback");
            }
        })?;
        Ok(self.clone())
    }

    fn arm_timer<F>(&self, timeout: Duration, expire: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.arm_timer_on(timeout, expire, |job| spawn_named(TIMER_THREAD, job))
    }

    /// Arms a guard using `spawn` to start the timer thread.
    fn arm_timer_on<F, S>(&self, timeout: Duration, expire: F, spawn: S) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
        S: FnOnce(TimerJob) -> Result<(), TimerJob>,
    {
        if self.is_done() {
            return Ok(());
        }

        let wake = Arc::new(Signal::new());
        let on_settle = Arc::clone(&wake);
        let Some(key) = self.register(move |_| on_settle.ready()) else {
            return Ok(());
        };

        let timer: TimerJob = Box::new(move || {
            if !wake.wait_for(timeout) {
                expire();
            }
        });
        if spawn(timer).is_err() {
            self.unsubscribe(key);
            return Err(ExecutorError::ThreadUnavailable(TIMER_THREAD));
        }
        Ok(())
    }
}

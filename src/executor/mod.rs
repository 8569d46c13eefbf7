//! Executors that run units of work on behalf of deferred cells.
//!
//! - [`Executor`]: the submission seam every producer and pooled continuation
//!   goes through.
//! - [`BoundedExecutor`]: admits at most N concurrently running units and blocks
//!   the submitter when full (backpressure, no queue).
//! - [`ThreadExecutor`]: one fresh thread per unit, unbounded.
//! - [`InlineExecutor`]: runs the unit on the submitting thread.
//! - [`Dispatch`]: where a continuation body runs.
//!
//! The process-wide default executor lives in [`global`].

mod bounded;
pub mod global;
mod thread;

use std::fmt;
use std::sync::Arc;

pub use bounded::BoundedExecutor;
pub use global::{default_executor, set_default_capacity, set_default_executor};
pub use thread::{InlineExecutor, ThreadExecutor};

pub(crate) use thread::spawn_named;

/// A unit of work accepted by an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Accepts units of work for execution.
///
/// Implementations must never let a panic inside a task escape into the
/// submitting thread or tear down a worker; [`crate::fault::trap`] is the
/// intended boundary.
pub trait Executor: Send + Sync {
    /// Submits a unit of work.
    fn submit(&self, task: Task);
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    #[inline]
    fn submit(&self, task: Task) {
        (**self).submit(task);
    }
}

/// Where a continuation body runs once its source has settled.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use settle::{BoundedExecutor, Deferred, Dispatch};
///
/// let io = Arc::new(BoundedExecutor::new(2));
/// let length = Deferred::completed("settled".to_string())
///     .map_with(Dispatch::On(io), |text| text.len());
/// assert_eq!(length.join(), Ok(7));
/// ```
#[derive(Clone, Default)]
pub enum Dispatch {
    /// Run on whichever thread observes or produces the source outcome.
    #[default]
    Inline,
    /// Submit to the process-wide default executor.
    Pooled,
    /// Submit to the given executor for this one step.
    On(Arc<dyn Executor>),
}

impl Dispatch {
    /// Runs `body` according to this dispatch mode.
    pub(crate) fn execute<F>(&self, body: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Self::Inline => body(),
            Self::Pooled => default_executor().submit(Box::new(body)),
            Self::On(executor) => executor.submit(Box::new(body)),
        }
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => formatter.write_str("Inline"),
            Self::Pooled => formatter.write_str("Pooled"),
            Self::On(_) => formatter.write_str("On(<executor>)"),
        }
    }
}

/// Capacity of the default executor: twice the logical CPU count, at least 4.
pub fn default_capacity() -> usize {
    num_cpus::get().saturating_mul(2).max(4)
}

/// Runs a task behind the fault boundary, logging a trapped panic.
pub(crate) fn run_trapped(task: Task) {
    if let Err(failure) = crate::fault::trap(task) {
        tracing::error!(%failure, "executor task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[rstest]
    fn default_capacity_has_floor_of_four() {
        assert!(default_capacity() >= 4);
        assert_eq!(default_capacity() % 2, 0);
    }

    #[rstest]
    fn inline_dispatch_runs_on_caller() {
        let caller = std::thread::current().id();
        let observed = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::clone(&observed);
        Dispatch::Inline.execute(move || {
            *slot.lock() = Some(std::thread::current().id());
        });
        assert_eq!(*observed.lock(), Some(caller));
    }

    #[rstest]
    fn explicit_dispatch_uses_given_executor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        Dispatch::On(Arc::new(InlineExecutor)).execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn dispatch_debug_labels() {
        assert_eq!(format!("{:?}", Dispatch::Inline), "Inline");
        assert_eq!(format!("{:?}", Dispatch::Pooled), "Pooled");
        assert_eq!(
            format!("{:?}", Dispatch::On(Arc::new(InlineExecutor))),
            "On(<executor>)"
        );
    }

    #[rstest]
    fn run_trapped_swallows_panics() {
        run_trapped(Box::new(|| panic!("task failure")));
    }
}

//! Process-wide default executor.
//!
//! Producers and [`Dispatch::Pooled`](super::Dispatch::Pooled) continuations use
//! this executor unless told otherwise. It starts out as a
//! [`BoundedExecutor`] sized by [`default_capacity`](super::default_capacity) and
//! is created lazily on first use.
//!
//! # Replacement
//!
//! [`set_default_executor`] swaps the slot atomically, so a concurrent reader
//! always sees either the old or the new executor. Replacement is meant for
//! program startup: work submitted before the swap keeps running on the old
//! executor, and mixing both under load gives no combined concurrency bound.

use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;

use super::{BoundedExecutor, Executor, Task};
use crate::error::ExecutorError;

static DEFAULT_EXECUTOR: LazyLock<ArcSwap<Arc<dyn Executor>>> = LazyLock::new(|| {
    let executor: Arc<dyn Executor> = Arc::new(BoundedExecutor::with_default_capacity());
    ArcSwap::from_pointee(executor)
});

/// Returns the current default executor.
///
/// # Examples
///
/// ```rust
/// use settle::Executor;
/// use settle::executor::default_executor;
///
/// let (sender, receiver) = std::sync::mpsc::channel();
/// default_executor().submit(Box::new(move || sender.send(1).unwrap()));
/// assert_eq!(receiver.recv().unwrap(), 1);
/// ```
pub fn default_executor() -> Arc<dyn Executor> {
    let current = DEFAULT_EXECUTOR.load();
    Arc::clone(&**current)
}

/// Replaces the default executor.
///
/// Intended to be called once at startup, before concurrent traffic begins.
pub fn set_default_executor(executor: Arc<dyn Executor>) {
    DEFAULT_EXECUTOR.store(Arc::new(executor));
    tracing::info!("default executor replaced");
}

/// Replaces the default executor with a [`BoundedExecutor`] of the given
/// capacity.
///
/// # Errors
///
/// Returns [`ExecutorError::InvalidCapacity`] if `capacity` is 0; the current
/// default is kept in that case.
pub fn set_default_capacity(capacity: usize) -> Result<(), ExecutorError> {
    let executor = BoundedExecutor::try_new(capacity)?;
    set_default_executor(Arc::new(executor));
    Ok(())
}

/// Submits a task to the default executor.
pub fn submit(task: Task) {
    default_executor().submit(task);
}

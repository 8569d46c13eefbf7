//! Thread-backed executors and the named-thread spawn helper.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use super::{Executor, Task, run_trapped};

/// Spawns `job` on a new named thread.
///
/// Returns the job back if the operating system refuses to create the thread,
/// so the caller decides whether to run it elsewhere or give up.
pub(crate) fn spawn_named<F>(name: &str, job: F) -> Result<(), F>
where
    F: FnOnce() + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Some(job)));
    let remote = Arc::clone(&slot);
    let spawned = thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            let job = remote.lock().take();
            if let Some(job) = job {
                job();
            }
        });

    match spawned {
        Ok(_) => Ok(()),
        Err(error) => {
            tracing::warn!(%error, thread = name, "failed to spawn thread");
            let job = slot.lock().take();
            job.map_or(Ok(()), Err)
        }
    }
}

/// Runs every task on its own fresh thread, without a concurrency limit.
///
/// # Examples
///
/// ```rust
/// use settle::{Deferred, ThreadExecutor};
///
/// let answer = Deferred::supply_on(&ThreadExecutor, || 42);
/// assert_eq!(answer.join(), Ok(42));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn submit(&self, task: Task) {
        if let Err(task) = spawn_named("settle-thread", move || run_trapped(task)) {
            task();
        }
    }
}

/// Runs every task immediately on the submitting thread.
///
/// Useful for deterministic tests and for steps known to be cheap.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    #[inline]
    fn submit(&self, task: Task) {
        run_trapped(task);
    }
}

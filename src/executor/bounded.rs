//! Bounded-concurrency executor with blocking backpressure.
//!
//! # Capacity Model
//!
//! - `capacity`: the number of permits, i.e. the maximum number of units running
//!   at once.
//! - There is no queue. `submit` blocks the caller until a permit frees up.
//! - Each admitted unit runs on its own thread and holds its permit until it
//!   returns or panics.
//!
//! # Re-entrant submission
//!
//! A running unit that submits to its own executor (a pooled continuation fired
//! by a pooled supplier, for example) would deadlock once every permit is held by
//! a unit doing the same. When the submitting thread is already a worker of this
//! executor and no permit is free, the new unit runs on that worker under the
//! worker's own permit. The concurrency bound still holds.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::{Executor, Task, default_capacity, run_trapped, spawn_named};
use crate::error::ExecutorError;

thread_local! {
    /// Identity of the permit pool whose worker this thread currently is.
    static WORKER_OF: Cell<usize> = const { Cell::new(0) };
}

/// Counting permit pool.
struct Permits {
    capacity: usize,
    available: Mutex<usize>,
    released: Condvar,
}

impl Permits {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: Mutex::new(capacity),
            released: Condvar::new(),
        }
    }

    fn id(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }

    fn acquire(self: &Arc<Self>) -> Permit {
        let mut available = self.available.lock();
        while *available == 0 {
            self.released.wait(&mut available);
        }
        *available -= 1;
        Permit {
            permits: Arc::clone(self),
        }
    }

    fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(Permit {
            permits: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut available = self.available.lock();
        *available += 1;
        drop(available);
        self.released.notify_one();
    }

    fn available(&self) -> usize {
        *self.available.lock()
    }
}

/// A held permit; released on drop, on every exit path.
struct Permit {
    permits: Arc<Permits>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.permits.release();
    }
}

/// Marks the current thread as a worker of a pool and restores the previous
/// mark on drop.
struct WorkerMark {
    previous: usize,
}

impl WorkerMark {
    fn enter(pool: usize) -> Self {
        Self {
            previous: WORKER_OF.with(|mark| mark.replace(pool)),
        }
    }
}

impl Drop for WorkerMark {
    fn drop(&mut self) {
        WORKER_OF.with(|mark| mark.set(self.previous));
    }
}

/// An executor that admits at most `capacity` concurrently running units.
///
/// `submit` blocks the caller while every permit is in use. A panic inside a
/// unit is trapped and logged; the permit is always returned.
///
/// # Examples
///
/// ```rust
/// use settle::{BoundedExecutor, Deferred};
///
/// let executor = BoundedExecutor::new(2);
/// let cells: Vec<_> = (0..4)
///     .map(|index| Deferred::supply_on(&executor, move || index * 10))
///     .collect();
///
/// let values: Vec<_> = cells.iter().map(|cell| cell.join().unwrap()).collect();
/// assert_eq!(values, vec![0, 10, 20, 30]);
/// ```
#[derive(Clone)]
pub struct BoundedExecutor {
    permits: Arc<Permits>,
}

impl fmt::Debug for BoundedExecutor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BoundedExecutor")
            .field("capacity", &self.capacity())
            .field("running", &self.running())
            .finish_non_exhaustive()
    }
}

impl BoundedExecutor {
    /// Creates an executor with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0. Use [`try_new`](Self::try_new) for a
    /// non-panicking version.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::try_new(capacity).expect("BoundedExecutor capacity must be greater than 0")
    }

    /// Tries to create an executor with the given capacity.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidCapacity`] if `capacity` is 0.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::{BoundedExecutor, ExecutorError};
    ///
    /// assert!(BoundedExecutor::try_new(8).is_ok());
    /// assert_eq!(
    ///     BoundedExecutor::try_new(0).unwrap_err(),
    ///     ExecutorError::InvalidCapacity
    /// );
    /// ```
    pub fn try_new(capacity: usize) -> Result<Self, ExecutorError> {
        if capacity == 0 {
            return Err(ExecutorError::InvalidCapacity);
        }
        Ok(Self {
            permits: Arc::new(Permits::new(capacity)),
        })
    }

    /// Creates an executor sized by [`default_capacity`](super::default_capacity).
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self {
            permits: Arc::new(Permits::new(default_capacity())),
        }
    }

    /// Maximum number of concurrently running units.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.permits.capacity
    }

    /// Permits not currently held.
    pub fn available_permits(&self) -> usize {
        self.permits.available()
    }

    /// Units currently holding a permit.
    pub fn running(&self) -> usize {
        self.capacity() - self.available_permits()
    }

    fn is_own_worker(&self) -> bool {
        WORKER_OF.with(Cell::get) == self.permits.id()
    }
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl Executor for BoundedExecutor {
    fn submit(&self, task: Task) {
        let permit = if self.is_own_worker() {
            match self.permits.try_acquire() {
                Some(permit) => permit,
                None => {
                    run_trapped(task);
                    return;
                }
            }
        } else {
            self.permits.acquire()
        };

        let pool = self.permits.id();
        let job = move || {
            let _mark = WorkerMark::enter(pool);
            let _permit = permit;
            run_trapped(task);
        };
        if let Err(job) = spawn_named("settle-worker", job) {
            job();
        }
    }
}

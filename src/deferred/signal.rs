//! One-shot "become ready" signal for threads blocking on a cell.
//!
//! `ready` is idempotent: readying twice is a no-op rather than an error, so
//! there is no double-close hazard to guard against.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub(crate) struct Signal {
    ready: Mutex<bool>,
    condvar: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn ready(&self) {
        let mut ready = self.ready.lock();
        if !*ready {
            *ready = true;
            self.condvar.notify_all();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_ready(&self) -> bool {
        *self.ready.lock()
    }

    /// Blocks until readied.
    pub(crate) fn wait(&self) {
        let mut ready = self.ready.lock();
        while !*ready {
            self.condvar.wait(&mut ready);
        }
    }

    /// Blocks until readied or `deadline` passes; returns whether it was readied.
    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        let mut ready = self.ready.lock();
        while !*ready {
            if self.condvar.wait_until(&mut ready, deadline).timed_out() {
                return *ready;
            }
        }
        true
    }

    /// Blocks until readied or `timeout` elapses; returns whether it was readied.
    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => {
                self.wait();
                true
            }
        }
    }
}

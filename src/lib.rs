//! # settle
//!
//! Deferred results for thread-based Rust: a single-assignment cell that is
//! completed exactly once, composed with operators, and produced on a
//! backpressuring bounded executor.
//!
//! ## Overview
//!
//! - **Result cell**: [`Deferred<T>`] holds a value or a [`Failure`]; completion
//!   is exactly-once and lock-free to claim.
//! - **Operators**: `map`, `flat_map`, `peek`, `recover`, `or_else`, `handle`,
//!   each with a `_with` form taking a [`Dispatch`].
//! - **Combinators**: `join_both`, `race_two`, [`join_all`], [`join_all_values`],
//!   [`race_any`].
//! - **Fault boundary**: every user callback runs behind [`fault::trap`]; a panic
//!   becomes [`Failure::Computation`] instead of unwinding into another thread.
//! - **Executor**: [`BoundedExecutor`] admits at most N units at once and blocks
//!   the submitter when full.
//! - **Deadlines and cancellation**: `or_timeout`, `complete_on_timeout`,
//!   [`CancelToken`] trees polled by cancellable suppliers.
//!
//! ## Feature Flags
//!
//! - `async` (default): `impl IntoFuture for Deferred<T>` so async code can
//!   `.await` a cell.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and never installs a subscriber:
//! `error` for panics trapped in executor tasks, `warn` for swallowed observer
//! panics and thread spawn failures, `info` when the default executor is
//! replaced, `debug` when a deadline fires, `trace` on cancellation.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use settle::prelude::*;
//!
//! let price = Deferred::supply(|| 120_u32);
//! let discount = Deferred::supply(|| 20_u32);
//!
//! let total = price
//!     .join_both(&discount, |price, discount| price - discount)
//!     .or_timeout(Duration::from_secs(5))
//!     .recover(|_| Ok(0));
//!
//! assert_eq!(total.join(), Ok(100));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: Disabling redundant_closure_for_method_calls due to clippy 0.1.92 panic bug
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```rust
/// use settle::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::deferred::{Deferred, IntoDeferred, join_all, join_all_values, race_any};
    pub use crate::error::{Failure, StateError};
    pub use crate::executor::{BoundedExecutor, Dispatch, Executor};

    #[cfg(feature = "async")]
    pub use crate::deferred::DeferredFuture;
}

pub mod cancel;
pub mod deferred;
pub mod error;
pub mod executor;
pub mod fault;

pub use cancel::{CancelToken, HookId};
#[cfg(feature = "async")]
pub use deferred::DeferredFuture;
pub use deferred::{Deferred, IntoDeferred, join_all, join_all_values, race_any};
pub use error::{Cause, ExecutorError, Failure, StateError};
pub use executor::{
    BoundedExecutor, Dispatch, Executor, InlineExecutor, Task, ThreadExecutor, default_capacity,
};

static_assertions::assert_impl_all!(CancelToken: Send, Sync, Clone);
static_assertions::assert_impl_all!(Failure: Send, Sync, Clone);
static_assertions::assert_impl_all!(BoundedExecutor: Executor, Send, Sync, Clone);
static_assertions::assert_obj_safe!(Executor);

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn prelude_covers_a_round_trip() {
        let executor = BoundedExecutor::new(1);
        let cell = Deferred::supply_on(&executor, || 1).map(|value| value + 1);
        assert_eq!(cell.join(), Ok(2));
    }
}

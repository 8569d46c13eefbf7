//! `.await` support for [`Deferred`].
//!
//! The future registers a single inline continuation on its first pending poll.
//! That continuation stores the outcome and wakes the most recent waker; later
//! polls only refresh the waker.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use super::Deferred;
use crate::error::Failure;

struct BridgeState<T> {
    outcome: Option<Result<T, Failure>>,
    waker: Option<Waker>,
}

/// Future returned by `Deferred::into_future`; resolves to the cell's outcome.
///
/// # Examples
///
/// ```rust
/// use settle::Deferred;
///
/// let doubled = futures::executor::block_on(async {
///     let base = Deferred::supply(|| 21).await?;
///     Ok::<_, settle::Failure>(base * 2)
/// });
/// assert_eq!(doubled, Ok(42));
/// ```
#[must_use = "futures do nothing unless polled"]
pub struct DeferredFuture<T> {
    source: Deferred<T>,
    bridge: Option<Arc<Mutex<BridgeState<T>>>>,
}

impl<T: Clone + Send + 'static> DeferredFuture<T> {
    fn poll_bridge(bridge: &Mutex<BridgeState<T>>, waker: &Waker) -> Poll<Result<T, Failure>> {
        let mut state = bridge.lock();
        if let Some(outcome) = state.outcome.take() {
            return Poll::Ready(outcome);
        }
        match &state.waker {
            Some(current) if current.will_wake(waker) => {}
            _ => state.waker = Some(waker.clone()),
        }
        Poll::Pending
    }
}

impl<T: Clone + Send + 'static> Future for DeferredFuture<T> {
    type Output = Result<T, Failure>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(bridge) = &this.bridge {
            return Self::poll_bridge(bridge, context.waker());
        }

        if let Some(outcome) = this.source.snapshot() {
            return Poll::Ready(outcome);
        }

        let bridge = Arc::new(Mutex::new(BridgeState {
            outcome: None,
            waker: Some(context.waker().clone()),
        }));
        let remote = Arc::clone(&bridge);
        this.source.subscribe(move |outcome| {
            let waker = {
                let mut state = remote.lock();
                state.outcome = Some(outcome);
                state.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        });

        let polled = Self::poll_bridge(&bridge, context.waker());
        this.bridge = Some(bridge);
        polled
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Deferred<T> {
    type Output = Result<T, Failure>;
    type IntoFuture = DeferredFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        DeferredFuture {
            source: self,
            bridge: None,
        }
    }
}

impl<T> fmt::Debug for DeferredFuture<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DeferredFuture")
            .field("registered", &self.bridge.is_some())
            .finish_non_exhaustive()
    }
}

//! Cooperative cancellation tokens.
//!
//! A [`CancelToken`] is a flag that running work polls to stop early. Tokens form
//! a tree: canceling a token cancels every descendant, while canceling a child
//! leaves its parent and siblings untouched. Nothing is ever preempted.
//!
//! # Examples
//!
//! ```rust
//! use settle::CancelToken;
//!
//! let parent = CancelToken::new();
//! let child = parent.child();
//! let sibling = parent.child();
//!
//! child.cancel();
//! assert!(!parent.is_canceled());
//! assert!(!sibling.is_canceled());
//!
//! parent.cancel();
//! assert!(sibling.is_canceled());
//! ```

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::fault;

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Links {
    children: Vec<Weak<TokenInner>>,
    hooks: Vec<(u64, Hook)>,
    next_hook: u64,
}

/// Identifies a hook registered with [`CancelToken::on_cancel`], for
/// [`CancelToken::remove_hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

#[derive(Default)]
struct TokenInner {
    canceled: AtomicBool,
    links: Mutex<Links>,
}

/// A cloneable handle to a node of the cancellation tree.
///
/// Clones share the same flag. Children are held weakly, so dropping every
/// handle to a child releases it even while the parent lives on.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Creates a new root token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a child token.
    ///
    /// The child is canceled whenever this token is. A child derived from an
    /// already-canceled token starts out canceled.
    pub fn child(&self) -> Self {
        let child = Self::new();
        let mut links = self.inner.links.lock();
        if self.is_canceled() {
            drop(links);
            child.cancel();
            return child;
        }
        links.children.retain(|weak| weak.strong_count() > 0);
        links.children.push(Arc::downgrade(&child.inner));
        child
    }

    /// Returns `true` once this token or any ancestor has been canceled.
    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    /// Cancels this token and all of its descendants.
    ///
    /// Returns `true` if this call performed the cancellation, `false` if the
    /// token was already canceled. Registered hooks run on the calling thread.
    pub fn cancel(&self) -> bool {
        if self.inner.canceled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let links = mem::take(&mut *self.inner.links.lock());
        for child in links.children {
            if let Some(inner) = child.upgrade() {
                Self { inner }.cancel();
            }
        }
        for (_, hook) in links.hooks {
            if let Err(failure) = fault::trap(hook) {
                tracing::warn!(%failure, "cancellation hook panicked");
            }
        }
        true
    }

    /// Registers a hook that runs once when this token is canceled.
    ///
    /// Runs the hook immediately on the calling thread if the token is already
    /// canceled. Otherwise the hook stays registered until cancellation or
    /// until [`remove_hook`](Self::remove_hook) is called with the returned id.
    pub fn on_cancel<F>(&self, hook: F) -> HookId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut links = self.inner.links.lock();
        let id = links.next_hook;
        links.next_hook += 1;
        if !self.is_canceled() {
            links.hooks.push((id, Box::new(hook)));
            return HookId(id);
        }
        drop(links);
        if let Err(failure) = fault::trap(hook) {
            tracing::warn!(%failure, "cancellation hook panicked");
        }
        HookId(id)
    }

    /// Unregisters a hook that has not run yet.
    ///
    /// Returns `false` if the hook already ran or was removed before.
    pub fn remove_hook(&self, id: HookId) -> bool {
        let mut links = self.inner.links.lock();
        let Some(index) = links.hooks.iter().position(|(key, _)| *key == id.0) else {
            return false;
        };
        let hook = links.hooks.remove(index);
        drop(links);
        drop(hook);
        true
    }

    #[cfg(test)]
    pub(crate) fn hook_count(&self) -> usize {
        self.inner.links.lock().hooks.len()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CancelToken")
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}

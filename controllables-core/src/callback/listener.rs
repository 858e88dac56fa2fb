//! Listener types for callbacks.
//!
//! A listener is anything a callback invokes when it fires: a plain closure,
//! a one-shot handler bridging to a waiting thread or task, or another
//! callback relaying the emission.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

use super::Callback;

/// Unique identifier for a listener.
///
/// Set semantics of a callback's listeners are defined over this id: a
/// listener registered twice under the same id is present once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// What a listener tells the pipeline after running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<R> {
    /// Record the value under the listener's id and move on.
    Value(R),
    /// Skip this listener's result and move on.
    Continue,
    /// Skip this listener's result and every listener after it.
    Stop,
}

impl<R> Flow<R> {
    pub fn into_value(self) -> Option<R> {
        match self {
            Flow::Value(value) => Some(value),
            Flow::Continue | Flow::Stop => None,
        }
    }
}

/// Result of one listener invocation. `Err` aborts the whole dispatch.
pub type ListenerResult<R> = Result<Flow<R>>;

/// Behaviour behind a [`Listener`].
pub trait Invoke<A, R>: Send + Sync {
    fn invoke(&self, args: &A) -> ListenerResult<R>;

    /// Cancel a pending one-shot listener. Plain listeners ignore this.
    fn cancel(&self, _reason: &str) {}

    /// Called when the listener is added to `parent`.
    fn attached(&self, _parent: &Callback<A, R>) -> Result<()> {
        Ok(())
    }

    /// Called when the listener is removed from `parent`.
    fn detached(&self, _parent: &Callback<A, R>) {}
}

struct FnInvoke<F>(F);

impl<A, R, F> Invoke<A, R> for FnInvoke<F>
where
    F: Fn(&A) -> ListenerResult<R> + Send + Sync,
{
    fn invoke(&self, args: &A) -> ListenerResult<R> {
        (self.0)(args)
    }
}

/// An identified, shareable listener.
pub struct Listener<A, R> {
    id: ListenerId,
    inner: Arc<dyn Invoke<A, R>>,
}

impl<A: 'static, R: 'static> Listener<A, R> {
    /// Wrap a closure returning an explicit [`Flow`].
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&A) -> ListenerResult<R> + Send + Sync + 'static,
    {
        Self::from_parts(ListenerId::new(), Arc::new(FnInvoke(f)))
    }

    /// Wrap an infallible closure whose result is always recorded.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        Self::new(move |args| Ok(Flow::Value(f(args))))
    }

    /// Wrap a custom [`Invoke`] implementation under a fresh id.
    pub fn from_invoke<I>(inner: I) -> Self
    where
        I: Invoke<A, R> + 'static,
    {
        Self::from_parts(ListenerId::new(), Arc::new(inner))
    }
}

impl<A, R> Listener<A, R> {
    pub(crate) fn from_parts(id: ListenerId, inner: Arc<dyn Invoke<A, R>>) -> Self {
        Self { id, inner }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn invoke(&self, args: &A) -> ListenerResult<R> {
        self.inner.invoke(args)
    }

    pub fn cancel(&self, reason: &str) {
        self.inner.cancel(reason)
    }

    pub(crate) fn attached(&self, parent: &Callback<A, R>) -> Result<()> {
        self.inner.attached(parent)
    }

    pub(crate) fn detached(&self, parent: &Callback<A, R>) {
        self.inner.detached(parent)
    }
}

impl<A, R> Clone for Listener<A, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R> fmt::Debug for Listener<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

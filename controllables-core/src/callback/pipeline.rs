//! Callable Pipeline
//!
//! An ordered, duplicate-free set of listeners invoked one after another
//! with the same arguments.
//!
//! # Dispatch Rules
//!
//! For each listener, in insertion order:
//!
//! - [`Flow::Value`] records the value under the listener's id.
//! - [`Flow::Continue`] skips the listener; iteration proceeds.
//! - [`Flow::Stop`] ends iteration; only earlier results are returned.
//! - `Err` aborts the dispatch and is returned to the caller.
//!
//! # Thread Safety
//!
//! The listener set is snapshotted under a read lock before iterating, so
//! listeners may add or remove listeners (including themselves) while a
//! dispatch is running on any thread. Changes take effect on the next call.

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::trace;

use super::{Flow, Listener, ListenerId};
use crate::error::Result;

/// Results of one dispatch, keyed by listener id in execution order.
pub type Dispatch<R> = IndexMap<ListenerId, R>;

/// Ordered multiplexing callable.
pub struct CallablePipeline<A, R> {
    listeners: RwLock<IndexMap<ListenerId, Listener<A, R>>>,
}

impl<A, R> CallablePipeline<A, R> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(IndexMap::new()),
        }
    }

    /// Append `listener` unless one with the same id is present.
    ///
    /// Returns whether the listener was inserted.
    pub fn add(&self, listener: Listener<A, R>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.contains_key(&listener.id()) {
            return false;
        }
        listeners.insert(listener.id(), listener);
        true
    }

    /// Remove the listener with `id`, keeping the order of the rest.
    pub fn discard(&self, id: ListenerId) -> Option<Listener<A, R>> {
        self.listeners.write().shift_remove(&id)
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Current listeners in execution order.
    pub fn snapshot(&self) -> Vec<Listener<A, R>> {
        self.listeners.read().values().cloned().collect()
    }

    /// Remove every listener, returning them in execution order.
    pub fn drain(&self) -> Vec<Listener<A, R>> {
        let mut listeners = self.listeners.write();
        listeners.drain(..).map(|(_, listener)| listener).collect()
    }

    /// Execute the pipeline.
    pub fn call(&self, args: &A) -> Result<Dispatch<R>> {
        let snapshot = self.snapshot();
        trace!(listeners = snapshot.len(), "dispatching");

        let mut results = IndexMap::with_capacity(snapshot.len());
        for listener in snapshot {
            match listener.invoke(args)? {
                Flow::Value(value) => {
                    results.insert(listener.id(), value);
                }
                Flow::Continue => continue,
                Flow::Stop => break,
            }
        }
        Ok(results)
    }
}

impl<A, R> Default for CallablePipeline<A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> FromIterator<Listener<A, R>> for CallablePipeline<A, R> {
    fn from_iter<I: IntoIterator<Item = Listener<A, R>>>(iter: I) -> Self {
        let pipeline = Self::new();
        for listener in iter {
            pipeline.add(listener);
        }
        pipeline
    }
}

/// Shortcut for building a [`CallablePipeline`] from listeners.
pub fn piped<A, R, I>(listeners: I) -> CallablePipeline<A, R>
where
    I: IntoIterator<Item = Listener<A, R>>,
{
    listeners.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Arc;

    fn value(v: &'static str) -> Listener<(), &'static str> {
        Listener::from_fn(move |_| v)
    }

    #[test]
    fn results_follow_registration_order() {
        let (a, b, c) = (value("a"), value("b"), value("c"));
        let pipeline = piped([a.clone(), b.clone(), c.clone()]);

        let results = pipeline.call(&()).unwrap();
        let order: Vec<_> = results.keys().copied().collect();
        assert_eq!(order, vec![a.id(), b.id(), c.id()]);
        assert_eq!(results[&b.id()], "b");
    }

    #[test]
    fn stop_discards_the_rest() {
        let a = value("a");
        let b: Listener<(), &'static str> = Listener::new(|_| Ok(Flow::Stop));
        let c = value("c");
        let pipeline = piped([a.clone(), b, c]);

        let results = pipeline.call(&()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[&a.id()], "a");
    }

    #[test]
    fn continue_skips_only_itself() {
        let a = value("a");
        let b: Listener<(), &'static str> = Listener::new(|_| Ok(Flow::Continue));
        let c = value("c");
        let pipeline = piped([a.clone(), b.clone(), c.clone()]);

        let results = pipeline.call(&()).unwrap();
        assert_eq!(results.keys().copied().collect::<Vec<_>>(), vec![a.id(), c.id()]);
        assert!(!results.contains_key(&b.id()));
    }

    #[test]
    fn errors_abort_the_dispatch() {
        let a = value("a");
        let b: Listener<(), &'static str> = Listener::new(|_| Err(Error::listener("boom")));
        let pipeline = piped([a, b]);

        assert!(matches!(pipeline.call(&()), Err(Error::Listener(_))));
    }

    #[test]
    fn duplicates_are_ignored() {
        let a = value("a");
        let pipeline = CallablePipeline::new();

        assert!(pipeline.add(a.clone()));
        assert!(!pipeline.add(a.clone()));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn listeners_may_remove_themselves() {
        let pipeline: Arc<CallablePipeline<(), u32>> = Arc::new(CallablePipeline::new());
        let own_id = Arc::new(parking_lot::Mutex::new(None::<ListenerId>));

        let weak = Arc::downgrade(&pipeline);
        let slot = own_id.clone();
        let once = Listener::from_fn(move |_| {
            if let (Some(p), Some(id)) = (weak.upgrade(), *slot.lock()) {
                p.discard(id);
            }
            7
        });
        *own_id.lock() = Some(once.id());
        pipeline.add(once);

        assert_eq!(pipeline.call(&()).unwrap().len(), 1);
        assert!(pipeline.call(&()).unwrap().is_empty());
    }
}

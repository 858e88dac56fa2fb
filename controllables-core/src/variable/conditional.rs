//! Conditional callbacks over a watched variable.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::{DynVariable, Variable};
use crate::callback::{Callback, Dispatch, Flow, Listener, ListenerId};
use crate::component::{Attachment, Component};
use crate::error::Result;

type Predicate<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// Evaluate `predicate` against the current value of `variable`.
///
/// A temporarily unavailable value counts as "does not hold".
fn holds<V>(variable: &dyn Variable<V>, predicate: &Predicate<V>) -> Result<bool> {
    match variable.value() {
        Ok(value) => Ok(predicate(&value)),
        Err(err) if err.is_temporarily_unavailable() => {
            trace!(%err, "condition skipped");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// A callback that fires while a predicate over a variable holds.
///
/// Once attached to a variable, the predicate is checked on every
/// `"change"` of the variable, and for each newly registered listener at
/// registration time.
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use controllables_core::variable::{DynVariable, MutableVariable, VariableExt};
///
/// let var = Arc::new(MutableVariable::new(true));
/// let shared: DynVariable<bool> = var.clone();
/// let truthy = shared.when(|v| *v).unwrap();
///
/// let fired = Arc::new(AtomicUsize::new(0));
/// let f = fired.clone();
/// truthy.on_fn(move |_| { f.fetch_add(1, Ordering::SeqCst); }).unwrap();
/// assert_eq!(fired.load(Ordering::SeqCst), 1);
/// ```
pub struct Conditional<V> {
    callback: Callback<(), ()>,
    predicate: Predicate<V>,
    attachment: Attachment<DynVariable<V>>,
    subscription: Mutex<Option<(Callback<(), ()>, ListenerId)>>,
}

impl<V: 'static> Conditional<V> {
    pub fn new<P>(predicate: P) -> Self
    where
        P: Fn(&V) -> bool + Send + Sync + 'static,
    {
        Self {
            callback: Callback::new(),
            predicate: Arc::new(predicate),
            attachment: Attachment::new(),
            subscription: Mutex::new(None),
        }
    }

    /// Add a listener, invoking it right away if the predicate already holds.
    pub fn on(&self, listener: Listener<(), ()>) -> Result<ListenerId> {
        let id = self.callback.on(listener.clone())?;
        if let Ok(parent) = self.attachment.parent() {
            if holds(parent.as_ref(), &self.predicate)? {
                listener.invoke(&())?;
            }
        }
        Ok(id)
    }

    pub fn on_fn<F>(&self, f: F) -> Result<ListenerId>
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.on(Listener::from_fn(f))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.callback.off(id)
    }

    /// Fire the listeners if the predicate holds now.
    pub fn check(&self) -> Result<Dispatch<()>> {
        let Ok(parent) = self.attachment.parent() else {
            return Ok(Dispatch::new());
        };
        if holds(parent.as_ref(), &self.predicate)? {
            self.callback.emit(&())
        } else {
            Ok(Dispatch::new())
        }
    }

    /// The underlying callback, e.g. for waiting on the condition.
    pub fn callback(&self) -> &Callback<(), ()> {
        &self.callback
    }
}

impl<V: 'static> Component for Conditional<V> {
    type Parent = DynVariable<V>;

    fn attachment(&self) -> &Attachment<DynVariable<V>> {
        &self.attachment
    }

    fn on_attach(&self, parent: &DynVariable<V>) -> Result<()> {
        let Some(change) = parent.on_change() else {
            return Ok(());
        };
        let watched: Weak<dyn Variable<V>> = Arc::downgrade(parent);
        let predicate = self.predicate.clone();
        let callback = self.callback.clone();
        let listener = Listener::new(move |_: &()| {
            if let Some(watched) = watched.upgrade() {
                if holds(watched.as_ref(), &predicate)? {
                    callback.emit(&())?;
                }
            }
            Ok(Flow::Continue)
        });
        let id = change.on(listener)?;
        *self.subscription.lock() = Some((change, id));
        Ok(())
    }

    fn on_detach(&self, _parent: &DynVariable<V>) -> Result<()> {
        if let Some((change, id)) = self.subscription.lock().take() {
            change.off(id);
        }
        Ok(())
    }
}

impl<V> Drop for Conditional<V> {
    fn drop(&mut self) {
        if let Some((change, id)) = self.subscription.get_mut().take() {
            change.off(id);
        }
    }
}

impl<V> fmt::Debug for Conditional<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conditional")
            .field("callback", &self.callback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AttachError, Error};
    use crate::variable::{MutableVariable, VariableExt, WritableVariable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(conditional: &Conditional<i32>) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        conditional
            .on_fn(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        count
    }

    #[test]
    fn fires_eagerly_when_already_true() {
        let var = Arc::new(MutableVariable::new(5));
        let shared: DynVariable<i32> = var.clone();
        let conditional = shared.when(|v| *v > 0).unwrap();

        let first = counting(&conditional);
        let second = counting(&conditional);
        // Eager evaluation only reaches the newly registered listener.
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fires_on_change_while_predicate_holds() {
        let var = Arc::new(MutableVariable::new(0));
        let shared: DynVariable<i32> = var.clone();
        let conditional = shared.when_eq(3).unwrap();
        let count = counting(&conditional);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        var.set_value(3).unwrap();
        var.set_value(1).unwrap();
        var.set_value(3).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unavailable_values_do_not_fire() {
        let var: Arc<MutableVariable<i32>> = Arc::new(MutableVariable::empty());
        let shared: DynVariable<i32> = var.clone();
        let conditional = shared.when(|_| true).unwrap();
        let count = counting(&conditional);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        var.set_value(1).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_stops_watching() {
        let var = Arc::new(MutableVariable::new(1));
        let shared: DynVariable<i32> = var.clone();
        let conditional = Conditional::new(|v: &i32| *v == 1);
        conditional.attach(shared.clone()).unwrap();
        let count = counting(&conditional);

        conditional.detach(Some(&shared)).unwrap();
        var.set_value(1).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(var.on_change().unwrap().is_empty());
    }

    #[test]
    fn single_parent() {
        let a: DynVariable<i32> = Arc::new(MutableVariable::new(1));
        let b: DynVariable<i32> = Arc::new(MutableVariable::new(1));
        let conditional = Conditional::new(|_: &i32| true);

        conditional.attach(a.clone()).unwrap();
        conditional.attach(a).unwrap();
        let err = conditional.attach(b).err().unwrap();
        assert!(matches!(err, Error::Attach(AttachError::AlreadyAttached)));
    }
}

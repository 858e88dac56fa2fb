//! Core variable traits and the plain stored variables.

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::{ComputedVariable, Conditional};
use crate::callback::{Callback, CallbackManager};
use crate::component::Component;
use crate::error::{Error, Result, VariableError};

/// Name of the event fired when a variable's value may have changed.
pub const CHANGE: &str = "change";

/// Events of a variable, keyed by name. Listeners receive no arguments and
/// are expected to re-read the value.
pub type VariableEvents = CallbackManager<&'static str, (), ()>;

/// A readable value source.
pub trait Variable<V>: Send + Sync {
    /// The current value, or [`VariableError::TemporarilyUnavailable`].
    fn value(&self) -> Result<V>;

    /// Events of this variable, if it has any.
    fn events(&self) -> Option<&VariableEvents> {
        None
    }

    /// This variable as writable, if it is.
    fn as_writable(&self) -> Option<&dyn WritableVariable<V>> {
        None
    }

    /// The `"change"` callback, if this variable has events.
    fn on_change(&self) -> Option<Callback<(), ()>> {
        self.events().map(|events| events.get(&CHANGE))
    }
}

/// A variable that accepts writes.
pub trait WritableVariable<V>: Variable<V> {
    fn set_value(&self, value: V) -> Result<()>;
}

/// Shared, type-erased variable.
pub type DynVariable<V> = Arc<dyn Variable<V>>;

/// Fire `"change"` on `events` if anyone ever subscribed.
pub(crate) fn notify_change(events: &OnceLock<VariableEvents>) -> Result<()> {
    if let Some(change) = events.get().and_then(|events| events.existing(&CHANGE)) {
        change.emit(&())?;
    }
    Ok(())
}

/// Events whose `"change"` relays the `"change"` of upstream variables.
///
/// Dropping the relay unsubscribes from every upstream, so a derived
/// variable does not outlive itself inside its sources' listener lists.
pub(crate) struct ChangeRelay {
    events: VariableEvents,
    upstreams: Vec<Callback<(), ()>>,
}

impl ChangeRelay {
    pub(crate) fn new<I>(upstreams: I) -> Self
    where
        I: IntoIterator<Item = Callback<(), ()>>,
    {
        let events = VariableEvents::with_slots([CHANGE]);
        let change = events.get(&CHANGE);
        let upstreams = upstreams
            .into_iter()
            .filter(|upstream| upstream.insert(change.as_listener()))
            .collect();
        Self { events, upstreams }
    }

    pub(crate) fn events(&self) -> &VariableEvents {
        &self.events
    }
}

impl Drop for ChangeRelay {
    fn drop(&mut self) {
        let id = self.events.get(&CHANGE).id();
        for upstream in &self.upstreams {
            upstream.off(id);
        }
    }
}

/// Read-only variable holding a fixed value.
#[derive(Debug, Clone)]
pub struct ConstVariable<V> {
    value: Option<V>,
}

impl<V> ConstVariable<V> {
    pub fn new(value: V) -> Self {
        Self { value: Some(value) }
    }

    /// A variable that is never available.
    pub fn nil() -> Self {
        Self { value: None }
    }
}

impl<V: Clone + Send + Sync> Variable<V> for ConstVariable<V> {
    fn value(&self) -> Result<V> {
        self.value
            .clone()
            .ok_or_else(|| Error::unavailable("variable has no value"))
    }
}

/// Stored variable that fires `"change"` on every write.
///
/// Writes are not deduplicated: setting the same value twice fires twice.
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use controllables_core::variable::{MutableVariable, Variable, WritableVariable};
///
/// let var = MutableVariable::new("a string");
/// let changes = Arc::new(AtomicUsize::new(0));
/// let seen = changes.clone();
/// var.on_change().unwrap().on_fn(move |_| { seen.fetch_add(1, Ordering::SeqCst); }).unwrap();
///
/// var.set_value("another string").unwrap();
/// var.set_value("another string").unwrap();
/// assert_eq!(var.value().unwrap(), "another string");
/// assert_eq!(changes.load(Ordering::SeqCst), 2);
/// ```
pub struct MutableVariable<V> {
    value: RwLock<Option<V>>,
    events: OnceLock<VariableEvents>,
}

impl<V> MutableVariable<V> {
    pub fn new(value: V) -> Self {
        Self {
            value: RwLock::new(Some(value)),
            events: OnceLock::new(),
        }
    }

    /// A variable with no value yet; reads are temporarily unavailable.
    pub fn empty() -> Self {
        Self {
            value: RwLock::new(None),
            events: OnceLock::new(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.value.read().is_some()
    }

    /// Drop the stored value and fire `"change"`.
    pub fn unset(&self) -> Result<()> {
        *self.value.write() = None;
        notify_change(&self.events)
    }
}

impl<V> Default for MutableVariable<V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V: fmt::Debug> fmt::Debug for MutableVariable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableVariable")
            .field("value", &*self.value.read())
            .finish()
    }
}

impl<V: Clone + Send + Sync> Variable<V> for MutableVariable<V> {
    fn value(&self) -> Result<V> {
        self.value
            .read()
            .clone()
            .ok_or_else(|| Error::unavailable("variable has no value"))
    }

    fn events(&self) -> Option<&VariableEvents> {
        Some(self.events.get_or_init(|| VariableEvents::with_slots([CHANGE])))
    }

    fn as_writable(&self) -> Option<&dyn WritableVariable<V>> {
        Some(self)
    }
}

impl<V: Clone + Send + Sync> WritableVariable<V> for MutableVariable<V> {
    fn set_value(&self, value: V) -> Result<()> {
        *self.value.write() = Some(value);
        notify_change(&self.events)
    }
}

/// Either a variable or a plain value.
pub enum Operand<V> {
    Variable(DynVariable<V>),
    Value(V),
}

impl<V: Clone> Operand<V> {
    /// Read through the variable, or copy the plain value.
    pub fn get(&self) -> Result<V> {
        match self {
            Operand::Variable(var) => var.value(),
            Operand::Value(value) => Ok(value.clone()),
        }
    }
}

impl<V> Operand<V> {
    /// Share `var` as an operand.
    pub fn of<T: Variable<V> + 'static>(var: &Arc<T>) -> Self {
        Operand::Variable(var.clone())
    }

    pub fn as_variable(&self) -> Option<&DynVariable<V>> {
        match self {
            Operand::Variable(var) => Some(var),
            Operand::Value(_) => None,
        }
    }
}

impl<V> Clone for Operand<V>
where
    V: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Operand::Variable(var) => Operand::Variable(Arc::clone(var)),
            Operand::Value(value) => Operand::Value(value.clone()),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Operand<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Variable(_) => f.write_str("Variable(..)"),
            Operand::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl<V> From<DynVariable<V>> for Operand<V> {
    fn from(var: DynVariable<V>) -> Self {
        Operand::Variable(var)
    }
}

/// The value of `operand`, reading through it if it is a variable.
pub fn valueof<V: Clone>(operand: &Operand<V>) -> Result<V> {
    operand.get()
}

/// Read-only view of another variable.
pub struct VariableView<V> {
    target: DynVariable<V>,
}

impl<V> VariableView<V> {
    pub fn new(target: DynVariable<V>) -> Self {
        Self { target }
    }
}

impl<V> Variable<V> for VariableView<V> {
    fn value(&self) -> Result<V> {
        self.target.value()
    }

    fn events(&self) -> Option<&VariableEvents> {
        self.target.events()
    }
}

/// Combinators on shared variables.
pub trait VariableExt<V> {
    /// A callback firing whenever `predicate` holds for the current value,
    /// checked on registration and on every change.
    fn when<P>(&self, predicate: P) -> Result<Conditional<V>>
    where
        P: Fn(&V) -> bool + Send + Sync + 'static;

    /// [`VariableExt::when`] matching a fixed value.
    fn when_eq(&self, expected: V) -> Result<Conditional<V>>
    where
        V: PartialEq + Send + Sync + 'static,
    {
        self.when(move |value| *value == expected)
    }

    /// A read-only transformed copy.
    fn cast<U, F>(&self, f: F) -> ComputedVariable<U>
    where
        F: Fn(V) -> U + Send + Sync + 'static;

    /// A read-only view.
    fn constant(&self) -> VariableView<V>;
}

impl<V: 'static> VariableExt<V> for DynVariable<V> {
    fn when<P>(&self, predicate: P) -> Result<Conditional<V>>
    where
        P: Fn(&V) -> bool + Send + Sync + 'static,
    {
        let conditional = Conditional::new(predicate);
        conditional.attach(Arc::clone(self))?;
        Ok(conditional)
    }

    fn cast<U, F>(&self, f: F) -> ComputedVariable<U>
    where
        F: Fn(V) -> U + Send + Sync + 'static,
    {
        super::computed::cast(Arc::clone(self), f)
    }

    fn constant(&self) -> VariableView<V> {
        VariableView::new(Arc::clone(self))
    }
}

/// Shorthand for writing through a variable that may be read-only.
pub fn set<V>(var: &dyn Variable<V>, value: V) -> Result<()> {
    var.as_writable()
        .ok_or(VariableError::NotWritable)?
        .set_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn count_changes<V>(var: &dyn Variable<V>) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        var.on_change()
            .unwrap()
            .on_fn(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        count
    }

    #[test]
    fn every_write_fires_change() {
        let var = MutableVariable::new(0);
        let count = count_changes(&var);

        for _ in 0..5 {
            var.set_value(1).unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn empty_variables_are_temporarily_unavailable() {
        let var: MutableVariable<i32> = MutableVariable::empty();
        assert!(var.value().unwrap_err().is_temporarily_unavailable());

        var.set_value(3).unwrap();
        assert_eq!(var.value().unwrap(), 3);

        var.unset().unwrap();
        assert!(!var.is_set());
    }

    #[test]
    fn change_slot_exists_before_subscription() {
        let var = MutableVariable::new(1);
        assert!(var.events().unwrap().contains(&CHANGE));
    }

    #[test]
    fn listener_errors_surface_from_writes() {
        let var = MutableVariable::new(1);
        var.on_change()
            .unwrap()
            .on(crate::callback::Listener::new(|_| Err(Error::listener("observer failed"))))
            .unwrap();

        assert!(matches!(var.set_value(2), Err(Error::Listener(_))));
        // The write itself happened.
        assert_eq!(var.value().unwrap(), 2);
    }

    #[test]
    fn operands_read_through() {
        let var: DynVariable<i32> = Arc::new(MutableVariable::new(4));
        assert_eq!(valueof(&Operand::Variable(var)).unwrap(), 4);
        assert_eq!(valueof(&Operand::Value(5)).unwrap(), 5);
    }

    #[test]
    fn views_are_read_only() {
        let var: DynVariable<i32> = Arc::new(MutableVariable::new(1));
        let view = var.constant();

        assert_eq!(view.value().unwrap(), 1);
        assert!(view.as_writable().is_none());
        assert!(matches!(
            set(&view, 2),
            Err(Error::Variable(VariableError::NotWritable))
        ));

        set(var.as_ref(), 7).unwrap();
        assert_eq!(view.value().unwrap(), 7);
    }

    #[test]
    fn constants_never_change() {
        let var = ConstVariable::new("fixed");
        assert_eq!(var.value().unwrap(), "fixed");
        assert!(var.events().is_none());
        assert!(ConstVariable::<i32>::nil().value().is_err());
    }
}

//! Keyed access into container variables.
//!
//! An [`IndexVariable`] reads one element of a container held by another
//! variable, at a key that may itself be a variable. Its `"change"` relays
//! the changes of both the container and the key.
//!
//! ```rust
//! use std::sync::Arc;
//! use controllables_core::variable::{IndexVariable, MutableVariable, Operand, Variable, WritableVariable};
//!
//! let zones = Arc::new(MutableVariable::new(vec![20.0, 21.5, 19.0]));
//! let selected = Arc::new(MutableVariable::new(1_usize));
//! let zone: IndexVariable<Vec<f64>, usize, f64> =
//!     IndexVariable::new(zones.clone(), Operand::of(&selected));
//!
//! assert_eq!(zone.value().unwrap(), 21.5);
//! selected.set_value(2).unwrap();
//! zone.set_value(18.0).unwrap();
//! assert_eq!(zones.value().unwrap(), vec![20.0, 21.5, 18.0]);
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::OnceLock;

use indexmap::IndexMap;

use super::base::ChangeRelay;
use super::{set, DynVariable, Operand, Variable, VariableEvents, WritableVariable};
use crate::error::{Error, Result};

/// Containers whose elements can be addressed by key.
pub trait Indexable<K, V> {
    fn get_item(&self, key: &K) -> Option<V>;

    /// Replace the element at `key`. Returns `false` if the key cannot be
    /// written (an index past the end).
    fn set_item(&mut self, key: K, value: V) -> bool;
}

impl<V: Clone> Indexable<usize, V> for Vec<V> {
    fn get_item(&self, key: &usize) -> Option<V> {
        self.get(*key).cloned()
    }

    fn set_item(&mut self, key: usize, value: V) -> bool {
        match self.get_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl<K: Eq + Hash, V: Clone> Indexable<K, V> for HashMap<K, V> {
    fn get_item(&self, key: &K) -> Option<V> {
        self.get(key).cloned()
    }

    fn set_item(&mut self, key: K, value: V) -> bool {
        self.insert(key, value);
        true
    }
}

impl<K: Eq + Hash, V: Clone> Indexable<K, V> for IndexMap<K, V> {
    fn get_item(&self, key: &K) -> Option<V> {
        self.get(key).cloned()
    }

    fn set_item(&mut self, key: K, value: V) -> bool {
        self.insert(key, value);
        true
    }
}

/// The element of `target` at `key`.
///
/// A key the container does not hold reads as temporarily unavailable,
/// since either side may change later. Writes go through the container:
/// the target is read, updated and written back as a whole.
pub struct IndexVariable<C, K, V> {
    target: DynVariable<C>,
    key: Operand<K>,
    relay: OnceLock<ChangeRelay>,
    _element: PhantomData<fn() -> V>,
}

impl<C, K, V> IndexVariable<C, K, V> {
    pub fn new(target: DynVariable<C>, key: Operand<K>) -> Self {
        Self {
            target,
            key,
            relay: OnceLock::new(),
            _element: PhantomData,
        }
    }

    pub fn target(&self) -> &DynVariable<C> {
        &self.target
    }

    pub fn key(&self) -> &Operand<K> {
        &self.key
    }
}

impl<C, K, V> Variable<V> for IndexVariable<C, K, V>
where
    C: Indexable<K, V> + 'static,
    K: Clone + Send + Sync + 'static,
{
    fn value(&self) -> Result<V> {
        let container = self.target.value()?;
        container
            .get_item(&self.key.get()?)
            .ok_or_else(|| Error::unavailable("no element at index"))
    }

    fn events(&self) -> Option<&VariableEvents> {
        let relay = self.relay.get_or_init(|| {
            let key = self.key.as_variable().and_then(|var| var.on_change());
            ChangeRelay::new(self.target.on_change().into_iter().chain(key))
        });
        Some(relay.events())
    }

    fn as_writable(&self) -> Option<&dyn WritableVariable<V>> {
        self.target.as_writable().map(|_| self as &dyn WritableVariable<V>)
    }
}

impl<C, K, V> WritableVariable<V> for IndexVariable<C, K, V>
where
    C: Indexable<K, V> + 'static,
    K: Clone + Send + Sync + 'static,
{
    fn set_value(&self, value: V) -> Result<()> {
        let mut container = self.target.value()?;
        if !container.set_item(self.key.get()?, value) {
            return Err(Error::unavailable("no element at index"));
        }
        set(&*self.target, container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VariableError;
    use crate::variable::{ConstVariable, MutableVariable};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn reads_follow_the_key() {
        let setpoints = Arc::new(MutableVariable::new(HashMap::from([
            ("heating", 18.0),
            ("cooling", 26.0),
        ])));
        let mode = Arc::new(MutableVariable::new("heating"));
        let active: IndexVariable<HashMap<&str, f64>, &str, f64> =
            IndexVariable::new(setpoints.clone(), Operand::of(&mode));

        assert_eq!(active.value().unwrap(), 18.0);
        mode.set_value("cooling").unwrap();
        assert_eq!(active.value().unwrap(), 26.0);

        mode.set_value("off").unwrap();
        assert!(active.value().unwrap_err().is_temporarily_unavailable());
    }

    #[test]
    fn writes_update_the_container() {
        let levels = Arc::new(MutableVariable::new(vec![1, 2, 3]));
        let second: IndexVariable<Vec<i32>, usize, i32> =
            IndexVariable::new(levels.clone(), Operand::Value(1));

        second.set_value(20).unwrap();
        assert_eq!(levels.value().unwrap(), vec![1, 20, 3]);

        let past_end: IndexVariable<Vec<i32>, usize, i32> =
            IndexVariable::new(levels.clone(), Operand::Value(3));
        assert!(past_end.set_value(4).unwrap_err().is_temporarily_unavailable());
        assert_eq!(levels.value().unwrap(), vec![1, 20, 3]);
    }

    #[test]
    fn read_only_targets_are_not_writable() {
        let fixed: IndexVariable<Vec<i32>, usize, i32> =
            IndexVariable::new(Arc::new(ConstVariable::new(vec![1])), Operand::Value(0));

        assert_eq!(fixed.value().unwrap(), 1);
        assert!(fixed.as_writable().is_none());
        assert!(matches!(
            fixed.set_value(2),
            Err(Error::Variable(VariableError::NotWritable))
        ));
    }

    #[test]
    fn change_relays_target_and_key() {
        let levels = Arc::new(MutableVariable::new(vec![1, 2]));
        let cursor = Arc::new(MutableVariable::new(0_usize));
        let level: IndexVariable<Vec<i32>, usize, i32> =
            IndexVariable::new(levels.clone(), Operand::of(&cursor));

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        level
            .on_change()
            .unwrap()
            .on_fn(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        levels.set_value(vec![3, 4]).unwrap();
        cursor.set_value(1).unwrap();
        level.set_value(5).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);

        drop(level);
        assert!(levels.on_change().unwrap().is_empty());
        assert!(cursor.on_change().unwrap().is_empty());
    }
}

//! Composite variables.
//!
//! A composite wraps a nested [`Structure`] whose leaves are variables or
//! plain values, and reads or writes it as one structured value through the
//! structural mapper.
//!
//! ```rust
//! use std::sync::Arc;
//! use controllables_core::mapper::Structure;
//! use controllables_core::variable::{MutableCompositeVariable, MutableVariable, Operand, Variable, WritableVariable};
//!
//! let a = Arc::new(MutableVariable::new(1));
//! let b = Arc::new(MutableVariable::new(2));
//! let pair = MutableCompositeVariable::new(Structure::map([
//!     ("a", Structure::leaf(Operand::of(&a))),
//!     ("b", Structure::list([Structure::leaf(Operand::of(&b))])),
//! ]))
//! .unwrap();
//!
//! pair.set_value(Structure::map([
//!     ("a", Structure::leaf(10)),
//!     ("b", Structure::list([Structure::leaf(20)])),
//! ]))
//! .unwrap();
//! assert_eq!(a.value().unwrap(), 10);
//! ```

use std::cell::RefCell;
use std::sync::OnceLock;

use super::base::ChangeRelay;
use super::{Operand, Variable, VariableEvents, WritableVariable};
use crate::error::{Result, VariableError};
use crate::mapper::{zip_with, Structure};

fn relay_changes<V>(layout: &Structure<Operand<V>>) -> ChangeRelay {
    ChangeRelay::new(
        layout
            .leaves()
            .into_iter()
            .filter_map(|operand| operand.as_variable().and_then(|var| var.on_change())),
    )
}

fn read<V: Clone>(layout: &Structure<Operand<V>>) -> Result<Structure<V>> {
    zip_with(&[layout], |leaves: &[&Operand<V>]| leaves[0].get())
}

/// Read-only composite of variables and values.
pub struct CompositeVariable<V> {
    layout: Structure<Operand<V>>,
    relay: OnceLock<ChangeRelay>,
}

impl<V> CompositeVariable<V> {
    pub fn new(layout: Structure<Operand<V>>) -> Self {
        Self {
            layout,
            relay: OnceLock::new(),
        }
    }

    pub fn layout(&self) -> &Structure<Operand<V>> {
        &self.layout
    }
}

impl<V: Clone + Send + Sync> Variable<Structure<V>> for CompositeVariable<V> {
    fn value(&self) -> Result<Structure<V>> {
        read(&self.layout)
    }

    fn events(&self) -> Option<&VariableEvents> {
        Some(self.relay.get_or_init(|| relay_changes(&self.layout)).events())
    }
}

/// Writable composite whose leaves are all writable variables.
///
/// Writing pushes each leaf of the new value into the matching variable.
/// Map keys absent from either side are skipped; sequences are written up
/// to the shorter length. A failing leaf does not stop the others from
/// being written; the first failure is returned afterwards.
pub struct MutableCompositeVariable<V> {
    layout: Structure<Operand<V>>,
    relay: OnceLock<ChangeRelay>,
}

impl<V> MutableCompositeVariable<V> {
    /// Fails with [`VariableError::NotWritable`] if any leaf is a plain
    /// value or a read-only variable.
    pub fn new(layout: Structure<Operand<V>>) -> Result<Self> {
        let writable = layout.leaves().into_iter().all(|operand| {
            operand
                .as_variable()
                .is_some_and(|var| var.as_writable().is_some())
        });
        if !writable {
            return Err(VariableError::NotWritable.into());
        }
        Ok(Self {
            layout,
            relay: OnceLock::new(),
        })
    }

    pub fn layout(&self) -> &Structure<Operand<V>> {
        &self.layout
    }
}

impl<V: Clone + Send + Sync> Variable<Structure<V>> for MutableCompositeVariable<V> {
    fn value(&self) -> Result<Structure<V>> {
        read(&self.layout)
    }

    fn events(&self) -> Option<&VariableEvents> {
        Some(self.relay.get_or_init(|| relay_changes(&self.layout)).events())
    }

    fn as_writable(&self) -> Option<&dyn WritableVariable<Structure<V>>> {
        Some(self)
    }
}

impl<V: Clone + Send + Sync> WritableVariable<Structure<V>> for MutableCompositeVariable<V> {
    fn set_value(&self, value: Structure<V>) -> Result<()> {
        let incoming = value.map_leaves(Operand::Value);
        let first_error = RefCell::new(None);
        zip_with(&[&self.layout, &incoming], |pair: &[&Operand<V>]| {
            let written = match pair[0].as_variable().and_then(|var| var.as_writable()) {
                Some(target) => pair[1].get().and_then(|value| target.set_value(value)),
                None => Err(VariableError::NotWritable.into()),
            };
            if let Err(err) = written {
                first_error.borrow_mut().get_or_insert(err);
            }
            Ok(())
        })?;
        match first_error.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Listener;
    use crate::error::{Error, MapError};
    use crate::variable::{ConstVariable, MutableVariable};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type S<T> = Structure<T>;

    struct Fixture {
        a: Arc<MutableVariable<i32>>,
        b0: Arc<MutableVariable<i32>>,
        b1: Arc<MutableVariable<i32>>,
        composite: MutableCompositeVariable<i32>,
    }

    fn fixture() -> Fixture {
        let a = Arc::new(MutableVariable::new(1));
        let b0 = Arc::new(MutableVariable::new(2));
        let b1 = Arc::new(MutableVariable::new(3));
        let composite = MutableCompositeVariable::new(S::map([
            ("a", S::leaf(Operand::of(&a))),
            ("b", S::list([S::leaf(Operand::of(&b0)), S::leaf(Operand::of(&b1))])),
        ]))
        .unwrap();
        Fixture { a, b0, b1, composite }
    }

    fn value(a: i32, b: [i32; 2]) -> S<i32> {
        S::map([("a", S::leaf(a)), ("b", S::list(b.map(S::leaf)))])
    }

    #[test]
    fn reads_unwrap_every_leaf() {
        let f = fixture();
        assert_eq!(f.composite.value().unwrap(), value(1, [2, 3]));
    }

    #[test]
    fn round_trip_writes_each_variable() {
        let f = fixture();
        f.composite.set_value(value(10, [20, 30])).unwrap();

        assert_eq!(f.composite.value().unwrap(), value(10, [20, 30]));
        assert_eq!(f.a.value().unwrap(), 10);
        assert_eq!(f.b0.value().unwrap(), 20);
        assert_eq!(f.b1.value().unwrap(), 30);
    }

    #[test]
    fn plain_values_are_read_but_not_writable() {
        let layout = S::tuple([S::leaf(Operand::Value(1)), S::leaf(Operand::Value(2))]);
        let err = MutableCompositeVariable::new(layout.clone()).err().unwrap();
        assert!(matches!(err, Error::Variable(VariableError::NotWritable)));

        let constant = Arc::new(ConstVariable::new(1));
        let err = MutableCompositeVariable::new(S::leaf(Operand::of(&constant))).err().unwrap();
        assert!(matches!(err, Error::Variable(VariableError::NotWritable)));

        let read_only = CompositeVariable::new(layout);
        assert_eq!(read_only.value().unwrap(), S::tuple([S::leaf(1), S::leaf(2)]));
        assert!(read_only.as_writable().is_none());
    }

    #[test]
    fn mismatched_shape_is_rejected() {
        let f = fixture();
        let err = f.composite.set_value(S::map([("a", S::list([S::leaf(1)]))])).unwrap_err();
        assert!(matches!(err, Error::Map(MapError::ShapeMismatch(_))));
    }

    #[test]
    fn change_fires_per_leaf_write() {
        let f = fixture();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        f.composite
            .on_change()
            .unwrap()
            .on_fn(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        f.composite.set_value(value(0, [0, 0])).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);

        f.b1.set_value(7).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn failing_leaf_does_not_stop_the_rest() {
        let f = fixture();
        f.b0.on_change()
            .unwrap()
            .on(Listener::new(|_| Err(Error::listener("rejected"))))
            .unwrap();

        let err = f.composite.set_value(value(10, [20, 30])).unwrap_err();
        assert!(matches!(err, Error::Listener(_)));
        assert_eq!(f.a.value().unwrap(), 10);
        assert_eq!(f.b0.value().unwrap(), 20);
        assert_eq!(f.b1.value().unwrap(), 30);
    }

    #[test]
    fn dropping_unsubscribes_from_leaves() {
        let f = fixture();
        f.composite.on_change().unwrap();
        assert_eq!(f.a.on_change().unwrap().len(), 1);

        let Fixture { a, b1, composite, .. } = f;
        drop(composite);
        assert!(a.on_change().unwrap().is_empty());
        assert!(b1.on_change().unwrap().is_empty());
    }
}

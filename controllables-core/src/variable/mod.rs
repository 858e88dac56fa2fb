//! Variables
//!
//! Observable values built on top of [`crate::callback`].
//!
//! Every variable exposes its current value through [`Variable::value`],
//! which may fail with a temporarily-unavailable error while the backing
//! source has nothing to offer yet. Variables with events fire a
//! `"change"` callback whenever their value may have changed; derived
//! variables relay the changes of their inputs.
//!
//! - [`MutableVariable`]: stored, writable, fires on every write
//! - [`ComputedVariable`]: function of other variables and plain values
//! - [`CompositeVariable`] / [`MutableCompositeVariable`]: nested
//!   structures of variables read and written as a whole
//! - [`IndexVariable`]: one element of a container variable
//! - [`Conditional`]: callback firing while a predicate holds
//! - [`VariableRecord`]: bounded history of a variable

mod base;
mod composite;
mod computed;
mod conditional;
mod index;
mod manager;
mod record;

pub use base::{
    set, valueof, ConstVariable, DynVariable, MutableVariable, Operand, Variable, VariableEvents,
    VariableExt, VariableView, WritableVariable, CHANGE,
};
pub use composite::{CompositeVariable, MutableCompositeVariable};
pub use computed::{cast, compute, compute2, ComputedVariable};
pub use conditional::Conditional;
pub use index::{IndexVariable, Indexable};
pub use manager::VariableManager;
pub use record::{VariableRecord, VariableRecords};

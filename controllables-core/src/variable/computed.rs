//! Computed variables.
//!
//! A [`ComputedVariable`] evaluates a function over its operands on every
//! read; nothing is cached. Its `"change"` event relays the `"change"`
//! events of every operand that is a variable, subscribed on first access.
//!
//! ```rust
//! use std::sync::Arc;
//! use controllables_core::variable::{compute2, DynVariable, MutableVariable, Operand, Variable};
//!
//! let a: DynVariable<String> = Arc::new(MutableVariable::new("i am".to_string()));
//! let phrase = compute2(
//!     |a: String, b: &'static str| format!("{a} {b}"),
//!     Operand::Variable(a),
//!     Operand::Value("a string"),
//! );
//! assert_eq!(phrase.value().unwrap(), "i am a string");
//! ```

use std::sync::{Arc, OnceLock};

use super::base::ChangeRelay;
use super::{DynVariable, Operand, Variable, VariableEvents};
use crate::callback::Callback;
use crate::error::Result;

type Eval<V> = Box<dyn Fn() -> Result<V> + Send + Sync>;
type ChangeSource = Box<dyn Fn() -> Option<Callback<(), ()>> + Send + Sync>;

fn source_of<V: 'static>(var: &DynVariable<V>) -> ChangeSource {
    let var = Arc::clone(var);
    Box::new(move || var.on_change())
}

fn sources_of<V: 'static>(operands: &[Operand<V>]) -> Vec<ChangeSource> {
    operands
        .iter()
        .filter_map(Operand::as_variable)
        .map(source_of)
        .collect()
}

/// Read-only variable derived from other values.
pub struct ComputedVariable<V> {
    eval: Eval<V>,
    sources: Vec<ChangeSource>,
    relay: OnceLock<ChangeRelay>,
}

impl<V> ComputedVariable<V> {
    fn from_parts(eval: Eval<V>, sources: Vec<ChangeSource>) -> Self {
        Self {
            eval,
            sources,
            relay: OnceLock::new(),
        }
    }
}

impl<V> Variable<V> for ComputedVariable<V> {
    fn value(&self) -> Result<V> {
        (self.eval)()
    }

    fn events(&self) -> Option<&VariableEvents> {
        let relay = self
            .relay
            .get_or_init(|| ChangeRelay::new(self.sources.iter().filter_map(|source| source())));
        Some(relay.events())
    }
}

/// Apply `f` to the values of `operands`.
pub fn compute<I, V, F>(f: F, operands: Vec<Operand<I>>) -> ComputedVariable<V>
where
    I: Clone + Send + Sync + 'static,
    F: Fn(&[I]) -> V + Send + Sync + 'static,
{
    let sources = sources_of(&operands);
    let eval = move || {
        let values = operands.iter().map(Operand::get).collect::<Result<Vec<_>>>()?;
        Ok(f(&values))
    };
    ComputedVariable::from_parts(Box::new(eval), sources)
}

/// Apply a binary `f` to two operands of possibly different types.
pub fn compute2<X, Y, V, F>(f: F, a: Operand<X>, b: Operand<Y>) -> ComputedVariable<V>
where
    X: Clone + Send + Sync + 'static,
    Y: Clone + Send + Sync + 'static,
    F: Fn(X, Y) -> V + Send + Sync + 'static,
{
    let mut sources = sources_of(std::slice::from_ref(&a));
    sources.extend(sources_of(std::slice::from_ref(&b)));
    let eval = move || Ok(f(a.get()?, b.get()?));
    ComputedVariable::from_parts(Box::new(eval), sources)
}

/// Apply `f` to the value of `var`.
pub fn cast<I, V, F>(var: DynVariable<I>, f: F) -> ComputedVariable<V>
where
    I: 'static,
    F: Fn(I) -> V + Send + Sync + 'static,
{
    let sources = vec![source_of(&var)];
    let eval = move || Ok(f(var.value()?));
    ComputedVariable::from_parts(Box::new(eval), sources)
}

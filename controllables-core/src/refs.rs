//! Reference Resolution
//!
//! A [`Reference`] lets a consumer name a value three ways: by the value
//! itself, by a symbol looked up in a [`RefManager`], or by a resolver
//! function computing the value from the manager. [`deref`] turns any of
//! them into the concrete value.
//!
//! ```rust
//! use controllables_core::callback::CallbackManager;
//! use controllables_core::refs::{deref, Reference};
//!
//! let events: CallbackManager<&str, (), ()> = CallbackManager::with_slots(["begin"]);
//!
//! let begin = deref(&events, &Reference::Symbol("begin")).unwrap();
//! assert!(begin.ptr_eq(&events.get(&"begin")));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::{RefError, Result};

/// A keyed container references can be resolved against.
pub trait RefManager {
    type Key;
    type Value;

    /// Whether `key` names a member.
    fn contains(&self, key: &Self::Key) -> bool;

    /// Fetch the member named by `key`.
    fn lookup(&self, key: &Self::Key) -> Result<Self::Value>;
}

/// Resolver function evaluated against the manager.
pub type Resolver<M> =
    Arc<dyn Fn(&M) -> Result<<M as RefManager>::Value> + Send + Sync>;

/// Something that can be dereferenced against a manager of type `M`.
pub enum Reference<M: RefManager> {
    /// Already the value.
    Literal(M::Value),
    /// A member of the manager.
    Symbol(M::Key),
    /// Computed from the manager.
    Resolver(Resolver<M>),
}

impl<M: RefManager> Reference<M> {
    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&M) -> Result<M::Value> + Send + Sync + 'static,
    {
        Reference::Resolver(Arc::new(f))
    }
}

impl<M> Clone for Reference<M>
where
    M: RefManager,
    M::Key: Clone,
    M::Value: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Reference::Literal(value) => Reference::Literal(value.clone()),
            Reference::Symbol(key) => Reference::Symbol(key.clone()),
            Reference::Resolver(f) => Reference::Resolver(Arc::clone(f)),
        }
    }
}

impl<M> fmt::Debug for Reference<M>
where
    M: RefManager,
    M::Key: fmt::Debug,
    M::Value: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Reference::Symbol(key) => f.debug_tuple("Symbol").field(key).finish(),
            Reference::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Resolve `reference` against `manager`.
///
/// Symbols that are not members fail with [`RefError::Unresolved`] rather
/// than being created.
pub fn deref<M>(manager: &M, reference: &Reference<M>) -> Result<M::Value>
where
    M: RefManager,
    M::Key: fmt::Debug,
    M::Value: Clone,
{
    match reference {
        Reference::Literal(value) => Ok(value.clone()),
        Reference::Symbol(key) if manager.contains(key) => manager.lookup(key),
        Reference::Symbol(key) => Err(RefError::Unresolved(format!("{key:?}")).into()),
        Reference::Resolver(resolve) => resolve(manager),
    }
}

/// Resolve `reference` and convert the value to `T`.
///
/// A value that does not convert fails with [`RefError::TypeMismatch`].
pub fn bounded_deref<M, T>(manager: &M, reference: &Reference<M>) -> Result<T>
where
    M: RefManager,
    M::Key: fmt::Debug,
    M::Value: Clone,
    T: TryFrom<M::Value>,
{
    let value = deref(manager, reference)?;
    T::try_from(value).map_err(|_| {
        RefError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        }
        .into()
    })
}

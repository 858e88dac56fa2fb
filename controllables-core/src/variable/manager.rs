//! Keyed collections of variables.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use super::MutableVariable;
use crate::error::Result;
use crate::refs::RefManager;

/// Auto-vivifying map from references to mutable variables.
///
/// A variable created by access starts empty, so reads are temporarily
/// unavailable until someone writes it.
pub struct VariableManager<K, V>
where
    K: Eq + Hash,
{
    slots: DashSet<K>,
    variables: DashMap<K, Arc<MutableVariable<V>>>,
}

impl<K, V> VariableManager<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: DashSet::new(),
            variables: DashMap::new(),
        }
    }

    pub fn with_slots<I: IntoIterator<Item = K>>(slots: I) -> Self {
        let manager = Self::new();
        for slot in slots {
            manager.slots.insert(slot);
        }
        manager
    }

    /// The variable for `key`, created empty if absent.
    pub fn get(&self, key: &K) -> Arc<MutableVariable<V>> {
        if let Some(existing) = self.variables.get(key) {
            return existing.value().clone();
        }
        self.variables
            .entry(key.clone())
            .or_insert_with(|| Arc::new(MutableVariable::empty()))
            .value()
            .clone()
    }

    /// Bind `key` to an existing variable, returning the one it replaces.
    pub fn insert(&self, key: K, variable: Arc<MutableVariable<V>>) -> Option<Arc<MutableVariable<V>>> {
        self.variables.insert(key, variable)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains(key) || self.variables.contains_key(key)
    }

    /// Stop managing `key`. Holders of the variable keep their handle.
    pub fn remove(&self, key: &K) -> Option<Arc<MutableVariable<V>>> {
        self.variables.remove(key).map(|(_, variable)| variable)
    }

    pub fn keys(&self) -> Vec<K> {
        self.variables.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl<K, V> Default for VariableManager<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for VariableManager<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableManager")
            .field("slots", &self.slots.len())
            .field("variables", &self.variables.len())
            .finish()
    }
}

impl<K, V> RefManager for VariableManager<K, V>
where
    K: Eq + Hash + Clone,
{
    type Key = K;
    type Value = Arc<MutableVariable<V>>;

    fn contains(&self, key: &K) -> bool {
        VariableManager::contains(self, key)
    }

    fn lookup(&self, key: &K) -> Result<Arc<MutableVariable<V>>> {
        Ok(self.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, RefError};
    use crate::refs::{deref, Reference};
    use crate::variable::{Variable, WritableVariable};

    #[test]
    fn access_creates_empty_variables() {
        let variables: VariableManager<&str, f64> = VariableManager::new();
        let temperature = variables.get(&"temperature");

        assert!(temperature.value().unwrap_err().is_temporarily_unavailable());
        temperature.set_value(20.5).unwrap();
        assert_eq!(variables.get(&"temperature").value().unwrap(), 20.5);
    }

    #[test]
    fn removal_forgets_the_key() {
        let variables: VariableManager<&str, i32> = VariableManager::with_slots(["fixed"]);
        variables.get(&"temporary");

        assert!(variables.remove(&"temporary").is_some());
        assert!(!variables.contains(&"temporary"));
        assert!(variables.contains(&"fixed"));
    }

    #[test]
    fn symbols_resolve_only_for_members() {
        let variables: VariableManager<&str, i32> = VariableManager::new();
        variables.insert("setpoint", Arc::new(MutableVariable::new(21)));

        let setpoint = deref(&variables, &Reference::Symbol("setpoint")).unwrap();
        assert_eq!(setpoint.value().unwrap(), 21);

        let err = deref(&variables, &Reference::Symbol("unknown")).unwrap_err();
        assert!(matches!(err, Error::Ref(RefError::Unresolved(_))));
        // Failed lookups do not create variables.
        assert_eq!(variables.keys(), vec!["setpoint"]);
    }
}

//! Keyed collections of callbacks.

use std::fmt;
use std::hash::Hash;

use dashmap::{DashMap, DashSet};

use super::{Callback, Dispatch, Listener, ListenerId};
use crate::error::Result;
use crate::refs::RefManager;

/// Auto-vivifying map from references to callbacks.
///
/// Any key can be addressed; the callback is created on first access.
/// Membership ([`CallbackManager::contains`]) is narrower: a key is a member
/// once it has a callback or has been declared as a slot.
///
/// ```rust
/// use controllables_core::callback::CallbackManager;
///
/// let events: CallbackManager<&str, String, String> = CallbackManager::with_slots(["holler"]);
/// assert!(events.contains(&"holler"));
///
/// events.get(&"holler").on_fn(|x: &String| x.clone()).unwrap();
/// events.get(&"holler").on_fn(|x: &String| format!("{x}!")).unwrap();
///
/// let results = events.emit(&"holler", &"just do it".to_string()).unwrap();
/// assert_eq!(results.values().collect::<Vec<_>>(), vec!["just do it", "just do it!"]);
/// ```
pub struct CallbackManager<K, A, R>
where
    K: Eq + Hash,
{
    slots: DashSet<K>,
    callbacks: DashMap<K, Callback<A, R>>,
}

impl<K, A, R> CallbackManager<K, A, R>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: DashSet::new(),
            callbacks: DashMap::new(),
        }
    }

    /// A manager whose `slots` count as members before first access.
    pub fn with_slots<I: IntoIterator<Item = K>>(slots: I) -> Self {
        let manager = Self::new();
        for slot in slots {
            manager.slots.insert(slot);
        }
        manager
    }

    /// The callback for `key`, created if absent.
    pub fn get(&self, key: &K) -> Callback<A, R> {
        if let Some(existing) = self.callbacks.get(key) {
            return existing.value().clone();
        }
        self.callbacks
            .entry(key.clone())
            .or_insert_with(Callback::new)
            .value()
            .clone()
    }

    /// The callback for `key` if it already exists.
    pub fn existing(&self, key: &K) -> Option<Callback<A, R>> {
        self.callbacks.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains(key) || self.callbacks.contains_key(key)
    }

    /// Make `key` a member and return its callback.
    pub fn declare(&self, key: K) -> Callback<A, R> {
        let callback = self.get(&key);
        self.slots.insert(key);
        callback
    }

    /// Drop the callback for `key`, detaching all of its listeners.
    pub fn remove(&self, key: &K) -> Option<Callback<A, R>> {
        let (_, callback) = self.callbacks.remove(key)?;
        callback.clear();
        Some(callback)
    }

    pub fn keys(&self) -> Vec<K> {
        self.callbacks.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn on(&self, key: &K, listener: Listener<A, R>) -> Result<ListenerId> {
        self.get(key).on(listener)
    }

    pub fn off(&self, key: &K, id: ListenerId) -> bool {
        self.existing(key).map_or(false, |callback| callback.off(id))
    }

    /// Emit the callback for `key`.
    pub fn emit(&self, key: &K, args: &A) -> Result<Dispatch<R>> {
        // The map guard is released before any listener runs.
        let callback = self.get(key);
        callback.emit(args)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl<K, A, R> Default for CallbackManager<K, A, R>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A, R> fmt::Debug for CallbackManager<K, A, R>
where
    K: Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackManager")
            .field("slots", &self.slots.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl<K, A, R> RefManager for CallbackManager<K, A, R>
where
    K: Eq + Hash + Clone,
{
    type Key = K;
    type Value = Callback<A, R>;

    fn contains(&self, key: &K) -> bool {
        CallbackManager::contains(self, key)
    }

    fn lookup(&self, key: &K) -> Result<Callback<A, R>> {
        Ok(self.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn access_creates_callbacks() {
        let events: CallbackManager<String, (), u8> = CallbackManager::new();
        assert!(!events.contains(&"begin".to_string()));

        let begin = events.get(&"begin".to_string());
        assert!(events.contains(&"begin".to_string()));
        assert!(begin.ptr_eq(&events.get(&"begin".to_string())));
    }

    #[test]
    fn slots_are_members_before_access() {
        let events: CallbackManager<&str, (), ()> = CallbackManager::with_slots(["step"]);
        assert!(events.contains(&"step"));
        assert!(events.is_empty());

        events.declare("reset");
        assert!(events.contains(&"reset"));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn shortcuts_address_the_keyed_callback() {
        let events: CallbackManager<&str, i32, i32> = CallbackManager::new();
        let id = events.on(&"double", Listener::from_fn(|x: &i32| x * 2)).unwrap();

        assert_eq!(events.emit(&"double", &4).unwrap()[&id], 8);
        assert!(events.emit(&"other", &4).unwrap().is_empty());

        assert!(events.off(&"double", id));
        assert!(!events.off(&"missing", id));
    }

    #[test]
    fn listeners_may_touch_the_manager_while_emitting() {
        let events: Arc<CallbackManager<&'static str, (), ()>> = Arc::new(CallbackManager::new());
        let inner = Arc::downgrade(&events);
        events
            .get(&"outer")
            .on_fn(move |_| {
                if let Some(events) = inner.upgrade() {
                    events.get(&"spawned");
                }
            })
            .unwrap();

        events.emit(&"outer", &()).unwrap();
        assert!(events.contains(&"spawned"));
    }

    #[test]
    fn concurrent_access_yields_one_callback() {
        let events: Arc<CallbackManager<u32, (), ()>> = Arc::new(CallbackManager::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let events = events.clone();
                thread::spawn(move || events.get(&7).id())
            })
            .collect();

        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(events.len(), 1);
    }
}

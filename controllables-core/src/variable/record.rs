//! Bounded value histories.
//!
//! A [`VariableRecord`] samples a variable into a ring buffer each time it
//! is polled, typically on every emission of some driving callback (a
//! simulation timestep). A value that is temporarily unavailable is
//! recorded as `None` so the history stays aligned with the ticks.

use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::base::notify_change;
use super::{DynVariable, Variable, VariableEvents, CHANGE};
use crate::callback::{Callback, Flow, Listener, ListenerId};
use crate::config::RuntimeConfig;
use crate::error::Result;

struct RecordInner<V> {
    source: DynVariable<V>,
    maxlen: usize,
    history: Mutex<VecDeque<Option<V>>>,
    events: OnceLock<VariableEvents>,
}

/// History of a single variable, keeping at most `maxlen` samples.
///
/// Cloning yields another handle to the same history.
pub struct VariableRecord<V> {
    inner: Arc<RecordInner<V>>,
}

impl<V> VariableRecord<V> {
    pub fn new(source: DynVariable<V>, maxlen: usize) -> Self {
        Self {
            inner: Arc::new(RecordInner {
                source,
                maxlen,
                history: Mutex::new(VecDeque::with_capacity(maxlen.min(64))),
                events: OnceLock::new(),
            }),
        }
    }

    pub fn maxlen(&self) -> usize {
        self.inner.maxlen
    }

    pub fn len(&self) -> usize {
        self.inner.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.history.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.history.lock().clear();
    }
}

impl<V: Clone> VariableRecord<V> {
    /// Sample the source once, then fire this record's `"change"`.
    pub fn poll(&self) -> Result<()> {
        let sample = match self.inner.source.value() {
            Ok(value) => Some(value),
            Err(err) if err.is_temporarily_unavailable() => None,
            Err(err) => return Err(err),
        };
        {
            let mut history = self.inner.history.lock();
            if self.inner.maxlen == 0 {
                history.clear();
            } else {
                while history.len() >= self.inner.maxlen {
                    history.pop_front();
                }
                history.push_back(sample);
            }
        }
        notify_change(&self.inner.events)
    }

    /// Samples, oldest first.
    pub fn samples(&self) -> Vec<Option<V>> {
        self.inner.history.lock().iter().cloned().collect()
    }

    /// The most recent sample, if any was taken.
    pub fn latest(&self) -> Option<Option<V>> {
        self.inner.history.lock().back().cloned()
    }
}

impl<V: Clone + Send + Sync + 'static> VariableRecord<V> {
    /// Poll on every emission of `driver`.
    pub fn watch<A: 'static, R: 'static>(&self, driver: &Callback<A, R>) -> Result<ListenerId> {
        let record: Weak<RecordInner<V>> = Arc::downgrade(&self.inner);
        driver.on(Listener::new(move |_: &A| {
            if let Some(inner) = record.upgrade() {
                VariableRecord { inner }.poll()?;
            }
            Ok(Flow::Continue)
        }))
    }
}

impl<V> Clone for VariableRecord<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for VariableRecord<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableRecord")
            .field("maxlen", &self.inner.maxlen)
            .field("len", &self.len())
            .finish()
    }
}

/// The history itself is a variable.
impl<V: Clone + Send + Sync> Variable<Vec<Option<V>>> for VariableRecord<V> {
    fn value(&self) -> Result<Vec<Option<V>>> {
        Ok(self.samples())
    }

    fn events(&self) -> Option<&VariableEvents> {
        Some(self.inner.events.get_or_init(|| VariableEvents::with_slots([CHANGE])))
    }
}

/// Keyed set of records polled together.
pub struct VariableRecords<K, V>
where
    K: Eq + Hash,
{
    maxlen: usize,
    records: DashMap<K, VariableRecord<V>>,
}

impl<K, V> VariableRecords<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(maxlen: usize) -> Self {
        Self {
            maxlen,
            records: DashMap::new(),
        }
    }

    /// Records sized by [`RuntimeConfig::record_maxlen`].
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.record_maxlen)
    }

    /// Start recording `source` under `key`, replacing any earlier record.
    pub fn track(&self, key: K, source: DynVariable<V>) -> VariableRecord<V> {
        let record = VariableRecord::new(source, self.maxlen);
        self.records.insert(key, record.clone());
        record
    }

    pub fn untrack(&self, key: &K) -> Option<VariableRecord<V>> {
        self.records.remove(key).map(|(_, record)| record)
    }

    pub fn get(&self, key: &K) -> Option<VariableRecord<V>> {
        self.records.get(key).map(|entry| entry.value().clone())
    }

    /// Poll every record once.
    pub fn poll(&self) -> Result<()> {
        let records: Vec<VariableRecord<V>> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        for record in records {
            record.poll()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<K, V> VariableRecords<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Poll every record on each emission of `driver`.
    pub fn watch<A: 'static, R: 'static>(self: &Arc<Self>, driver: &Callback<A, R>) -> Result<ListenerId> {
        let records = Arc::downgrade(self);
        driver.on(Listener::new(move |_: &A| {
            if let Some(records) = records.upgrade() {
                records.poll()?;
            }
            Ok(Flow::Continue)
        }))
    }
}

impl<K, V> fmt::Debug for VariableRecords<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableRecords")
            .field("maxlen", &self.maxlen)
            .field("records", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{MutableVariable, WritableVariable};

    #[test]
    fn history_is_bounded() {
        let var = Arc::new(MutableVariable::new(0));
        let record: VariableRecord<i32> = VariableRecord::new(var.clone(), 3);

        for x in 1..=5 {
            var.set_value(x).unwrap();
            record.poll().unwrap();
        }
        assert_eq!(record.samples(), vec![Some(3), Some(4), Some(5)]);
        assert_eq!(record.latest(), Some(Some(5)));
    }

    #[test]
    fn unavailable_samples_keep_alignment() {
        let var: Arc<MutableVariable<i32>> = Arc::new(MutableVariable::empty());
        let record: VariableRecord<i32> = VariableRecord::new(var.clone(), 8);

        record.poll().unwrap();
        var.set_value(1).unwrap();
        record.poll().unwrap();
        assert_eq!(record.value().unwrap(), vec![None, Some(1)]);
    }

    #[test]
    fn watch_polls_on_each_emission() {
        let timestep: Callback<u64, ()> = Callback::new();
        let var = Arc::new(MutableVariable::new(1.5_f64));
        let records: Arc<VariableRecords<&str, f64>> = Arc::new(VariableRecords::new(16));
        let record = records.track("zone temperature", var.clone());

        records.watch(&timestep).unwrap();
        timestep.emit(&0).unwrap();
        var.set_value(2.5).unwrap();
        timestep.emit(&1).unwrap();

        assert_eq!(record.samples(), vec![Some(1.5), Some(2.5)]);
    }

    #[test]
    fn polling_fires_change() {
        let var = Arc::new(MutableVariable::new(1));
        let record: VariableRecord<i32> = VariableRecord::new(var, 2);
        let changed = record.on_change().unwrap().future(false);

        record.poll().unwrap();
        assert!(changed.result(Some(std::time::Duration::from_millis(10))).is_ok());
    }
}

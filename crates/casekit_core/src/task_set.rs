//! Keyed task storage with ascending-key iteration.
//!
//! The set is a vector kept sorted by key. Inserts binary-search for their slot, iteration is a plain slice walk, and
//! cloning the set yields an independent vector (tasks themselves are expected to be cheap handles such as `Arc`s).

use crate::errors::TaskSetError;
use crate::keys::TaskKey;

/// Map from task key to unit of work, iterated in ascending key order.
///
/// The work-unit type `T` is the set's shape: every task in one set has the same type, fixed for the set's lifetime.
#[derive(Debug, Clone)]
pub struct OrderedTaskSet<K, T> {
    entries: Vec<(K, T)>,
}

impl<K, T> Default for OrderedTaskSet<K, T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<K: TaskKey, T> OrderedTaskSet<K, T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `task` under `key`.
    ///
    /// ## Parameters
    /// - `key`: the ordering key; must not already be present.
    /// - `task`: the unit of work.
    ///
    /// ## Returns
    /// - `Ok(())` when stored.
    /// - `Err(TaskSetError::DuplicateKey)` when `key` is taken; the existing task is kept and `task` is dropped.
    pub fn insert(&mut self, key: K, task: T) -> Result<(), TaskSetError> {
        match self.position(&key) {
            Ok(_) => Err(TaskSetError::DuplicateKey { key: key.to_string() }),
            Err(slot) => {
                self.entries.insert(slot, (key, task));
                Ok(())
            }
        }
    }

    /// Iterate `(key, task)` pairs in ascending key order.
    ///
    /// Every call re-derives the same order; the iterator is lazy and finite.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, &T)> + '_ {
        self.entries.iter().map(|(key, task)| (key, task))
    }

    /// Iterate keys in ascending order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> + '_ {
        self.entries.iter().map(|(key, _)| key)
    }

    /// Look up the task stored under `key`.
    pub fn get(&self, key: &K) -> Option<&T> {
        self.position(key).ok().map(|slot| &self.entries[slot].1)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.position(key).is_ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &K) -> Result<usize, usize> {
        self.entries.binary_search_by(|(probe, _)| probe.compare(key))
    }
}

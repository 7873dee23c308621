//! Read/write-locked instrument pools.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::key::InstrumentKey;

/// A grow-only map from instrument key to pooled value.
///
/// Lookups take the shared lock. Creation takes the exclusive lock and
/// re-checks the key before building, so `create` runs at most once per key
/// for the lifetime of the pool.
pub(crate) struct Pool<V> {
    entries: RwLock<HashMap<InstrumentKey, V>>,
}

impl<V: Clone> Pool<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the pooled value for `key`, building and inserting it with
    /// `create` if absent.
    pub(crate) fn get_or_insert_with<F>(&self, key: &InstrumentKey, create: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.entries.read().get(key) {
            return value.clone();
        }

        let mut entries = self.entries.write();
        // Another writer may have won between the two locks.
        if let Some(value) = entries.get(key) {
            return value.clone();
        }

        let value = create();
        entries.insert(key.clone(), value.clone());
        value
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &InstrumentKey) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl<V: Clone> Default for Pool<V> {
    fn default() -> Self {
        Self::new()
    }
}

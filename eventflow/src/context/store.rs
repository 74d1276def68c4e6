//! Thread-safe global and private state partitions.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value;
use std::collections::HashMap;

/// The global partition of a session.
///
/// One `GlobalStore` exists per session; every context of that session holds
/// an `Arc` to it. Its lock also serializes private writes across the session,
/// so duplicate checks and commits are atomic.
#[derive(Debug, Default)]
pub struct GlobalStore {
    data: RwLock<HashMap<String, Value>>,
}

impl GlobalStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value from the store.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Sets a value, overwriting any previous one.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.data.write().insert(key.into(), value);
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        self.data.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        self.data.write()
    }
}

/// The private partition of one context.
///
/// Owned by the context that created it; never shared or copied.
#[derive(Debug, Default)]
pub struct PrivateStore {
    data: RwLock<HashMap<String, Value>>,
}

impl PrivateStore {
    /// Creates a new empty partition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value from the partition.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Returns all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the partition is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    // Callers hold the session's global write lock.
    pub(crate) fn insert(&self, key: String, value: Value) {
        self.data.write().insert(key, value);
    }
}

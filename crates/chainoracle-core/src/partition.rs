//! Keyed partitions — one async mutex-guarded slot per key.
//!
//! Writers for the same key queue on the slot's mutex; writers for different
//! keys never touch each other's locks. The outer map lock is held only long
//! enough to find or insert a slot.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

/// A slot caches the owned record for its key (`None` until loaded).
pub type Slot<V> = Arc<tokio::sync::Mutex<Option<V>>>;

pub struct KeyedPartitions<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K: Eq + Hash + Clone, V> KeyedPartitions<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The slot for `key`, created empty on first use.
    pub fn slot(&self, key: &K) -> Slot<V> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    /// Drop the slot for `key`. Only call for records that will never be
    /// written again.
    pub fn evict(&self, key: &K) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Drop the slot for `key` unless another task still holds it. Release
    /// your own handle first. Returns `true` if the slot was removed.
    pub fn evict_idle(&self, key: &K) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(key) {
            Some(slot) if Arc::strong_count(slot) == 1 => {
                slots.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, V> Default for KeyedPartitions<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

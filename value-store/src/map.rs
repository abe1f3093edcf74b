//! Keyed collection of value stores
//!
//! `ValueStoreMap<K, V>` lazily creates one [`ValueStore<V>`] per key: any
//! read, write or subscription for an unknown key first materialises the
//! per-key store. Removal detaches every listener of the per-key store
//! before the entry is dropped.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::observer::{Observer, Subscription};
use crate::value::ValueStore;

/// Map of auto-created per-key value stores
///
/// Cloning shares the same map.
pub struct ValueStoreMap<K, V> {
    entries: Arc<Mutex<HashMap<K, ValueStore<V>>>>,
}

impl<K, V> Clone for ValueStoreMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone + Send + Sync + 'static> Default for ValueStoreMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for ValueStoreMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueStoreMap")
            .field("key_count", &self.entries.lock().len())
            .finish()
    }
}

impl<K: Eq + Hash + Clone, V: Clone + Send + Sync + 'static> ValueStoreMap<K, V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The per-key store, created empty if absent
    pub fn store(&self, key: &K) -> ValueStore<V> {
        self.entries
            .lock()
            .entry(key.clone())
            .or_insert_with(ValueStore::new)
            .clone()
    }

    /// Current value for `key`, or `None` when unset
    pub fn get(&self, key: &K) -> Option<V> {
        self.store(key).get()
    }

    /// Current value for `key`; an absent entry is created seeded with
    /// `default`
    ///
    /// The default only applies at creation: an existing entry returns its
    /// own (possibly unset) value, and seeding a fresh store notifies
    /// nobody.
    pub fn get_or(&self, key: &K, default: V) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(store) => store.get(),
            None => {
                entries.insert(key.clone(), ValueStore::with_value(default.clone()));
                Some(default)
            }
        }
    }

    /// Set the value for `key`, notifying that key's observers
    pub fn set(&self, key: &K, value: V) {
        self.store(key).set(value);
    }

    /// Assign every pair through [`ValueStoreMap::set`]
    pub fn set_many(&self, pairs: impl IntoIterator<Item = (K, V)>) {
        for (key, value) in pairs {
            self.set(&key, value);
        }
    }

    /// Subscribe to the per-key store, creating it if absent
    pub fn subscribe(
        &self,
        key: &K,
        observer: Arc<dyn Observer<V>>,
        call_on_registration: bool,
    ) -> crate::error::Result<Subscription> {
        self.store(key).subscribe(observer, call_on_registration)
    }

    /// Subscribe a closure to the per-key store
    pub fn subscribe_fn(
        &self,
        key: &K,
        f: impl Fn(&V) + Send + Sync + 'static,
        call_on_registration: bool,
    ) -> Subscription {
        self.store(key).subscribe_fn(f, call_on_registration)
    }

    /// Drop the entry for `key`
    ///
    /// All listeners of the per-key store are unsubscribed first. Returns
    /// whether an entry existed.
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.entries.lock().remove(key);
        match removed {
            Some(store) => {
                store.unsubscribe_all();
                true
            }
            None => false,
        }
    }

    /// Keys currently present (in unspecified order)
    pub fn keys(&self) -> Vec<K> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Whether an entry exists for `key`
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of materialised entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entry has been materialised
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_read_materialises_entry() {
        let map: ValueStoreMap<String, i32> = ValueStoreMap::new();
        assert!(map.is_empty());

        assert_eq!(map.get(&"a".to_string()), None);
        assert!(map.contains_key(&"a".to_string()));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_get_or_seeds_default_only_at_creation() {
        let map: ValueStoreMap<String, i32> = ValueStoreMap::new();
        let key = "retries".to_string();

        assert_eq!(map.get_or(&key, 3), Some(3));
        map.set(&key, 5);
        assert_eq!(map.get_or(&key, 3), Some(5), "existing value wins over default");

        // An entry materialised without a value stays unset.
        let empty = "empty".to_string();
        let _sub = map.subscribe_fn(&empty, |_| {}, false);
        assert_eq!(map.get_or(&empty, 9), None);
    }

    #[test]
    fn test_per_key_subscription() {
        let map: ValueStoreMap<String, i32> = ValueStoreMap::new();
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&a_calls);
        let _a = map.subscribe_fn(&"a".to_string(), move |_| { c.fetch_add(1, Ordering::SeqCst); }, false);
        let c = Arc::clone(&b_calls);
        let _b = map.subscribe_fn(&"b".to_string(), move |_| { c.fetch_add(1, Ordering::SeqCst); }, false);

        map.set(&"a".to_string(), 1);
        map.set(&"a".to_string(), 2);

        assert_eq!(a_calls.load(Ordering::SeqCst), 2);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0, "other keys unaffected");
    }

    #[test]
    fn test_remove_detaches_listeners() {
        let map: ValueStoreMap<String, i32> = ValueStoreMap::new();
        let key = "a".to_string();
        let calls = Arc::new(AtomicUsize::new(0));

        let store = map.store(&key);
        let c = Arc::clone(&calls);
        let _sub = map.subscribe_fn(&key, move |_| { c.fetch_add(1, Ordering::SeqCst); }, false);

        assert!(map.remove(&key));
        assert!(!map.contains_key(&key));
        assert_eq!(store.subscriber_count(), 0);

        // The detached store can still be written, but nobody listens.
        store.set(9);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(!map.remove(&key), "second removal finds nothing");
    }

    #[test]
    fn test_set_many() {
        let map: ValueStoreMap<String, i32> = ValueStoreMap::new();
        map.set_many([("a".to_string(), 1), ("b".to_string(), 2)]);

        assert_eq!(map.get(&"a".to_string()), Some(1));
        assert_eq!(map.get(&"b".to_string()), Some(2));
    }
}

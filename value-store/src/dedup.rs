//! Deduplicating value store
//!
//! `DedupValueStore<T>` behaves like [`ValueStore<T>`] except that setting a
//! value structurally equal to the stored one is a silent no-op: nothing is
//! written and no observer runs. Equality is the type's `PartialEq`, which
//! for the mapping/sequence/primitive shapes used across this workspace is
//! exactly structural deep equality.

use std::sync::Arc;

use crate::error::Result;
use crate::observer::{Observer, Subscription};
use crate::value::ValueStore;

/// A value store that suppresses writes of equal values
pub struct DedupValueStore<T> {
    store: ValueStore<T>,
}

impl<T> Clone for DedupValueStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Default for DedupValueStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for DedupValueStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupValueStore")
            .field("subscriber_count", &self.store.subscriber_count())
            .finish()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> DedupValueStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            store: ValueStore::new(),
        }
    }

    /// Create a store seeded with an initial value
    pub fn with_value(value: T) -> Self {
        Self {
            store: ValueStore::with_value(value),
        }
    }

    /// Get a clone of the current value
    pub fn get(&self) -> Option<T> {
        self.store.get()
    }

    /// Store `value` unless it equals the current value
    ///
    /// Returns whether the value was actually written (and observers ran).
    pub fn set(&self, value: T) -> bool {
        if self.store.get().as_ref() == Some(&value) {
            return false;
        }
        self.store.set(value);
        true
    }

    /// Replace the value through a function of the current value
    ///
    /// Subject to the same deduplication as [`DedupValueStore::set`].
    pub fn update(&self, f: impl FnOnce(Option<T>) -> T) -> bool {
        self.set(f(self.get()))
    }

    /// Register an observer; see [`ValueStore::subscribe`]
    pub fn subscribe(
        &self,
        observer: Arc<dyn Observer<T>>,
        call_on_registration: bool,
    ) -> Result<Subscription> {
        self.store.subscribe(observer, call_on_registration)
    }

    /// Register a closure observer; see [`ValueStore::subscribe_fn`]
    pub fn subscribe_fn(
        &self,
        f: impl Fn(&T) + Send + Sync + 'static,
        call_on_registration: bool,
    ) -> Subscription {
        self.store.subscribe_fn(f, call_on_registration)
    }

    /// Drop every observer at once
    pub fn unsubscribe_all(&self) {
        self.store.unsubscribe_all()
    }

    /// Number of currently registered observers
    pub fn subscriber_count(&self) -> usize {
        self.store.subscriber_count()
    }

    /// Companion subscriber-edge store; see [`ValueStore::has_subscribers`]
    pub fn has_subscribers(&self) -> ValueStore<bool> {
        self.store.has_subscribers()
    }

    /// The underlying non-deduplicating store
    ///
    /// Exposed for composition (derived inputs, merged views). Writing
    /// through it bypasses deduplication.
    pub fn as_store(&self) -> &ValueStore<T> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_equal_set_is_a_no_op() {
        let store = DedupValueStore::with_value(1);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        store.subscribe_fn(move |_: &i32| { c.fetch_add(1, Ordering::SeqCst); }, false);

        assert!(!store.set(1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(store.set(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(!store.set(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_structural_equality_over_mappings() {
        let mut a = BTreeMap::new();
        a.insert("a".to_string(), 1);

        let store = DedupValueStore::with_value(a.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        store.subscribe_fn(move |_: &BTreeMap<String, i32>| { c.fetch_add(1, Ordering::SeqCst); }, false);

        // Structurally equal mapping, rebuilt from scratch.
        let mut same = BTreeMap::new();
        same.insert("a".to_string(), 1);
        assert!(!store.set(same));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        a.insert("a".to_string(), 2);
        assert!(store.set(a));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_set_on_empty_store_notifies() {
        let store: DedupValueStore<i32> = DedupValueStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        store.subscribe_fn(move |_: &i32| { c.fetch_add(1, Ordering::SeqCst); }, false);

        assert!(store.set(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

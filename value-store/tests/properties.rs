//! Property tests for the observable layer invariants

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use value_store::{DedupValueStore, Derived, ValueStore};

proptest! {
    /// Every observer registered before a set receives exactly one call
    /// with the written value, in registration order.
    #[test]
    fn prop_set_notifies_each_observer_once_in_order(
        observer_count in 1usize..8,
        values in proptest::collection::vec(any::<i32>(), 1..10),
    ) {
        let store = ValueStore::new();
        let log: Arc<Mutex<Vec<(usize, i32)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut subs = Vec::new();
        for idx in 0..observer_count {
            let log = Arc::clone(&log);
            subs.push(store.subscribe_fn(move |v: &i32| log.lock().push((idx, *v)), false));
        }

        for value in &values {
            store.set(*value);
        }

        let log = log.lock();
        prop_assert_eq!(log.len(), observer_count * values.len());
        for (set_idx, value) in values.iter().enumerate() {
            let pass = &log[set_idx * observer_count..(set_idx + 1) * observer_count];
            for (obs_idx, entry) in pass.iter().enumerate() {
                prop_assert_eq!(*entry, (obs_idx, *value));
            }
        }
    }

    /// The companion edge store always equals (subscriber_count > 0) after
    /// any interleaving of subscribes and unsubscribes.
    #[test]
    fn prop_has_subscribers_tracks_count(ops in proptest::collection::vec(any::<bool>(), 1..40)) {
        let store: ValueStore<i32> = ValueStore::new();
        let edge = store.has_subscribers();
        let mut live = Vec::new();

        for subscribe in ops {
            if subscribe {
                live.push(store.subscribe_fn(|_| {}, false));
            } else if let Some(sub) = live.pop() {
                sub.unsubscribe();
            }
            prop_assert_eq!(edge.get(), Some(store.subscriber_count() > 0));
            prop_assert_eq!(store.subscriber_count(), live.len());
        }
    }

    /// A deduplicating store never notifies for a write equal to its value,
    /// and always notifies for a changed one.
    #[test]
    fn prop_dedup_emits_only_on_change(values in proptest::collection::vec(-3i32..3, 1..30)) {
        let store: DedupValueStore<i32> = DedupValueStore::new();
        let emitted = Arc::new(Mutex::new(Vec::new()));

        let e = Arc::clone(&emitted);
        store.subscribe_fn(move |v: &i32| e.lock().push(*v), false);

        let mut expected = Vec::new();
        let mut current = None;
        for value in values {
            store.set(value);
            if current != Some(value) {
                expected.push(value);
                current = Some(value);
            }
        }

        prop_assert_eq!(&*emitted.lock(), &expected);
    }

    /// A derived store holds input subscriptions exactly while it is itself
    /// observed, for any number of observers coming and going.
    #[test]
    fn prop_derived_attachment_follows_own_observers(
        ops in proptest::collection::vec(any::<bool>(), 1..30),
    ) {
        let a = ValueStore::with_value(0);
        let b = ValueStore::with_value(0);
        let (ac, bc) = (a.clone(), b.clone());
        let sum = Derived::new(vec![a.as_watchable(), b.as_watchable()], move || {
            ac.get().unwrap_or(0) + bc.get().unwrap_or(0)
        });

        let mut live = Vec::new();
        for subscribe in ops {
            if subscribe {
                live.push(sum.subscribe_fn(|_| {}, false).unwrap());
            } else if let Some(sub) = live.pop() {
                sub.unsubscribe();
            }
            let observed = !live.is_empty();
            prop_assert_eq!(a.has_subscribers().get(), Some(observed));
            prop_assert_eq!(b.has_subscribers().get(), Some(observed));
        }
    }
}

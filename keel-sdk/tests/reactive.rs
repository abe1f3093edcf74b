//! End-to-end behaviour of the observable layer through the facade

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use keel_sdk::{DedupValueStore, Derived, ValueStore};

#[test]
fn deduplicating_store_emits_once_per_distinct_value() {
    let store = DedupValueStore::with_value(json!({"a": 1}));
    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let s = Arc::clone(&seen);
    let _sub = store.subscribe_fn(move |v: &Value| s.lock().push(v.clone()), true);

    // Registration delivers the current value once.
    assert_eq!(*seen.lock(), vec![json!({"a": 1})]);

    // A structurally equal write is silent.
    store.set(json!({"a": 1}));
    assert_eq!(seen.lock().len(), 1);

    // A real change emits exactly once.
    store.set(json!({"a": 2}));
    assert_eq!(*seen.lock(), vec![json!({"a": 1}), json!({"a": 2})]);
}

#[test]
fn derived_store_attaches_to_inputs_only_while_observed() {
    let left = ValueStore::with_value(1);
    let right = ValueStore::with_value(2);

    let (l, r) = (left.clone(), right.clone());
    let sum = Derived::new(vec![left.as_watchable(), right.as_watchable()], move || {
        l.get().unwrap_or(0) + r.get().unwrap_or(0)
    });

    // Before anyone subscribes: the value is computed live and the inputs
    // have no subscribers from the derived store.
    assert_eq!(sum.get().unwrap(), 3);
    assert_eq!(left.has_subscribers().get(), Some(false));
    assert_eq!(right.has_subscribers().get(), Some(false));

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let e = Arc::clone(&emitted);
    let sub = sum.subscribe_fn(move |v: &i32| e.lock().push(*v), true).unwrap();

    assert_eq!(*emitted.lock(), vec![3]);
    assert_eq!(left.has_subscribers().get(), Some(true));
    assert_eq!(right.has_subscribers().get(), Some(true));

    sub.unsubscribe();
    assert_eq!(left.has_subscribers().get(), Some(false));
    assert_eq!(right.has_subscribers().get(), Some(false));
}

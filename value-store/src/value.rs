//! Observable value container with subscriber-edge tracking
//!
//! `ValueStore<T>` is the base primitive of the reactive layer. It holds an
//! optional current value and an insertion-ordered observer registry, and
//! notifies every observer synchronously when the value is set.
//!
//! # Architecture
//!
//! ```text
//! ValueStore<T>
//!     │
//!     ├── value: Option<T>
//!     ├── observers: Vec<(id, Arc<dyn Observer<T>>)>   (insertion order)
//!     │
//!     └── has_subscribers: ValueStore<bool>   (lazily created companion,
//!             flips only on the 0↔1 subscriber-count edges)
//! ```
//!
//! # Notification semantics
//!
//! - Observers are notified in registration order.
//! - No lock is held while observers run, so an observer may freely call
//!   `set` again; the nested pass completes before the outer pass resumes.
//! - An observer removed mid-pass (including by itself) is skipped for the
//!   remainder of the pass.
//! - A panicking observer is caught and logged; later observers still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::error;

use crate::error::{Result, StoreError};
use crate::observer::{Observer, Subscription};

struct ObserverEntry<T> {
    id: u64,
    observer: Arc<dyn Observer<T>>,
}

struct State<T> {
    value: Option<T>,
    observers: Vec<ObserverEntry<T>>,
    next_id: u64,
}

pub(crate) struct Inner<T> {
    state: Mutex<State<T>>,
    /// Companion store flipped on the 0↔1 subscriber edges.
    has_subscribers: OnceLock<ValueStore<bool>>,
}

/// A mutable value with synchronously notified observers
///
/// Cloning a `ValueStore` creates a new handle to the **same** store:
/// both handles share the value and the observer registry, exactly like
/// the shared stores elsewhere in this workspace.
pub struct ValueStore<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ValueStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ValueStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ValueStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ValueStore")
            .field("has_value", &state.value.is_some())
            .field("subscriber_count", &state.observers.len())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ValueStore<T> {
    /// Create an empty store (no current value)
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    value: None,
                    observers: Vec::new(),
                    next_id: 0,
                }),
                has_subscribers: OnceLock::new(),
            }),
        }
    }

    /// Create a store seeded with an initial value
    ///
    /// Seeding does not notify anyone; there are no observers yet.
    pub fn with_value(value: T) -> Self {
        let store = Self::new();
        store.inner.state.lock().value = Some(value);
        store
    }

    /// Get a clone of the current value
    ///
    /// Never touches the subscriber-edge companion.
    pub fn get(&self) -> Option<T> {
        self.inner.state.lock().value.clone()
    }

    /// Store a new value and notify every current observer with it
    ///
    /// Observers registered after the internal snapshot (for example by an
    /// earlier observer in the same pass) see only subsequent sets.
    pub fn set(&self, value: T) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            state.value = Some(value.clone());
            state
                .observers
                .iter()
                .map(|e| (e.id, Arc::clone(&e.observer)))
                .collect::<Vec<_>>()
        };

        for (id, observer) in snapshot {
            // Skip observers that were unsubscribed earlier in this pass.
            if !self.is_registered(id) {
                continue;
            }
            notify_guarded(observer.as_ref(), &value);
        }
    }

    /// Replace the value through a function of the current value
    pub fn update(&self, f: impl FnOnce(Option<T>) -> T) {
        self.set(f(self.get()));
    }

    /// Register an observer
    ///
    /// Rejects a handle that is already subscribed. On the 0→1 subscriber
    /// edge the companion store publishes `true`. With
    /// `call_on_registration`, the observer is invoked synchronously inside
    /// this call iff a current value is defined.
    pub fn subscribe(
        &self,
        observer: Arc<dyn Observer<T>>,
        call_on_registration: bool,
    ) -> Result<Subscription> {
        {
            let state = self.inner.state.lock();
            if state
                .observers
                .iter()
                .any(|e| Arc::ptr_eq(&e.observer, &observer))
            {
                return Err(StoreError::DuplicateObserver);
            }
        }
        Ok(self.insert_observer(observer, call_on_registration))
    }

    /// Register a closure observer
    ///
    /// A freshly wrapped closure can never collide with an existing handle,
    /// so this variant is infallible.
    pub fn subscribe_fn(
        &self,
        f: impl Fn(&T) + Send + Sync + 'static,
        call_on_registration: bool,
    ) -> Subscription {
        self.insert_observer(Arc::new(f), call_on_registration)
    }

    fn insert_observer(
        &self,
        observer: Arc<dyn Observer<T>>,
        call_on_registration: bool,
    ) -> Subscription {
        let (id, count, current) = {
            let mut state = self.inner.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.observers.push(ObserverEntry {
                id,
                observer: Arc::clone(&observer),
            });
            (id, state.observers.len(), state.value.clone())
        };

        if count == 1 {
            self.publish_edge(true);
        }

        if call_on_registration {
            if let Some(value) = current {
                notify_guarded(observer.as_ref(), &value);
            }
        }

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || Self::remove_observer(&weak, id))
    }

    fn remove_observer(weak: &Weak<Inner<T>>, id: u64) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let went_empty = {
            let mut state = inner.state.lock();
            let before = state.observers.len();
            state.observers.retain(|e| e.id != id);
            before > 0 && state.observers.is_empty()
        };
        if went_empty {
            if let Some(edge) = inner.has_subscribers.get() {
                edge.set(false);
            }
        }
    }

    /// Drop every observer at once
    ///
    /// Publishes the 1→0 edge if the registry was non-empty.
    pub fn unsubscribe_all(&self) {
        let went_empty = {
            let mut state = self.inner.state.lock();
            let had_any = !state.observers.is_empty();
            state.observers.clear();
            had_any
        };
        if went_empty {
            self.publish_edge(false);
        }
    }

    /// Number of currently registered observers
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().observers.len()
    }

    /// Companion store that is `true` exactly while this store has ≥1 observer
    ///
    /// Created lazily on first access, seeded with the current edge state.
    /// The companion only changes on subscribe/unsubscribe, never on `set`.
    pub fn has_subscribers(&self) -> ValueStore<bool> {
        self.inner
            .has_subscribers
            .get_or_init(|| ValueStore::with_value(self.subscriber_count() > 0))
            .clone()
    }

    fn publish_edge(&self, active: bool) {
        if let Some(edge) = self.inner.has_subscribers.get() {
            edge.set(active);
        }
    }

    fn is_registered(&self, id: u64) -> bool {
        self.inner.state.lock().observers.iter().any(|e| e.id == id)
    }
}

/// Invoke an observer, isolating panics from the notification loop
fn notify_guarded<T>(observer: &dyn Observer<T>, value: &T) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer.notify(value))) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(reason = %reason, "observer panicked during notification");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex as PlMutex;

    use super::*;

    #[test]
    fn test_set_and_get() {
        let store = ValueStore::new();
        assert_eq!(store.get(), None);

        store.set(42);
        assert_eq!(store.get(), Some(42));

        store.update(|v| v.unwrap_or(0) + 1);
        assert_eq!(store.get(), Some(43));
    }

    #[test]
    fn test_observers_notified_in_registration_order() {
        let store = ValueStore::new();
        let seen = Arc::new(PlMutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            store.subscribe_fn(move |v: &i32| seen.lock().push((tag, *v)), false);
        }

        store.set(7);
        assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }

    #[test]
    fn test_call_on_registration_only_when_value_defined() {
        let store = ValueStore::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let sub = store.subscribe_fn(move |_: &i32| { c.fetch_add(1, Ordering::SeqCst); }, true);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no value yet");
        sub.unsubscribe();

        store.set(1);
        let c = Arc::clone(&calls);
        store.subscribe_fn(move |_: &i32| { c.fetch_add(1, Ordering::SeqCst); }, true);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "current value delivered");
    }

    #[test]
    fn test_duplicate_observer_rejected() {
        let store: ValueStore<i32> = ValueStore::new();
        let observer: Arc<dyn Observer<i32>> = Arc::new(|_: &i32| {});

        let first = store.subscribe(Arc::clone(&observer), false);
        assert!(first.is_ok());

        let second = store.subscribe(observer, false);
        assert!(matches!(second, Err(StoreError::DuplicateObserver)));
    }

    #[test]
    fn test_has_subscribers_edges() {
        let store: ValueStore<i32> = ValueStore::new();
        let edge = store.has_subscribers();
        assert_eq!(edge.get(), Some(false));

        let s1 = store.subscribe_fn(|_| {}, false);
        assert_eq!(edge.get(), Some(true));

        // Second subscriber: no edge.
        let s2 = store.subscribe_fn(|_| {}, false);
        assert_eq!(edge.get(), Some(true));

        s1.unsubscribe();
        assert_eq!(edge.get(), Some(true));

        s2.unsubscribe();
        assert_eq!(edge.get(), Some(false));
    }

    #[test]
    fn test_edge_unaffected_by_set_and_get() {
        let store = ValueStore::new();
        let edge = store.has_subscribers();
        let flips = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&flips);
        let _sub = edge.subscribe_fn(move |_: &bool| { f.fetch_add(1, Ordering::SeqCst); }, false);

        store.set(1);
        store.set(2);
        let _ = store.get();
        assert_eq!(flips.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribed_mid_pass_is_skipped() {
        let store = ValueStore::new();
        let later_calls = Arc::new(AtomicUsize::new(0));

        // Registered second, unsubscribed by the first observer mid-pass.
        let victim: Arc<PlMutex<Option<Subscription>>> = Arc::new(PlMutex::new(None));

        let v = Arc::clone(&victim);
        store.subscribe_fn(
            move |_: &i32| {
                if let Some(sub) = v.lock().take() {
                    sub.unsubscribe();
                }
            },
            false,
        );

        let c = Arc::clone(&later_calls);
        let sub = store.subscribe_fn(move |_: &i32| { c.fetch_add(1, Ordering::SeqCst); }, false);
        *victim.lock() = Some(sub);

        store.set(1);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);

        store.set(2);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reentrant_set_nests_strictly() {
        let store = ValueStore::new();
        let order = Arc::new(PlMutex::new(Vec::new()));

        let o = Arc::clone(&order);
        let inner_store = store.clone();
        store.subscribe_fn(
            move |v: &i32| {
                o.lock().push(*v);
                if *v == 1 {
                    // Nested set completes before the outer pass resumes.
                    inner_store.set(2);
                }
            },
            false,
        );

        let o = Arc::clone(&order);
        store.subscribe_fn(move |v: &i32| o.lock().push(100 + *v), false);

        store.set(1);
        // First observer sees 1, recurses: both observers see 2, then the
        // outer pass resumes and the second observer sees the original 1.
        assert_eq!(*order.lock(), vec![1, 2, 102, 101]);
    }

    #[test]
    fn test_panicking_observer_does_not_poison_the_pass() {
        let store = ValueStore::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        store.subscribe_fn(|_: &i32| panic!("boom"), false);
        let d = Arc::clone(&delivered);
        store.subscribe_fn(move |_: &i32| { d.fetch_add(1, Ordering::SeqCst); }, false);

        store.set(5);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(), Some(5));
    }

    #[test]
    fn test_unsubscribe_all_clears_registry_and_edge() {
        let store = ValueStore::new();
        let edge = store.has_subscribers();

        let _a = store.subscribe_fn(|_: &i32| {}, false);
        let _b = store.subscribe_fn(|_: &i32| {}, false);
        assert_eq!(store.subscriber_count(), 2);

        store.unsubscribe_all();
        assert_eq!(store.subscriber_count(), 0);
        assert_eq!(edge.get(), Some(false));
    }

    #[test]
    fn test_clone_shares_state() {
        let a = ValueStore::new();
        let b = a.clone();

        a.set(9);
        assert_eq!(b.get(), Some(9));
    }
}

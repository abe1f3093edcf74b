//! Observer trait and subscription handles
//!
//! Observers are held by the stores as `Arc<dyn Observer<T>>`. The `Arc`
//! pointer doubles as the observer's identity: subscribing the same handle
//! twice is rejected, while two distinct closures are always distinct
//! observers even if they are textually identical.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use value_store::ValueStore;
//!
//! let store = ValueStore::with_value(1u32);
//! let sub = store.subscribe_fn(|v| println!("value: {v}"), true);
//!
//! store.set(2);
//! sub.unsubscribe();
//! ```

use parking_lot::Mutex;

/// A callback invoked with the latest value of a store
///
/// Blanket-implemented for closures, so most call sites pass an
/// `Arc::new(move |value: &T| ...)` or use the `subscribe_fn` helpers.
pub trait Observer<T>: Send + Sync {
    /// Receive the latest value
    fn notify(&self, value: &T);
}

impl<T, F> Observer<T> for F
where
    F: Fn(&T) + Send + Sync,
{
    fn notify(&self, value: &T) {
        self(value)
    }
}

/// Handle returned from `subscribe`
///
/// Invoking [`Subscription::unsubscribe`] removes the observer from its
/// store. The handle is owned by whoever registered the observer; the
/// store only keeps a back-reference for notification. Dropping the handle
/// without calling `unsubscribe` leaves the observer registered.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Wrap a cancel thunk into a subscription handle
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription that does nothing when unsubscribed
    pub fn noop() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    /// Merge several subscriptions into one handle that detaches them all
    pub fn merge(subs: Vec<Subscription>) -> Self {
        Self::new(move || {
            for sub in &subs {
                sub.unsubscribe();
            }
        })
    }

    /// Remove the observer from its store
    ///
    /// Idempotent: only the first call has an effect.
    pub fn unsubscribe(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel();
        }
    }

    /// Whether the subscription has not been cancelled yet
    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

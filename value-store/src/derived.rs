//! Read-only stores derived from other stores
//!
//! A `Derived<T>` computes its value from a fixed, ordered set of input
//! stores. It is demand-driven: while it has at least one observer of its
//! own it keeps a recompute trigger subscribed to every input, and the
//! moment its own observer count drops to zero it releases every input
//! subscription. This is the same first-reference-subscribes /
//! last-reference-releases discipline used for service subscriptions
//! elsewhere in the workspace, applied to store graphs.
//!
//! # Example
//!
//! ```rust,ignore
//! use value_store::{Derived, ValueStore};
//!
//! let a = ValueStore::with_value(1);
//! let b = ValueStore::with_value(2);
//!
//! let sum = {
//!     let (a, b) = (a.clone(), b.clone());
//!     Derived::new(
//!         vec![a.as_watchable(), b.as_watchable()],
//!         move || a.get().unwrap_or(0) + b.get().unwrap_or(0),
//!     )
//! };
//!
//! assert_eq!(sum.get().unwrap(), 3);   // computed live, inputs untouched
//! let sub = sum.subscribe_fn(|v| println!("sum: {v}"), true)?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::warn;

use crate::dedup::DedupValueStore;
use crate::error::{Result, StoreError};
use crate::observer::{Observer, Subscription};
use crate::value::ValueStore;

/// A store that can feed a derived computation
///
/// Implemented by every store type in this crate. `watch` registers a
/// value-agnostic trigger that fires whenever the store emits.
pub trait Watchable: Send + Sync {
    /// Subscribe a recompute trigger (never called at registration)
    fn watch(&self, trigger: Arc<dyn Fn() + Send + Sync>) -> Result<Subscription>;
}

impl<T: Clone + Send + Sync + 'static> Watchable for ValueStore<T> {
    fn watch(&self, trigger: Arc<dyn Fn() + Send + Sync>) -> Result<Subscription> {
        Ok(self.subscribe_fn(move |_| trigger(), false))
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Watchable for DedupValueStore<T> {
    fn watch(&self, trigger: Arc<dyn Fn() + Send + Sync>) -> Result<Subscription> {
        Ok(self.subscribe_fn(move |_| trigger(), false))
    }
}

impl<T: Clone + Send + Sync + 'static> ValueStore<T> {
    /// Type-erased handle for use as a derived input
    pub fn as_watchable(&self) -> Arc<dyn Watchable> {
        Arc::new(self.clone())
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> DedupValueStore<T> {
    /// Type-erased handle for use as a derived input
    pub fn as_watchable(&self) -> Arc<dyn Watchable> {
        Arc::new(self.clone())
    }
}

struct DerivedInner<T> {
    /// Output side. Deduplication gives the re-emit-only-on-change guard.
    out: DedupValueStore<T>,
    inputs: Vec<Arc<dyn Watchable>>,
    derive: Box<dyn Fn() -> T + Send + Sync>,
    /// Live input subscriptions; non-empty exactly while attached.
    attached: Mutex<Vec<Subscription>>,
    /// Guards against re-entrant recomputation through cyclic graphs.
    recomputing: AtomicBool,
    destroyed: AtomicBool,
    edge_sub: OnceLock<Subscription>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> DerivedInner<T> {
    fn attach(inner: &Arc<Self>) {
        let mut attached = inner.attached.lock();
        if !attached.is_empty() {
            return;
        }
        for input in &inner.inputs {
            let weak = Arc::downgrade(inner);
            let trigger: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Self::recompute(&inner);
                }
            });
            match input.watch(trigger) {
                Ok(sub) => attached.push(sub),
                Err(err) => warn!(%err, "derived input refused attachment"),
            }
        }
    }

    fn detach(inner: &Arc<Self>) {
        for sub in inner.attached.lock().drain(..) {
            sub.unsubscribe();
        }
    }

    fn recompute(inner: &Arc<Self>) {
        if inner.destroyed.load(Ordering::SeqCst) {
            return;
        }
        // Drop nested invocations: a recompute that reaches itself through
        // the graph would otherwise never terminate.
        if inner.recomputing.swap(true, Ordering::SeqCst) {
            return;
        }
        let value = (inner.derive)();
        inner.out.set(value);
        inner.recomputing.store(false, Ordering::SeqCst);
    }
}

/// A read-only observable derived from a set of input stores
///
/// Cloning shares the same derived node. There is no `set`: the value is
/// always a function of the inputs.
pub struct Derived<T> {
    inner: Arc<DerivedInner<T>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("inputs", &self.inner.inputs.len())
            .field("destroyed", &self.inner.destroyed.load(Ordering::SeqCst))
            .finish()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Derived<T> {
    /// Create a derived store over `inputs`
    ///
    /// `derive` must be a pure function of the values it reads from the
    /// inputs it captured; it is invoked once per input emission while the
    /// derived store is observed, and on demand by [`Derived::get`].
    pub fn new(
        inputs: Vec<Arc<dyn Watchable>>,
        derive: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        let inner = Arc::new(DerivedInner {
            out: DedupValueStore::new(),
            inputs,
            derive: Box::new(derive),
            attached: Mutex::new(Vec::new()),
            recomputing: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            edge_sub: OnceLock::new(),
        });

        // Attach to the inputs on our own 0→1 observer edge, release on 1→0.
        let weak = Arc::downgrade(&inner);
        let edge = inner.out.has_subscribers().subscribe_fn(
            move |active: &bool| {
                if let Some(inner) = weak.upgrade() {
                    if *active {
                        DerivedInner::attach(&inner);
                    } else {
                        DerivedInner::detach(&inner);
                    }
                }
            },
            false,
        );
        let _ = inner.edge_sub.set(edge);

        Self { inner }
    }

    /// Compute the current value live
    ///
    /// Reads the inputs without subscribing to them.
    pub fn get(&self) -> Result<T> {
        self.ensure_live()?;
        Ok((self.inner.derive)())
    }

    /// Register an observer
    ///
    /// With `call_on_registration` the observer receives the value derived
    /// at registration time. The first observer attaches the recompute
    /// trigger to every input.
    pub fn subscribe(
        &self,
        observer: Arc<dyn Observer<T>>,
        call_on_registration: bool,
    ) -> Result<Subscription> {
        self.ensure_live()?;
        // Refresh the cached value so registration delivery is current even
        // after a detached period where inputs changed unobserved.
        DerivedInner::recompute(&self.inner);
        self.inner.out.subscribe(observer, call_on_registration)
    }

    /// Register a closure observer
    pub fn subscribe_fn(
        &self,
        f: impl Fn(&T) + Send + Sync + 'static,
        call_on_registration: bool,
    ) -> Result<Subscription> {
        self.subscribe(Arc::new(f), call_on_registration)
    }

    /// Number of currently registered observers
    pub fn subscriber_count(&self) -> usize {
        self.inner.out.subscriber_count()
    }

    /// Detach from all inputs, drop all observers and poison the store
    ///
    /// Every subsequent operation fails with [`StoreError::Destroyed`].
    pub fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Destroyed);
        }
        if let Some(edge) = self.inner.edge_sub.get() {
            edge.unsubscribe();
        }
        DerivedInner::detach(&self.inner);
        self.inner.out.unsubscribe_all();
        Ok(())
    }

    /// Whether [`Derived::destroy`] has been called
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(StoreError::Destroyed);
        }
        Ok(())
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Watchable for Derived<T> {
    fn watch(&self, trigger: Arc<dyn Fn() + Send + Sync>) -> Result<Subscription> {
        self.subscribe(Arc::new(move |_: &T| trigger()), false)
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Derived<T> {
    /// Type-erased handle for use as an input of another derived store
    pub fn as_watchable(&self) -> Arc<dyn Watchable> {
        Arc::new(self.clone())
    }
}

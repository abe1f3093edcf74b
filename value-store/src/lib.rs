//! Observable Value Stores
//!
//! The reactive foundation of the workspace: mutable values with
//! synchronously notified observers, subscriber-edge tracking, derived
//! values over store graphs, keyed store collections, and a labelled
//! cleanup registry.
//!
//! # Features
//!
//! - **Synchronous notification**: observers run in registration order,
//!   directly from the producer's `set` call
//! - **Subscriber edges**: every store exposes a companion `has_subscribers`
//!   store that flips on the 0↔1 observer-count edges
//! - **Change suppression**: [`DedupValueStore`] drops writes of values
//!   equal to the stored one
//! - **Demand-driven derivation**: [`Derived`] attaches to its inputs only
//!   while it is itself observed
//! - **Cleanup bookkeeping**: [`Offs`] collects labelled unsubscribe thunks
//!   and timer-backed delayed callbacks
//!
//! # Quick Start
//!
//! ```rust
//! use value_store::ValueStore;
//!
//! let store = ValueStore::with_value(1u32);
//!
//! let sub = store.subscribe_fn(|v| println!("value is now {v}"), true);
//!
//! store.set(2);
//! assert_eq!(store.get(), Some(2));
//!
//! sub.unsubscribe();
//! assert_eq!(store.subscriber_count(), 0);
//! ```
//!
//! # Architecture
//!
//! ```text
//! ValueStore<T> ──┬── DedupValueStore<T>   (equality-guarded set)
//!                 │
//!                 ├── Derived<T>           (inputs attached on demand)
//!                 │
//!                 └── ValueStoreMap<K, V>  (per-key auto-created stores)
//!
//! Offs            labelled cleanups, drained in registration order
//! ```

// Modules
pub mod dedup;
pub mod derived;
pub mod map;
pub mod observer;
pub mod offs;
pub mod value;

// Error types
pub mod error;

// Re-exports - Public API
pub use dedup::DedupValueStore;
pub use derived::{Derived, Watchable};
pub use error::{Result, StoreError};
pub use map::ValueStoreMap;
pub use observer::{Observer, Subscription};
pub use offs::{OffLabel, Offs};
pub use value::ValueStore;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::dedup::DedupValueStore;
    pub use crate::derived::{Derived, Watchable};
    pub use crate::error::StoreError;
    pub use crate::map::ValueStoreMap;
    pub use crate::observer::{Observer, Subscription};
    pub use crate::offs::{OffLabel, Offs};
    pub use crate::value::ValueStore;
}

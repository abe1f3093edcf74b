//! # Keel SDK - Reactive Service Lifecycle Runtime
//!
//! An in-process framework for building systems out of observable values
//! and named, dependency-aware services:
//!
//! ```rust,no_run
//! use keel_sdk::{Registration, ServiceManager, ServiceSpec, ServiceState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keel_sdk::ServiceError> {
//!     let manager = ServiceManager::new();
//!
//!     let storage = ServiceSpec::new("StorageService")
//!         .on_running(|ctx| async move {
//!             ctx.set_state(ServiceState::Running)?;
//!             Ok(())
//!         })
//!         .build();
//!
//!     let api = ServiceSpec::new("ApiService").build();
//!
//!     manager.register(Registration::new(storage))?;
//!     manager.register(Registration::new(api).depends_on("StorageService"))?;
//!
//!     manager.boot().await?;     // StorageService, then ApiService
//!     manager.shutdown().await?; // ApiService, then StorageService
//!     Ok(())
//! }
//! ```
//!
//! ## Key Pieces
//!
//! - **Observable stores**: values with synchronously notified observers,
//!   subscriber-edge tracking and demand-driven derivation
//! - **Services**: lifecycle state merged with dependency availability;
//!   a Running service with a missing dependency reports `Unavailable`
//! - **Manager**: unique names, boot in registration order, shutdown in
//!   reverse
//! - **State machine**: labelled states with bounded, cancellable
//!   stepwise transitions
//!
//! ## Architecture
//!
//! ```text
//! keel-sdk (facade)
//!     ↓
//! service-runtime (services, manager, config)    state-machine
//!     ↓                                               ↓
//! value-store (observable value layer)  ←────────────┘
//! ```

// Re-exports from the observable layer
pub use value_store::{
    DedupValueStore, Derived, Observer, OffLabel, Offs, StoreError, Subscription, ValueStore,
    ValueStoreMap, Watchable,
};

// Re-exports from the state machine
pub use state_machine::{
    MachineCursor, MachineError, StateMachine, StateNode, StepContext, StepOutcome, Transition,
    TransitionEdge,
};

// Re-exports from the service runtime
pub use service_runtime::{
    Config, ConfigChange, ConfigError, ObjectPath, Registration, SchemaValidator, ServiceContext,
    ServiceCore, ServiceError, ServiceEvent, ServiceManager, ServiceSpec, ServiceState,
};

/// Commonly used types for convenient importing
pub mod prelude {
    pub use service_runtime::prelude::*;
    pub use state_machine::prelude::*;
    pub use value_store::prelude::*;
}

/// Logging initialisation re-exported from the runtime
pub mod logging {
    pub use service_runtime::logging::{init, init_from_env, is_initialized, LogMode};
}

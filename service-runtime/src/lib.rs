//! Service Lifecycle Runtime
//!
//! Named, dependency-aware services over the observable value layer: each
//! service publishes its lifecycle state through a deduplicating store,
//! folds its dependencies' states into an availability flag, and exposes
//! the merge of both as its externally observed state. A manager registers
//! services under unique names, boots them in registration order and shuts
//! them down in reverse.
//!
//! # Architecture
//!
//! ```text
//! ServiceManager ── registry (insertion order = boot order)
//!     │
//!     └── ServiceCore
//!             ├── own_state: DedupValueStore<ServiceState>
//!             ├── deps_available: DedupValueStore<bool>
//!             ├── on_stop: Offs           (drained before Stopped publishes)
//!             ├── events: ValueStore<ServiceEvent>
//!             └── handlers: target state → async transition handler
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use service_runtime::{Registration, ServiceManager, ServiceSpec, ServiceState};
//!
//! let manager = ServiceManager::new();
//!
//! let storage = ServiceSpec::new("StorageService")
//!     .on_running(|ctx| async move {
//!         ctx.set_state(ServiceState::Running)?;
//!         Ok(())
//!     })
//!     .build();
//!
//! manager.register(Registration::new(storage))?;
//! manager.boot().await?;
//! ```

// Core modules
pub mod config;
pub mod event;
pub mod manager;
pub mod service;
pub mod state;

// Infrastructure
pub mod logging;

// Error types
pub mod error;

// ============================================================================
// Re-exports - Public API
// ============================================================================

pub use config::{
    parser_from_schema, Config, ConfigChange, ObjectPath, ParserFn, PropertyValidation,
    SchemaValidator, Validation,
};
pub use error::{ConfigError, HandlerError, Result, ServiceError};
pub use event::ServiceEvent;
pub use manager::{DependencyRef, Registration, ServiceManager};
pub use service::{
    ServiceContext, ServiceCore, ServiceSpec, TransitionHandler, DEFAULT_DEPENDENCY_TIMEOUT,
};
pub use state::ServiceState;

// ============================================================================
// Prelude
// ============================================================================

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::config::{Config, ConfigChange, ObjectPath};
    pub use crate::error::ServiceError;
    pub use crate::event::ServiceEvent;
    pub use crate::manager::{Registration, ServiceManager};
    pub use crate::service::{ServiceContext, ServiceCore, ServiceSpec};
    pub use crate::state::ServiceState;
}

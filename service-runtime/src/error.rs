//! Error types for the service runtime

use crate::state::ServiceState;

/// Boxed error produced by user-supplied hooks (configure, transition
/// handlers, config parsers)
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced by services and the service manager
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Only Stopped and Running can be targeted
    #[error("invalid target state '{0}': only 'running' and 'stopped' can be targeted")]
    InvalidTarget(ServiceState),

    /// A precondition on the service state does not hold
    #[error("service {service} must be {expected} (currently {actual})")]
    InvalidState {
        service: String,
        expected: &'static str,
        actual: ServiceState,
    },

    /// The operation requires a configured service
    #[error("service {0} has not been configured")]
    NotConfigured(String),

    /// The configure hook rejected the supplied configuration
    #[error("configuration of service {service} failed")]
    ConfigurationFailed {
        service: String,
        #[source]
        source: HandlerError,
    },

    /// The dependency was already added
    #[error("service {service} already depends on {dependency}")]
    DuplicateDependency { service: String, dependency: String },

    /// A transition handler for this target already exists
    #[error("service {service} already has a transition handler for target '{target}'")]
    DuplicateHandler {
        service: String,
        target: ServiceState,
    },

    /// The service name is taken in the manager's registry
    #[error("a service named {0} is already registered")]
    AlreadyRegistered(String),

    /// No service of that name in the manager's registry
    #[error("no service named {0} is registered")]
    NotFound(String),

    /// A transition handler failed; the service is now in the error state
    #[error("transition of service {service} to '{target}' failed")]
    TransitionFailed {
        service: String,
        target: ServiceState,
        #[source]
        source: HandlerError,
    },

    /// A dependency is in the error state
    #[error("dependency {dependency} of service {service} is in the error state")]
    DependencyFailed { service: String, dependency: String },

    /// Dependencies did not become available in time
    #[error("service {service} timed out waiting for dependencies: {waiting:?}")]
    DependencyTimeout {
        service: String,
        waiting: Vec<String>,
    },

    /// Booting stopped at the named service
    #[error("boot aborted at service {service}")]
    BootAborted {
        service: String,
        #[source]
        source: Box<ServiceError>,
    },

    /// A state name outside the known alias table
    #[error("unknown service state name: {0}")]
    UnknownStateName(String),

    /// The service behind a context handle no longer exists
    #[error("service {0} is no longer alive")]
    ServiceDropped(String),

    /// Error from the observable layer (cleanup registry, subscriptions)
    #[error(transparent)]
    Store(#[from] value_store::StoreError),

    /// Error from the configuration layer
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from the path-addressed configuration store
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Empty path or empty path segment
    #[error("invalid config path: {0}")]
    InvalidPath(String),

    /// `get_defined` found nothing at the path
    #[error("missing config value at {0}")]
    Missing(String),

    /// A path segment runs through a non-object value
    #[error("config path {0} collides with a non-object value")]
    NotAnObject(String),

    /// The per-key parser rejected the mutation
    #[error("validation of config key '{key}' failed")]
    Validation {
        key: String,
        #[source]
        source: HandlerError,
    },
}

//! Error types for the value-store crate

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the observable value layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The same observer handle was subscribed twice
    #[error("observer is already subscribed to this store")]
    DuplicateObserver,

    /// The store was destroyed and no longer accepts operations
    #[error("store has been destroyed")]
    Destroyed,

    /// A cleanup label is already present in the registry
    #[error("cleanup label already registered: {0}")]
    LabelInUse(String),

    /// Delayed execution requires a running tokio runtime
    #[error("no tokio runtime available for delayed execution")]
    NoRuntime,
}

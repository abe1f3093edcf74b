//! Error types for the state-machine crate

/// Boxed error produced by user-supplied step/cancel functions
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for machine operations
pub type Result<T> = std::result::Result<T, MachineError>;

/// Errors that can occur while defining or driving a state machine
#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    /// Referenced state label was never added
    #[error("unknown state: {0}")]
    UnknownState(String),

    /// State label already present and overwrite was not requested
    #[error("state already defined: {0}")]
    DuplicateState(String),

    /// Transition definition is inconsistent
    #[error("invalid transition {from} -> {to}: {reason}")]
    InvalidEdge {
        from: String,
        to: String,
        reason: String,
    },

    /// A transition is already running on this machine
    #[error("a transition is already in progress")]
    TransitionInProgress,

    /// The step function reported failure
    #[error("transition {from} -> {to} failed")]
    TransitionFailed {
        from: String,
        to: String,
        #[source]
        source: StepError,
    },

    /// The step budget ran out before the transition completed
    #[error("transition {from} -> {to} exceeded its step budget of {max_steps}")]
    StepBudgetExceeded {
        from: String,
        to: String,
        max_steps: u32,
    },

    /// The time budget ran out before the transition completed
    #[error("transition {from} -> {to} exceeded its time budget of {max_duration:?}")]
    DurationBudgetExceeded {
        from: String,
        to: String,
        max_duration: std::time::Duration,
    },

    /// The cancel function itself failed
    ///
    /// Carries the cancel failure as the source and, when cancellation was
    /// triggered by a failing transition, the original error alongside it.
    #[error("cancel of transition {from} -> {to} failed (original error: {original:?})")]
    CancelFailed {
        from: String,
        to: String,
        original: Option<Box<MachineError>>,
        #[source]
        source: StepError,
    },
}

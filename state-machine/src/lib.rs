//! Observable State Machine
//!
//! A labelled-state machine whose transitions are user-supplied stepwise
//! async functions bounded by step and time budgets, with cooperative
//! cancellation. The machine publishes its cursor (`{current, next}`)
//! through a value store, so the whole reactive layer can observe it.
//!
//! # Features
//!
//! - **Observable cursor**: every jump and transition publishes
//!   `{current, next}` snapshots
//! - **Bounded transitions**: step and wall-clock budgets with distinct
//!   failure kinds
//! - **Cooperative cancellation**: aborted transitions await the
//!   transition's cancel function before settling back
//! - **Delay edges**: a plain delay is a one-step transition
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use state_machine::{StateMachine, StepOutcome, Transition, TransitionEdge};
//!
//! let machine = StateMachine::new();
//! machine.add_state("idle", Default::default(), false)?;
//! machine.add_state("busy", Default::default(), false)?;
//!
//! machine.add_transition(TransitionEdge::new("idle", "busy").with_transition(
//!     Transition::new(|ctx| async move {
//!         Ok(if ctx.steps_before >= 2 { StepOutcome::done() } else { StepOutcome::pending() })
//!     })
//!     .build(),
//! ))?;
//!
//! machine.jump_to("idle")?;
//! machine.goto_state("busy").await?;
//! assert_eq!(machine.get().current_label(), Some("busy"));
//! ```

// Core modules
pub mod machine;
pub mod node;
pub mod transition;

// Error types
pub mod error;

// Re-exports - Public API
pub use error::{MachineError, Result, StepError};
pub use machine::{MachineCursor, StateMachine, TransitionEdge};
pub use node::StateNode;
pub use transition::{
    CancelContext, StepContext, StepOutcome, Transition, TransitionBuilder, TransitionHook,
    DEFAULT_MAX_DURATION, DEFAULT_MAX_STEPS,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::MachineError;
    pub use crate::machine::{MachineCursor, StateMachine, TransitionEdge};
    pub use crate::node::StateNode;
    pub use crate::transition::{StepContext, StepOutcome, Transition};
}

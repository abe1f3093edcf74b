//! Stepwise transition definitions
//!
//! A transition drives the machine from one state to another through a
//! user-supplied async step function that is invoked repeatedly until it
//! reports completion, or until the step or time budget runs out. An
//! optional cancel function is awaited when a transition is aborted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::time::Instant;

use crate::error::StepError;
use crate::node::StateNode;

/// Step budget applied when none is configured
pub const DEFAULT_MAX_STEPS: u32 = 1000;

/// Time budget applied when none is configured
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(60);

/// Everything a step function may inspect about the running transition
#[derive(Debug, Clone)]
pub struct StepContext {
    /// State the machine is leaving
    pub from: Arc<StateNode>,
    /// State the machine is heading to
    pub to: Arc<StateNode>,
    /// Number of completed steps before this one (0 on the first call)
    pub steps_before: u32,
    /// Monotonic timestamp taken when the transition loop was entered
    pub started_at: Instant,
    /// Time spent in the loop so far
    pub elapsed: Duration,
}

/// Context handed to a cancel function
#[derive(Debug, Clone)]
pub struct CancelContext {
    /// State the aborted transition was leaving
    pub from: Arc<StateNode>,
    /// State the aborted transition was heading to
    pub to: Arc<StateNode>,
}

/// What a step reported back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    /// Whether the transition is complete
    pub done: bool,
}

impl StepOutcome {
    /// The transition is complete
    pub fn done() -> Self {
        Self { done: true }
    }

    /// More steps are needed
    pub fn pending() -> Self {
        Self { done: false }
    }
}

pub(crate) type StepFn =
    Arc<dyn Fn(StepContext) -> BoxFuture<'static, Result<StepOutcome, StepError>> + Send + Sync>;

pub(crate) type CancelFn =
    Arc<dyn Fn(CancelContext) -> BoxFuture<'static, Result<(), StepError>> + Send + Sync>;

/// Observer invoked when a transition starts or ends
pub type TransitionHook = Arc<dyn Fn(&Arc<StateNode>, &Arc<StateNode>) + Send + Sync>;

/// A bounded, cancellable stepwise transition
///
/// Built through [`Transition::new`]:
///
/// ```rust,ignore
/// let transition = Transition::new(|ctx| async move {
///     Ok(if ctx.steps_before >= 2 { StepOutcome::done() } else { StepOutcome::pending() })
/// })
/// .max_steps(10)
/// .max_duration(Duration::from_secs(5))
/// .build();
/// ```
pub struct Transition {
    pub(crate) step: StepFn,
    pub(crate) cancel: Option<CancelFn>,
    pub(crate) on_start: Option<TransitionHook>,
    pub(crate) on_ended: Option<TransitionHook>,
    pub(crate) max_steps: u32,
    pub(crate) max_duration: Duration,
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("has_cancel", &self.cancel.is_some())
            .field("max_steps", &self.max_steps)
            .field("max_duration", &self.max_duration)
            .finish()
    }
}

impl Transition {
    /// Start building a transition around a step function
    pub fn new<F, Fut>(step: F) -> TransitionBuilder
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepOutcome, StepError>> + Send + 'static,
    {
        TransitionBuilder {
            step: Arc::new(move |ctx| step(ctx).boxed()),
            cancel: None,
            on_start: None,
            on_ended: None,
            max_steps: DEFAULT_MAX_STEPS,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }

    /// A single-step transition that just awaits `delay`
    pub fn delayed(delay: Duration) -> Self {
        Transition::new(move |_ctx| async move {
            tokio::time::sleep(delay).await;
            Ok(StepOutcome::done())
        })
        .build()
    }

    pub(crate) fn set_hooks(
        &mut self,
        on_start: Option<TransitionHook>,
        on_ended: Option<TransitionHook>,
    ) {
        if on_start.is_some() {
            self.on_start = on_start;
        }
        if on_ended.is_some() {
            self.on_ended = on_ended;
        }
    }
}

/// Builder for [`Transition`]
pub struct TransitionBuilder {
    step: StepFn,
    cancel: Option<CancelFn>,
    on_start: Option<TransitionHook>,
    on_ended: Option<TransitionHook>,
    max_steps: u32,
    max_duration: Duration,
}

impl TransitionBuilder {
    /// Install a cancel function awaited when the transition is aborted
    pub fn cancel<F, Fut>(mut self, cancel: F) -> Self
    where
        F: Fn(CancelContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        self.cancel = Some(Arc::new(move |ctx| cancel(ctx).boxed()));
        self
    }

    /// Observe the start of the transition
    pub fn on_start(mut self, hook: impl Fn(&Arc<StateNode>, &Arc<StateNode>) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    /// Observe the end of the transition (success or failure)
    pub fn on_ended(mut self, hook: impl Fn(&Arc<StateNode>, &Arc<StateNode>) + Send + Sync + 'static) -> Self {
        self.on_ended = Some(Arc::new(hook));
        self
    }

    /// Bound the number of step invocations
    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Bound the wall-clock duration of the step loop
    pub fn max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Finish the definition
    pub fn build(self) -> Transition {
        Transition {
            step: self.step,
            cancel: self.cancel,
            on_start: self.on_start,
            on_ended: self.on_ended,
            max_steps: self.max_steps,
            max_duration: self.max_duration,
        }
    }
}

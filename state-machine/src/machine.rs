//! Observable state machine with bounded transitions
//!
//! The machine's value is a [`MachineCursor`]: the current state plus, while
//! a transition is running, the state being entered. The cursor is published
//! through a [`ValueStore`], so anything that can observe a store can
//! observe the machine.
//!
//! # Example
//!
//! ```rust,ignore
//! use state_machine::{StateMachine, Transition, TransitionEdge, StepOutcome};
//!
//! let machine = StateMachine::new();
//! machine.add_state("idle", Default::default(), false)?;
//! machine.add_state("busy", Default::default(), false)?;
//!
//! machine.add_transition(
//!     TransitionEdge::new("idle", "busy").with_transition(
//!         Transition::new(|ctx| async move {
//!             Ok(if ctx.steps_before >= 2 { StepOutcome::done() } else { StepOutcome::pending() })
//!         })
//!         .build(),
//!     ),
//! )?;
//!
//! machine.jump_to("idle")?;
//! machine.goto_state("busy").await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use value_store::{Subscription, ValueStore};

use crate::error::{MachineError, Result};
use crate::node::StateNode;
use crate::transition::{CancelContext, StepContext, Transition, TransitionHook};

/// The machine's observable value: where it is and where it is heading
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineCursor {
    /// Current state, `None` before the first jump
    pub current: Option<Arc<StateNode>>,
    /// Target of the running transition, `None` while settled
    pub next: Option<Arc<StateNode>>,
}

impl MachineCursor {
    /// Label of the current state, if any
    pub fn current_label(&self) -> Option<&str> {
        self.current.as_ref().map(|n| n.label.as_str())
    }
}

/// Definition of a directed edge between two registered states
///
/// Exactly one of `transition` and `delay` must be supplied: a delay
/// produces a single-step transition that awaits it.
pub struct TransitionEdge {
    /// Source state label
    pub from: String,
    /// Target state label
    pub to: String,
    /// Explicit stepwise transition
    pub transition: Option<Transition>,
    /// Shorthand for a single-step delay transition
    pub delay: Option<Duration>,
    /// Start observer, overriding the transition's own
    pub on_start: Option<TransitionHook>,
    /// End observer, overriding the transition's own
    pub on_ended: Option<TransitionHook>,
}

impl TransitionEdge {
    /// Start defining an edge between two labels
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            transition: None,
            delay: None,
            on_start: None,
            on_ended: None,
        }
    }

    /// Use an explicit stepwise transition
    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Use a single-step delay transition
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Observe the start of this edge's transitions
    pub fn with_on_start(
        mut self,
        hook: impl Fn(&Arc<StateNode>, &Arc<StateNode>) + Send + Sync + 'static,
    ) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    /// Observe the end of this edge's transitions
    pub fn with_on_ended(
        mut self,
        hook: impl Fn(&Arc<StateNode>, &Arc<StateNode>) + Send + Sync + 'static,
    ) -> Self {
        self.on_ended = Some(Arc::new(hook));
        self
    }
}

struct ActiveTransition {
    transition: Arc<Transition>,
    from: Arc<StateNode>,
    to: Arc<StateNode>,
}

/// A labelled-state machine whose cursor is an observable value
pub struct StateMachine {
    cursor: ValueStore<MachineCursor>,
    states: Mutex<HashMap<String, Arc<StateNode>>>,
    /// Outgoing edges per source label; seeded empty by `add_state`.
    transitions: Mutex<HashMap<String, HashMap<String, Arc<Transition>>>>,
    active: Mutex<Option<ActiveTransition>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("state_count", &self.states.lock().len())
            .field("transitioning", &self.active.lock().is_some())
            .finish()
    }
}

impl StateMachine {
    /// Create a machine with no states and a `{None, None}` cursor
    pub fn new() -> Self {
        Self {
            cursor: ValueStore::with_value(MachineCursor::default()),
            states: Mutex::new(HashMap::new()),
            transitions: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
        }
    }

    /// Register a state under `label`
    ///
    /// Rejects an existing label unless `overwrite` is set. Also seeds the
    /// outgoing-edge table for the label.
    pub fn add_state(
        &self,
        label: impl Into<String>,
        context: Map<String, Value>,
        overwrite: bool,
    ) -> Result<Arc<StateNode>> {
        let label = label.into();
        let node = {
            let mut states = self.states.lock();
            if states.contains_key(&label) && !overwrite {
                return Err(MachineError::DuplicateState(label));
            }
            let node = StateNode::with_context(label.clone(), context);
            states.insert(label.clone(), Arc::clone(&node));
            node
        };
        self.transitions.lock().entry(label).or_default();
        Ok(node)
    }

    /// Register a directed transition between two existing states
    pub fn add_transition(&self, edge: TransitionEdge) -> Result<()> {
        let TransitionEdge {
            from,
            to,
            transition,
            delay,
            on_start,
            on_ended,
        } = edge;

        {
            let states = self.states.lock();
            if !states.contains_key(&from) {
                return Err(MachineError::UnknownState(from));
            }
            if !states.contains_key(&to) {
                return Err(MachineError::UnknownState(to));
            }
        }

        let mut transition = match (transition, delay) {
            (Some(_), Some(_)) => {
                return Err(MachineError::InvalidEdge {
                    from,
                    to,
                    reason: "both a transition and a delay were supplied".to_string(),
                })
            }
            (None, None) => {
                return Err(MachineError::InvalidEdge {
                    from,
                    to,
                    reason: "either a transition or a delay is required".to_string(),
                })
            }
            (Some(t), None) => t,
            (None, Some(d)) => Transition::delayed(d),
        };
        transition.set_hooks(on_start, on_ended);

        self.transitions
            .lock()
            .entry(from)
            .or_default()
            .insert(to, Arc::new(transition));
        Ok(())
    }

    /// Move the cursor to `label` without running any transition
    pub fn jump_to(&self, label: &str) -> Result<()> {
        let node = self.state(label)?;
        if self.active.lock().is_some() {
            return Err(MachineError::TransitionInProgress);
        }
        self.cursor.set(MachineCursor {
            current: Some(node),
            next: None,
        });
        Ok(())
    }

    /// Drive the machine to `label`
    ///
    /// No-op when already there. Acts like [`StateMachine::jump_to`] when no
    /// transition is registered for the current→target edge. Otherwise the
    /// cursor publishes `{current, next}`, the step loop runs within its
    /// budgets, and the cursor settles on `{target, None}` or, on failure,
    /// back on `{current, None}` after the cancel function ran.
    pub async fn goto_state(&self, label: &str) -> Result<()> {
        let to = self.state(label)?;
        let cursor = self.cursor.get().unwrap_or_default();

        if cursor.current_label() == Some(label) {
            return Ok(());
        }

        let transition = cursor.current.as_ref().and_then(|from| {
            self.transitions
                .lock()
                .get(from.label.as_str())
                .and_then(|edges| edges.get(label))
                .cloned()
        });

        let (Some(from), Some(transition)) = (cursor.current.clone(), transition) else {
            return self.jump_to(label);
        };

        {
            let mut active = self.active.lock();
            if active.is_some() {
                return Err(MachineError::TransitionInProgress);
            }
            *active = Some(ActiveTransition {
                transition: Arc::clone(&transition),
                from: Arc::clone(&from),
                to: Arc::clone(&to),
            });
        }

        debug!(from = %from.label, to = %to.label, "transition started");
        self.cursor.set(MachineCursor {
            current: Some(Arc::clone(&from)),
            next: Some(Arc::clone(&to)),
        });
        if let Some(hook) = &transition.on_start {
            hook(&from, &to);
        }

        let result = Self::run_steps(&transition, &from, &to).await;
        self.active.lock().take();

        let outcome = match result {
            Ok(()) => {
                self.cursor.set(MachineCursor {
                    current: Some(Arc::clone(&to)),
                    next: None,
                });
                debug!(from = %from.label, to = %to.label, "transition completed");
                Ok(())
            }
            Err(step_err) => {
                warn!(from = %from.label, to = %to.label, error = %step_err, "transition failed");
                let err = match Self::invoke_cancel(&transition, &from, &to).await {
                    Ok(()) => step_err,
                    Err(cancel_src) => MachineError::CancelFailed {
                        from: from.label.clone(),
                        to: to.label.clone(),
                        original: Some(Box::new(step_err)),
                        source: cancel_src,
                    },
                };
                self.cursor.set(MachineCursor {
                    current: Some(Arc::clone(&from)),
                    next: None,
                });
                Err(err)
            }
        };

        if let Some(hook) = &transition.on_ended {
            hook(&from, &to);
        }
        outcome
    }

    /// Abort the running transition, if any
    ///
    /// Awaits the transition's cancel function and settles the cursor back
    /// on the source state. A cancel failure surfaces with the cancel error
    /// as its source.
    pub async fn cancel_current_transition(&self) -> Result<()> {
        let Some(active) = self.active.lock().take() else {
            return Ok(());
        };

        let result = Self::invoke_cancel(&active.transition, &active.from, &active.to).await;
        self.cursor.set(MachineCursor {
            current: Some(Arc::clone(&active.from)),
            next: None,
        });

        result.map_err(|source| MachineError::CancelFailed {
            from: active.from.label.clone(),
            to: active.to.label.clone(),
            original: None,
            source,
        })
    }

    /// The observable cursor store
    pub fn cursor(&self) -> &ValueStore<MachineCursor> {
        &self.cursor
    }

    /// Current cursor snapshot
    pub fn get(&self) -> MachineCursor {
        self.cursor.get().unwrap_or_default()
    }

    /// Subscribe a closure to cursor changes
    pub fn subscribe_fn(
        &self,
        f: impl Fn(&MachineCursor) + Send + Sync + 'static,
        call_on_registration: bool,
    ) -> Subscription {
        self.cursor.subscribe_fn(f, call_on_registration)
    }

    /// Look up a registered state
    pub fn state(&self, label: &str) -> Result<Arc<StateNode>> {
        self.states
            .lock()
            .get(label)
            .cloned()
            .ok_or_else(|| MachineError::UnknownState(label.to_string()))
    }

    /// Labels of every registered state (unspecified order)
    pub fn state_labels(&self) -> Vec<String> {
        self.states.lock().keys().cloned().collect()
    }

    async fn run_steps(
        transition: &Transition,
        from: &Arc<StateNode>,
        to: &Arc<StateNode>,
    ) -> Result<()> {
        let started_at = Instant::now();
        let mut steps_before: u32 = 0;

        loop {
            let ctx = StepContext {
                from: Arc::clone(from),
                to: Arc::clone(to),
                steps_before,
                started_at,
                elapsed: started_at.elapsed(),
            };

            let outcome = (transition.step)(ctx)
                .await
                .map_err(|source| MachineError::TransitionFailed {
                    from: from.label.clone(),
                    to: to.label.clone(),
                    source,
                })?;

            if outcome.done {
                return Ok(());
            }

            steps_before += 1;
            if steps_before >= transition.max_steps {
                return Err(MachineError::StepBudgetExceeded {
                    from: from.label.clone(),
                    to: to.label.clone(),
                    max_steps: transition.max_steps,
                });
            }
            if started_at.elapsed() >= transition.max_duration {
                return Err(MachineError::DurationBudgetExceeded {
                    from: from.label.clone(),
                    to: to.label.clone(),
                    max_duration: transition.max_duration,
                });
            }
        }
    }

    async fn invoke_cancel(
        transition: &Transition,
        from: &Arc<StateNode>,
        to: &Arc<StateNode>,
    ) -> std::result::Result<(), crate::error::StepError> {
        let Some(cancel) = &transition.cancel else {
            return Ok(());
        };
        cancel(CancelContext {
            from: Arc::clone(from),
            to: Arc::clone(to),
        })
        .await
    }
}

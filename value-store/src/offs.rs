//! Labelled cleanup registry
//!
//! `Offs` collects unsubscribe/cleanup thunks under string or generated
//! labels so an owner can detach everything it wired up in one call.
//! Delayed callbacks are scheduled on the tokio runtime and their timer
//! abort is registered as the cleanup, so cancelling the registry also
//! cancels pending timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::observer::Subscription;

static NEXT_GENERATED: AtomicU64 = AtomicU64::new(0);

/// Key of a registered cleanup
///
/// Generated labels are opaque: they can only collide with themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OffLabel {
    /// Caller-supplied label
    Named(String),
    /// Allocated at registration when no label was supplied
    Generated(u64),
}

impl OffLabel {
    fn generated() -> Self {
        OffLabel::Generated(NEXT_GENERATED.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for OffLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OffLabel::Named(name) => write!(f, "{}", name),
            OffLabel::Generated(id) => write!(f, "#{}", id),
        }
    }
}

struct OffEntry {
    label: OffLabel,
    off: Box<dyn FnOnce() + Send>,
}

/// Insertion-ordered registry of labelled cleanup thunks
///
/// Cloning shares the same registry.
pub struct Offs {
    entries: Arc<Mutex<Vec<OffEntry>>>,
}

impl Clone for Offs {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl Default for Offs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Offs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Offs")
            .field("entry_count", &self.entries.lock().len())
            .finish()
    }
}

impl Offs {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a cleanup thunk
    ///
    /// With `label = None` a fresh opaque label is allocated. A label that
    /// is already present fails with [`StoreError::LabelInUse`].
    pub fn register(
        &self,
        label: Option<String>,
        off: impl FnOnce() + Send + 'static,
    ) -> Result<OffLabel> {
        let label = match label {
            Some(name) => OffLabel::Named(name),
            None => OffLabel::generated(),
        };
        self.register_label(label, Box::new(off))
    }

    fn register_label(&self, label: OffLabel, off: Box<dyn FnOnce() + Send>) -> Result<OffLabel> {
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.label == label) {
            return Err(StoreError::LabelInUse(label.to_string()));
        }
        entries.push(OffEntry {
            label: label.clone(),
            off,
        });
        Ok(label)
    }

    /// Register a subscription handle as a cleanup
    pub fn register_subscription(&self, label: Option<String>, sub: Subscription) -> Result<OffLabel> {
        self.register(label, move || sub.unsubscribe())
    }

    /// Schedule `f` to run after `delay`
    ///
    /// The timer abort is registered under the (possibly generated) label,
    /// and the returned handle both cancels the timer and removes the
    /// registry entry. Once the timer fires, the task frees its own slot,
    /// so the label becomes reusable. Requires a running tokio runtime.
    pub fn execute_delayed(
        &self,
        label: Option<String>,
        f: impl FnOnce() + Send + 'static,
        delay: Duration,
    ) -> Result<Subscription> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;

        let label = match label {
            Some(name) => OffLabel::Named(name),
            None => OffLabel::generated(),
        };

        let weak = Arc::downgrade(&self.entries);
        let task_label = label.clone();
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
            // The timer fired: free the slot so the label can be reused.
            Self::take_and_run(&weak, &task_label);
        });

        let abort = task.abort_handle();
        let registered = self.register_label(label.clone(), {
            let abort = abort.clone();
            Box::new(move || abort.abort())
        });
        if let Err(err) = registered {
            // A rejected schedule must not leave the timer running.
            abort.abort();
            return Err(err);
        }

        let weak = Arc::downgrade(&self.entries);
        Ok(Subscription::new(move || {
            Self::take_and_run(&weak, &label);
        }))
    }

    /// Run and remove the entry for `label`, silently ignoring absence
    pub fn try_unregister(&self, label: &OffLabel) {
        Self::take_and_run(&Arc::downgrade(&self.entries), label);
    }

    /// Whether an entry exists for `label`
    pub fn contains(&self, label: &OffLabel) -> bool {
        self.entries.lock().iter().any(|e| e.label == *label)
    }

    /// Number of registered cleanups
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Run every cleanup in registration order and clear the registry
    pub fn unsubscribe_all(&self) {
        let drained: Vec<OffEntry> = {
            let mut entries = self.entries.lock();
            entries.drain(..).collect()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "draining cleanup registry");
        }
        for entry in drained {
            (entry.off)();
        }
    }

    fn take_and_run(weak: &Weak<Mutex<Vec<OffEntry>>>, label: &OffLabel) {
        let Some(entries) = weak.upgrade() else {
            return;
        };
        let entry = {
            let mut entries = entries.lock();
            entries
                .iter()
                .position(|e| e.label == *label)
                .map(|idx| entries.remove(idx))
        };
        if let Some(entry) = entry {
            (entry.off)();
        }
    }
}

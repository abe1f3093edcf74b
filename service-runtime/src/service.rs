//! Dependency-aware service lifecycle
//!
//! A service pairs two deduplicating stores (its own lifecycle state and
//! an "all dependencies available" flag) and presents their merge as the
//! externally observed state: a service that is Running while a dependency
//! is not reports `Unavailable`.
//!
//! Services are defined through a [`ServiceSpec`]: a type name, an optional
//! configure hook and async transition handlers keyed by target state. The
//! built [`ServiceCore`] owns a stop registry whose cleanups are drained,
//! in registration order, right before the Stopped state is published.
//!
//! # Example
//!
//! ```rust,ignore
//! use service_runtime::{ServiceSpec, ServiceState};
//!
//! let cache = ServiceSpec::new("CacheService")
//!     .on_configure(|cfg| { /* validate */ Ok(()) })
//!     .on_running(|ctx| async move {
//!         // ...open sockets, warm caches...
//!         ctx.set_state(ServiceState::Running)?;
//!         Ok(())
//!     })
//!     .build();
//!
//! cache.configure(&serde_json::json!({"size": 1024}))?;
//! cache.set_target_state(ServiceState::Running).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use value_store::{DedupValueStore, Observer, OffLabel, Offs, Subscription, ValueStore};

use crate::error::{HandlerError, Result, ServiceError};
use crate::event::ServiceEvent;
use crate::state::ServiceState;

/// Dependency wait applied when none is configured
pub const DEFAULT_DEPENDENCY_TIMEOUT: Duration = Duration::from_secs(30);

/// Async hook driving a service towards a target state
///
/// The handler receives a [`ServiceContext`] whose `set_state` is the
/// service's internal state setter; a handler that completes without
/// setting a state leaves the service where it was.
pub type TransitionHandler =
    Arc<dyn Fn(ServiceContext) -> BoxFuture<'static, std::result::Result<(), HandlerError>> + Send + Sync>;

/// Hook invoked by `configure` with the supplied configuration
pub type ConfigureFn = Box<dyn Fn(&Value) -> std::result::Result<(), HandlerError> + Send + Sync>;

// ============================================================================
// ServiceSpec
// ============================================================================

/// Builder describing a service's hooks before it is brought to life
pub struct ServiceSpec {
    type_name: String,
    configure: Option<ConfigureFn>,
    handlers: HashMap<ServiceState, TransitionHandler>,
    dependency_timeout: Duration,
}

impl ServiceSpec {
    /// Start describing a service of the given type name
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            configure: None,
            handlers: HashMap::new(),
            dependency_timeout: DEFAULT_DEPENDENCY_TIMEOUT,
        }
    }

    /// Install the configure hook
    ///
    /// A service with a configure hook must be configured before it can be
    /// targeted; a service without one is implicitly configured.
    pub fn on_configure(
        mut self,
        f: impl Fn(&Value) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Self {
        self.configure = Some(Box::new(f));
        self
    }

    /// Install the transition handler for a target state
    pub fn on_target<F, Fut>(mut self, target: ServiceState, f: F) -> Self
    where
        F: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        self.handlers
            .insert(target, Arc::new(move |ctx| f(ctx).boxed()));
        self
    }

    /// Shorthand for `on_target(ServiceState::Running, ..)`
    pub fn on_running<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        self.on_target(ServiceState::Running, f)
    }

    /// Shorthand for `on_target(ServiceState::Stopped, ..)`
    pub fn on_stopped<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        self.on_target(ServiceState::Stopped, f)
    }

    /// Bound the dependency wait performed before Running transitions
    pub fn dependency_timeout(mut self, timeout: Duration) -> Self {
        self.dependency_timeout = timeout;
        self
    }

    /// Bring the service to life, initially Stopped
    pub fn build(self) -> Arc<ServiceCore> {
        let configured = self.configure.is_none();
        Arc::new_cyclic(|weak| ServiceCore {
            type_name: self.type_name,
            custom_name: RwLock::new(None),
            own_state: DedupValueStore::with_value(ServiceState::Stopped),
            deps_available: DedupValueStore::with_value(true),
            target: Mutex::new(None),
            deps: Mutex::new(Vec::new()),
            handlers: Mutex::new(self.handlers),
            configure_fn: self.configure,
            configured: AtomicBool::new(configured),
            on_stop: Offs::new(),
            events: ValueStore::new(),
            dependency_timeout: self.dependency_timeout,
            self_ref: weak.clone(),
        })
    }
}

// ============================================================================
// ServiceCore
// ============================================================================

struct DependencyLink {
    service: Arc<ServiceCore>,
}

/// A named, long-lived component with lifecycle state and dependencies
///
/// Always handled as `Arc<ServiceCore>`; the manager, dependants and
/// transition handlers all share the same instance.
pub struct ServiceCore {
    type_name: String,
    custom_name: RwLock<Option<String>>,
    own_state: DedupValueStore<ServiceState>,
    deps_available: DedupValueStore<bool>,
    target: Mutex<Option<ServiceState>>,
    deps: Mutex<Vec<DependencyLink>>,
    handlers: Mutex<HashMap<ServiceState, TransitionHandler>>,
    configure_fn: Option<ConfigureFn>,
    configured: AtomicBool,
    /// Cleanups drained right before Stopped is published.
    on_stop: Offs,
    events: ValueStore<ServiceEvent>,
    dependency_timeout: Duration,
    self_ref: Weak<ServiceCore>,
}

impl std::fmt::Debug for ServiceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCore")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("dependency_count", &self.deps.lock().len())
            .finish()
    }
}

impl ServiceCore {
    // ========================================================================
    // Identity
    // ========================================================================

    /// Reported name: the custom prefix, if any, followed by the type name
    pub fn name(&self) -> String {
        match &*self.custom_name.read() {
            Some(custom) => format!("{}{}", custom, self.type_name),
            None => self.type_name.clone(),
        }
    }

    /// Set a display prefix for this instance
    pub fn set_service_name(&self, name: impl Into<String>) {
        *self.custom_name.write() = Some(name.into());
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Apply a configuration; only permitted while Stopped
    pub fn configure(&self, config: &Value) -> Result<()> {
        let own = self.own_state();
        if own != ServiceState::Stopped {
            return Err(ServiceError::InvalidState {
                service: self.name(),
                expected: "stopped",
                actual: own,
            });
        }
        if let Some(configure) = &self.configure_fn {
            configure(config).map_err(|source| ServiceError::ConfigurationFailed {
                service: self.name(),
                source,
            })?;
        }
        self.configured.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Whether `configure` ran (or no configure hook exists)
    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    // ========================================================================
    // State
    // ========================================================================

    /// The externally observed state
    ///
    /// Equals the service's own state, except that a Running service whose
    /// dependencies are not all Running reports `Unavailable`.
    pub fn state(&self) -> ServiceState {
        let own = self.own_state();
        if own == ServiceState::Running && self.deps_available.get() == Some(false) {
            ServiceState::Unavailable
        } else {
            own
        }
    }

    /// The observed state's canonical name
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    /// The service's own state, ignoring dependency availability
    pub fn own_state(&self) -> ServiceState {
        self.own_state.get().unwrap_or(ServiceState::Stopped)
    }

    /// Set the service's own state
    ///
    /// A transition to Stopped first drains the stop registry, so cleanups
    /// run strictly before the Stopped state is published.
    pub fn set_state(&self, state: ServiceState) {
        if state == ServiceState::Stopped {
            self.on_stop.unsubscribe_all();
        }
        self.own_state.set(state);
    }

    /// Set the service's own state from its string alias
    pub fn set_state_named(&self, state: &str) -> Result<()> {
        self.set_state(state.parse()?);
        Ok(())
    }

    /// Subscribe to the observed (merged) state
    ///
    /// The observer fires only when the merged state actually changes from
    /// the previously delivered one, regardless of which underlying store
    /// emitted. With `call_on_registration` an initial merged emission is
    /// delivered inside this call.
    pub fn subscribe_to_state(
        &self,
        observer: Arc<dyn Observer<ServiceState>>,
        call_on_registration: bool,
    ) -> Subscription {
        let initial = self.state();
        let previous = Arc::new(Mutex::new(initial));
        let weak = self.self_ref.clone();

        let on_change = Arc::clone(&observer);
        let emit = Arc::new(move || {
            let Some(service) = weak.upgrade() else {
                return;
            };
            let merged = service.state();
            let mut prev = previous.lock();
            if *prev != merged {
                *prev = merged;
                drop(prev);
                on_change.notify(&merged);
            }
        });

        let on_own = Arc::clone(&emit);
        let own_sub = self.own_state.subscribe_fn(move |_| on_own(), false);
        let on_deps = Arc::clone(&emit);
        let deps_sub = self.deps_available.subscribe_fn(move |_| on_deps(), false);

        if call_on_registration {
            observer.notify(&initial);
        }

        Subscription::merge(vec![own_sub, deps_sub])
    }

    /// Subscribe a closure to the observed state
    pub fn subscribe_to_state_fn(
        &self,
        f: impl Fn(&ServiceState) + Send + Sync + 'static,
        call_on_registration: bool,
    ) -> Subscription {
        self.subscribe_to_state(Arc::new(f), call_on_registration)
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// Depend on another service
    ///
    /// Subscribes to the dependency's observed state (with an immediate
    /// recomputation) and folds it into the all-dependencies-available
    /// store. The subscription is parked in the stop registry; stopping
    /// this service detaches it, and the next Running target re-wires it.
    pub fn add_dependency(&self, dependency: Arc<ServiceCore>) -> Result<()> {
        let dep_name = dependency.name();
        {
            let deps = self.deps.lock();
            if deps.iter().any(|link| link.service.name() == dep_name) {
                return Err(ServiceError::DuplicateDependency {
                    service: self.name(),
                    dependency: dep_name,
                });
            }
        }
        self.wire_dependency(&dependency)?;
        self.deps.lock().push(DependencyLink {
            service: dependency,
        });
        self.recompute_availability();
        Ok(())
    }

    /// Names of the registered dependencies, in registration order
    pub fn dependency_names(&self) -> Vec<String> {
        self.deps
            .lock()
            .iter()
            .map(|link| link.service.name())
            .collect()
    }

    fn wire_dependency(&self, dependency: &Arc<ServiceCore>) -> Result<()> {
        let label = format!("dependency:{}", dependency.name());
        if self.on_stop.contains(&OffLabel::Named(label.clone())) {
            return Ok(());
        }

        let weak = self.self_ref.clone();
        let sub = dependency.subscribe_to_state_fn(
            move |_state| {
                if let Some(service) = weak.upgrade() {
                    service.recompute_availability();
                }
            },
            true,
        );
        self.on_stop.register_subscription(Some(label), sub)?;
        Ok(())
    }

    /// Re-subscribe any dependency whose stop-registry entry was drained
    fn ensure_dependency_wiring(&self) -> Result<()> {
        let dependencies: Vec<Arc<ServiceCore>> = self
            .deps
            .lock()
            .iter()
            .map(|link| Arc::clone(&link.service))
            .collect();
        for dependency in dependencies {
            self.wire_dependency(&dependency)?;
        }
        Ok(())
    }

    fn recompute_availability(&self) {
        let all_running = self
            .deps
            .lock()
            .iter()
            .all(|link| link.service.state() == ServiceState::Running);
        self.deps_available.set(all_running);
    }

    async fn wait_for_dependencies(&self) -> Result<()> {
        let dependencies: Vec<Arc<ServiceCore>> = self
            .deps
            .lock()
            .iter()
            .map(|link| Arc::clone(&link.service))
            .collect();
        if dependencies.is_empty() {
            return Ok(());
        }

        for dependency in &dependencies {
            if dependency.state() == ServiceState::Error {
                return Err(ServiceError::DependencyFailed {
                    service: self.name(),
                    dependency: dependency.name(),
                });
            }
        }

        self.recompute_availability();
        if self.deps_available.get() == Some(true) {
            return Ok(());
        }

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let tx = Mutex::new(Some(tx));
        let sub = self.deps_available.subscribe_fn(
            move |ready: &bool| {
                if *ready {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(());
                    }
                }
            },
            false,
        );

        let outcome = tokio::time::timeout(self.dependency_timeout, rx).await;
        sub.unsubscribe();

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) | Err(_) => {
                let waiting: Vec<String> = dependencies
                    .iter()
                    .filter(|d| d.state() != ServiceState::Running)
                    .map(|d| d.name())
                    .collect();
                warn!(
                    service = %self.name(),
                    not_available = ?waiting,
                    "timed out waiting for dependencies"
                );
                Err(ServiceError::DependencyTimeout {
                    service: self.name(),
                    waiting,
                })
            }
        }
    }

    // ========================================================================
    // Target transitions
    // ========================================================================

    /// Ask the service to reach `target`
    ///
    /// No-op when the own state already equals the target. A Running target
    /// first waits for all dependencies (bounded by the configured timeout),
    /// then runs the registered handler; a failing handler puts the service
    /// in Error and surfaces the failure with its cause. Without a handler
    /// the state is applied directly.
    pub async fn set_target_state(&self, target: ServiceState) -> Result<()> {
        if !target.is_target() {
            return Err(ServiceError::InvalidTarget(target));
        }
        if self.own_state() == target {
            return Ok(());
        }
        if !self.is_configured() {
            return Err(ServiceError::NotConfigured(self.name()));
        }

        *self.target.lock() = Some(target);
        debug!(service = %self.name(), %target, "target state set");

        if target == ServiceState::Running {
            self.ensure_dependency_wiring()?;
            self.wait_for_dependencies().await?;
        }

        let handler = self.handlers.lock().get(&target).cloned();
        match handler {
            Some(handler) => {
                let ctx = ServiceContext {
                    name: self.name(),
                    core: self.self_ref.clone(),
                };
                if let Err(source) = handler(ctx).await {
                    self.own_state.set(ServiceState::Error);
                    return Err(ServiceError::TransitionFailed {
                        service: self.name(),
                        target,
                        source,
                    });
                }
            }
            None => self.set_state(target),
        }
        Ok(())
    }

    /// The most recently requested target state
    pub fn target_state(&self) -> Option<ServiceState> {
        *self.target.lock()
    }

    /// Register a transition handler for a target after construction
    ///
    /// One handler per target; returns a handle that deregisters it.
    pub fn set_transition_handler<F, Fut>(
        &self,
        target: ServiceState,
        f: F,
    ) -> Result<Subscription>
    where
        F: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        {
            let mut handlers = self.handlers.lock();
            if handlers.contains_key(&target) {
                return Err(ServiceError::DuplicateHandler {
                    service: self.name(),
                    target,
                });
            }
            handlers.insert(target, Arc::new(move |ctx| f(ctx).boxed()));
        }

        let weak = self.self_ref.clone();
        Ok(Subscription::new(move || {
            if let Some(service) = weak.upgrade() {
                service.handlers.lock().remove(&target);
            }
        }))
    }

    // ========================================================================
    // Events and cleanup
    // ========================================================================

    /// Emit a message event
    pub fn emit_event(&self, message: impl Into<String>) {
        self.events.set(ServiceEvent::message(message));
    }

    /// Emit a structured event
    pub fn emit_event_payload(&self, payload: Value) {
        self.events.set(ServiceEvent::payload(payload));
    }

    /// The service's event store
    pub fn events(&self) -> &ValueStore<ServiceEvent> {
        &self.events
    }

    /// Registry of cleanups drained when the service stops
    pub fn stop_registry(&self) -> &Offs {
        &self.on_stop
    }

    // ========================================================================
    // Diagnostic guards
    // ========================================================================

    /// Fail unless the observed state is Running
    pub fn expect_running(&self) -> Result<()> {
        let actual = self.state();
        if actual != ServiceState::Running {
            return Err(ServiceError::InvalidState {
                service: self.name(),
                expected: "running",
                actual,
            });
        }
        Ok(())
    }

    /// Fail unless the observed state is Stopped
    pub fn expect_stopped(&self) -> Result<()> {
        let actual = self.state();
        if actual != ServiceState::Stopped {
            return Err(ServiceError::InvalidState {
                service: self.name(),
                expected: "stopped",
                actual,
            });
        }
        Ok(())
    }

    /// Fail unless the service is configured
    pub fn expect_configured(&self) -> Result<()> {
        if !self.is_configured() {
            return Err(ServiceError::NotConfigured(self.name()));
        }
        Ok(())
    }

    /// Fail unless all dependencies are available
    pub fn expect_available(&self) -> Result<()> {
        if self.deps_available.get() != Some(true) {
            return Err(ServiceError::InvalidState {
                service: self.name(),
                expected: "available",
                actual: self.state(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// ServiceContext
// ============================================================================

/// Handle passed into transition handlers
///
/// Holds the service weakly so a handler can outlive it without keeping it
/// alive.
#[derive(Clone)]
pub struct ServiceContext {
    name: String,
    core: Weak<ServiceCore>,
}

impl ServiceContext {
    /// The service behind this context
    pub fn service(&self) -> Result<Arc<ServiceCore>> {
        self.core
            .upgrade()
            .ok_or_else(|| ServiceError::ServiceDropped(self.name.clone()))
    }

    /// Set the service's own state
    pub fn set_state(&self, state: ServiceState) -> Result<()> {
        self.service()?.set_state(state);
        Ok(())
    }

    /// Set the service's own state from its string alias
    pub fn set_state_named(&self, state: &str) -> Result<()> {
        self.service()?.set_state_named(state)
    }

    /// Emit a message event from the service
    pub fn emit_event(&self, message: impl Into<String>) -> Result<()> {
        self.service()?.emit_event(message);
        Ok(())
    }

    /// Park a cleanup in the service's stop registry
    pub fn defer_until_stop(
        &self,
        label: Option<String>,
        cleanup: impl FnOnce() + Send + 'static,
    ) -> Result<OffLabel> {
        Ok(self.service()?.stop_registry().register(label, cleanup)?)
    }
}

//! Boot/shutdown orchestration over a named service registry
//!
//! The `ServiceManager` owns the services registered with it: names are
//! unique, registration order defines boot order, and shutdown walks the
//! registry in reverse. The manager is itself a service: booting targets
//! its own Running state, whose handler starts every `start_on_boot`
//! registration in order.
//!
//! There is no global instance: construct one manager and hand it to the
//! code that needs name-based lookup.
//!
//! # Example
//!
//! ```rust,ignore
//! use service_runtime::{Registration, ServiceManager, ServiceSpec};
//!
//! let manager = ServiceManager::new();
//!
//! manager.register(Registration::new(storage))?;
//! manager.register(
//!     Registration::new(api)
//!         .with_config(serde_json::json!({"port": 8080}))
//!         .depends_on("StorageService"),
//! )?;
//!
//! manager.boot().await?;
//! // ...
//! manager.shutdown().await?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{HandlerError, Result, ServiceError};
use crate::service::{ServiceCore, ServiceSpec};
use crate::state::ServiceState;

/// A dependency given either by registry name or by handle
pub enum DependencyRef {
    /// Resolved against the manager's registry at registration time
    Name(String),
    /// Used directly
    Service(Arc<ServiceCore>),
}

impl From<&str> for DependencyRef {
    fn from(name: &str) -> Self {
        DependencyRef::Name(name.to_string())
    }
}

impl From<String> for DependencyRef {
    fn from(name: String) -> Self {
        DependencyRef::Name(name)
    }
}

impl From<Arc<ServiceCore>> for DependencyRef {
    fn from(service: Arc<ServiceCore>) -> Self {
        DependencyRef::Service(service)
    }
}

/// What to register: a service plus its configuration and wiring
pub struct Registration {
    /// Registry name; the service's reported name when omitted
    pub name: Option<String>,
    /// The service itself
    pub service: Arc<ServiceCore>,
    /// Configuration applied during registration
    pub config: Value,
    /// Whether `boot` targets this service (shutdown stops it regardless)
    pub start_on_boot: bool,
    /// Dependencies wired during registration
    pub dependencies: Vec<DependencyRef>,
}

impl Registration {
    /// Register `service` with defaults: adopted name, null config,
    /// started on boot, no dependencies
    pub fn new(service: Arc<ServiceCore>) -> Self {
        Self {
            name: None,
            service,
            config: Value::Null,
            start_on_boot: true,
            dependencies: Vec::new(),
        }
    }

    /// Register under an explicit name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Configuration handed to the service's configure hook
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Exclude the service from the boot walk
    pub fn manual_start(mut self) -> Self {
        self.start_on_boot = false;
        self
    }

    /// Add a dependency by name or handle
    pub fn depends_on(mut self, dependency: impl Into<DependencyRef>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }
}

#[derive(Clone)]
struct RegisteredService {
    name: String,
    service: Arc<ServiceCore>,
    start_on_boot: bool,
}

/// Registry and lifecycle walker for a set of named services
pub struct ServiceManager {
    core: Arc<ServiceCore>,
    registry: Mutex<Vec<RegisteredService>>,
    by_name: Mutex<HashMap<String, Arc<ServiceCore>>>,
}

impl std::fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceManager")
            .field("state", &self.core.state())
            .field("service_count", &self.registry.lock().len())
            .finish()
    }
}

impl ServiceManager {
    /// Create a manager with an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<ServiceManager>| {
            let on_running = weak.clone();
            let on_stopped = weak.clone();

            let core = ServiceSpec::new("ServiceManager")
                .on_running(move |ctx| {
                    let weak = on_running.clone();
                    async move {
                        if let Some(manager) = weak.upgrade() {
                            manager
                                .start_registered()
                                .await
                                .map_err(|e| Box::new(e) as HandlerError)?;
                        }
                        ctx.set_state(ServiceState::Running)
                            .map_err(|e| Box::new(e) as HandlerError)?;
                        Ok(())
                    }
                })
                .on_stopped(move |ctx| {
                    let weak = on_stopped.clone();
                    async move {
                        if let Some(manager) = weak.upgrade() {
                            manager
                                .stop_registered()
                                .await
                                .map_err(|e| Box::new(e) as HandlerError)?;
                        }
                        ctx.set_state(ServiceState::Stopped)
                            .map_err(|e| Box::new(e) as HandlerError)?;
                        Ok(())
                    }
                })
                .build();

            Self {
                core,
                registry: Mutex::new(Vec::new()),
                by_name: Mutex::new(HashMap::new()),
            }
        })
    }

    /// Add a service to the registry
    ///
    /// Configures the service, wires its dependencies (names resolve
    /// against the registry) and records it in insertion order. Returns
    /// the adopted registry name.
    pub fn register(&self, registration: Registration) -> Result<String> {
        let Registration {
            name,
            service,
            config,
            start_on_boot,
            dependencies,
        } = registration;

        let name = name.unwrap_or_else(|| service.name());
        if self.by_name.lock().contains_key(&name) {
            return Err(ServiceError::AlreadyRegistered(name));
        }

        service.configure(&config)?;

        for dependency in dependencies {
            let resolved = match dependency {
                DependencyRef::Service(dep) => dep,
                DependencyRef::Name(dep_name) => self
                    .by_name
                    .lock()
                    .get(&dep_name)
                    .cloned()
                    .ok_or(ServiceError::NotFound(dep_name))?,
            };
            service.add_dependency(resolved)?;
        }

        info!(service = %name, start_on_boot, "service registered");
        self.by_name
            .lock()
            .insert(name.clone(), Arc::clone(&service));
        self.registry.lock().push(RegisteredService {
            name: name.clone(),
            service,
            start_on_boot,
        });
        Ok(name)
    }

    /// Boot: target Running on every `start_on_boot` service, in
    /// registration order
    ///
    /// A per-service failure aborts the walk; services already Running
    /// stay Running.
    pub async fn boot(&self) -> Result<()> {
        if !self.core.is_configured() {
            self.core.configure(&Value::Null)?;
        }
        self.core.set_target_state(ServiceState::Running).await
    }

    /// Shutdown: target Stopped on every service, in reverse registration
    /// order, regardless of `start_on_boot`
    pub async fn shutdown(&self) -> Result<()> {
        self.core.set_target_state(ServiceState::Stopped).await
    }

    /// Look up a registered service
    ///
    /// With `expect_running`, fails when the service's observed state is
    /// not Running.
    pub fn service(&self, name: &str, expect_running: bool) -> Result<Arc<ServiceCore>> {
        let service = self
            .by_name
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))?;
        if expect_running {
            service.expect_running()?;
        }
        Ok(service)
    }

    /// Target Running on one named service
    pub async fn start_service(&self, name: &str) -> Result<()> {
        self.service(name, false)?
            .set_target_state(ServiceState::Running)
            .await
    }

    /// Target Stopped on one named service
    pub async fn stop_service(&self, name: &str) -> Result<()> {
        self.service(name, false)?
            .set_target_state(ServiceState::Stopped)
            .await
    }

    /// Observed state per service, in registration order
    pub fn service_states(&self) -> Vec<(String, ServiceState)> {
        self.registry
            .lock()
            .iter()
            .map(|reg| (reg.name.clone(), reg.service.state()))
            .collect()
    }

    /// The manager's own observed state
    pub fn state(&self) -> ServiceState {
        self.core.state()
    }

    /// The manager's own service core
    pub fn core(&self) -> &Arc<ServiceCore> {
        &self.core
    }

    async fn start_registered(&self) -> Result<()> {
        let registrations: Vec<RegisteredService> = self.registry.lock().iter().cloned().collect();
        for reg in registrations {
            if !reg.start_on_boot {
                continue;
            }
            info!(service = %reg.name, "starting service");
            reg.service
                .set_target_state(ServiceState::Running)
                .await
                .map_err(|source| ServiceError::BootAborted {
                    service: reg.name.clone(),
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    async fn stop_registered(&self) -> Result<()> {
        let registrations: Vec<RegisteredService> = self.registry.lock().iter().cloned().collect();
        let mut first_failure = None;
        for reg in registrations.into_iter().rev() {
            info!(service = %reg.name, "stopping service");
            if let Err(err) = reg.service.set_target_state(ServiceState::Stopped).await {
                warn!(service = %reg.name, error = %err, "service failed to stop");
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn plain_service(name: &str) -> Arc<ServiceCore> {
        ServiceSpec::new(name).build()
    }

    #[tokio::test]
    async fn test_register_adopts_service_name() {
        let manager = ServiceManager::new();
        let name = manager
            .register(Registration::new(plain_service("MetricsService")))
            .unwrap();
        assert_eq!(name, "MetricsService");
        assert!(manager.service("MetricsService", false).is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let manager = ServiceManager::new();
        manager
            .register(Registration::new(plain_service("DbService")))
            .unwrap();

        let err = manager.register(Registration::new(plain_service("DbService")));
        assert!(matches!(err, Err(ServiceError::AlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn test_unknown_dependency_name_rejected() {
        let manager = ServiceManager::new();
        let err = manager.register(
            Registration::new(plain_service("ApiService")).depends_on("MissingService"),
        );
        assert!(matches!(err, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_register_applies_configuration() {
        let manager = ServiceManager::new();
        let seen = Arc::new(Mutex::new(None));

        let s = Arc::clone(&seen);
        let service = ServiceSpec::new("TunedService")
            .on_configure(move |cfg| {
                *s.lock() = Some(cfg.clone());
                Ok(())
            })
            .build();

        manager
            .register(Registration::new(service).with_config(json!({"level": 7})))
            .unwrap();
        assert_eq!(*seen.lock(), Some(json!({"level": 7})));
    }

    #[tokio::test]
    async fn test_boot_starts_in_order_and_shutdown_reverses() {
        let manager = ServiceManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["FirstService", "SecondService", "ThirdService"] {
            let service = plain_service(name);
            let o = Arc::clone(&order);
            let tag = name;
            let _sub = service.subscribe_to_state_fn(
                move |state| o.lock().push((tag, *state)),
                false,
            );
            manager.register(Registration::new(service)).unwrap();
        }

        manager.boot().await.unwrap();
        assert_eq!(manager.state(), ServiceState::Running);
        assert_eq!(
            *order.lock(),
            vec![
                ("FirstService", ServiceState::Running),
                ("SecondService", ServiceState::Running),
                ("ThirdService", ServiceState::Running),
            ]
        );

        order.lock().clear();
        manager.shutdown().await.unwrap();
        assert_eq!(manager.state(), ServiceState::Stopped);
        assert_eq!(
            *order.lock(),
            vec![
                ("ThirdService", ServiceState::Stopped),
                ("SecondService", ServiceState::Stopped),
                ("FirstService", ServiceState::Stopped),
            ]
        );
    }

    #[tokio::test]
    async fn test_manual_start_skipped_on_boot_but_stopped_on_shutdown() {
        let manager = ServiceManager::new();
        manager
            .register(Registration::new(plain_service("AlwaysService")))
            .unwrap();
        manager
            .register(Registration::new(plain_service("LazyService")).manual_start())
            .unwrap();

        manager.boot().await.unwrap();
        assert_eq!(
            manager.service_states(),
            vec![
                ("AlwaysService".to_string(), ServiceState::Running),
                ("LazyService".to_string(), ServiceState::Stopped),
            ]
        );

        manager.start_service("LazyService").await.unwrap();
        assert_eq!(
            manager.service("LazyService", true).unwrap().state(),
            ServiceState::Running
        );

        manager.shutdown().await.unwrap();
        assert_eq!(
            manager.service_states(),
            vec![
                ("AlwaysService".to_string(), ServiceState::Stopped),
                ("LazyService".to_string(), ServiceState::Stopped),
            ]
        );
    }

    #[tokio::test]
    async fn test_boot_aborts_on_failure_leaving_earlier_services_running() {
        let manager = ServiceManager::new();
        manager
            .register(Registration::new(plain_service("GoodService")))
            .unwrap();

        let failing = ServiceSpec::new("BadService")
            .on_running(|_ctx| async move { Err("refused to start".into()) })
            .build();
        manager.register(Registration::new(failing)).unwrap();

        manager
            .register(Registration::new(plain_service("NeverService")))
            .unwrap();

        let err = manager.boot().await.unwrap_err();
        // The boot failure names the failing service in its cause chain.
        let chain = format!("{err}");
        assert!(chain.contains("ServiceManager"), "outer error: {chain}");

        assert_eq!(
            manager.service_states(),
            vec![
                ("GoodService".to_string(), ServiceState::Running),
                ("BadService".to_string(), ServiceState::Error),
                ("NeverService".to_string(), ServiceState::Stopped),
            ]
        );
    }

    #[tokio::test]
    async fn test_expect_running_lookup() {
        let manager = ServiceManager::new();
        manager
            .register(Registration::new(plain_service("IdleService")))
            .unwrap();

        assert!(manager.service("IdleService", false).is_ok());
        let err = manager.service("IdleService", true);
        assert!(matches!(err, Err(ServiceError::InvalidState { .. })));

        let err = manager.service("GhostService", false);
        assert!(matches!(err, Err(ServiceError::NotFound(_))));
    }
}

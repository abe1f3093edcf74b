//! End-to-end service lifecycle scenarios

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use keel_sdk::{Registration, ServiceError, ServiceManager, ServiceSpec, ServiceState};

#[tokio::test]
async fn single_service_runs_and_drains_cleanups_on_stop() {
    let cleanups = Arc::new(AtomicUsize::new(0));

    let service = ServiceSpec::new("AlphaService")
        .on_running(|ctx| async move {
            ctx.set_state(ServiceState::Running)?;
            Ok(())
        })
        .build();

    let c = Arc::clone(&cleanups);
    service
        .stop_registry()
        .register(Some("release-port".to_string()), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    service.set_target_state(ServiceState::Running).await.unwrap();
    assert_eq!(service.state(), ServiceState::Running);

    service.set_target_state(ServiceState::Stopped).await.unwrap();
    assert_eq!(service.state(), ServiceState::Stopped);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);

    // Stopping again re-runs nothing: the registry was drained.
    service.set_state(ServiceState::Stopped);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn boot_order_availability_masking_and_reverse_shutdown() {
    let manager = ServiceManager::new();
    let log: Arc<Mutex<Vec<(&'static str, ServiceState)>>> = Arc::new(Mutex::new(Vec::new()));

    let alpha = ServiceSpec::new("AlphaService").build();
    let beta = ServiceSpec::new("BetaService").build();

    for (tag, service) in [("alpha", &alpha), ("beta", &beta)] {
        let log = Arc::clone(&log);
        let _sub = service.subscribe_to_state_fn(move |state| log.lock().push((tag, *state)), false);
    }

    manager.register(Registration::new(Arc::clone(&alpha))).unwrap();
    manager
        .register(Registration::new(Arc::clone(&beta)).depends_on("AlphaService"))
        .unwrap();

    manager.boot().await.unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            ("alpha", ServiceState::Running),
            ("beta", ServiceState::Running),
        ],
        "registration order is boot order"
    );

    // A dependency outage masks the dependant as Unavailable without
    // touching its own state.
    alpha.set_state(ServiceState::Stopped);
    assert_eq!(beta.own_state(), ServiceState::Running);
    assert_eq!(beta.state(), ServiceState::Unavailable);

    alpha.set_target_state(ServiceState::Running).await.unwrap();
    assert_eq!(beta.state(), ServiceState::Running);

    log.lock().clear();
    manager.shutdown().await.unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            ("beta", ServiceState::Stopped),
            ("alpha", ServiceState::Stopped),
        ],
        "shutdown walks in reverse"
    );
}

#[tokio::test]
async fn boot_then_shutdown_leaves_no_residual_cleanups() {
    let manager = ServiceManager::new();

    let names = ["OneService", "TwoService", "ThreeService"];
    let mut services = Vec::new();
    let passes: Arc<Mutex<Vec<(&'static str, ServiceState)>>> = Arc::new(Mutex::new(Vec::new()));

    for name in names {
        let service = ServiceSpec::new(name).build();
        let p = Arc::clone(&passes);
        let _sub = service.subscribe_to_state_fn(move |state| p.lock().push((name, *state)), false);
        services.push(Arc::clone(&service));
        manager.register(Registration::new(service)).unwrap();
    }

    manager.boot().await.unwrap();
    manager.shutdown().await.unwrap();

    for name in names {
        let seen: Vec<ServiceState> = passes
            .lock()
            .iter()
            .filter(|(tag, _)| *tag == name)
            .map(|(_, state)| *state)
            .collect();
        assert_eq!(
            seen,
            vec![ServiceState::Running, ServiceState::Stopped],
            "{name} passes through Stopped -> Running -> Stopped"
        );
    }

    for service in &services {
        assert!(
            service.stop_registry().is_empty(),
            "stop registries are drained after shutdown"
        );
    }
}

#[tokio::test]
async fn dependency_wait_timeout_enumerates_missing_services() {
    let delta = ServiceSpec::new("DeltaService").build();

    let gamma = ServiceSpec::new("GammaService")
        .dependency_timeout(Duration::from_millis(100))
        .build();
    gamma.add_dependency(Arc::clone(&delta)).unwrap();

    // DeltaService never reaches Running.
    let err = gamma.set_target_state(ServiceState::Running).await.unwrap_err();
    match err {
        ServiceError::DependencyTimeout { service, waiting } => {
            assert_eq!(service, "GammaService");
            assert_eq!(waiting, vec!["DeltaService".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

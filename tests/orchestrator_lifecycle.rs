//! End-to-end lifecycle tests for the orchestrator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use service_orchestrator::{
    Error, LifecycleOrchestrator, ShutdownPhase, TaskPriority,
};

mod common;
use common::{event_log, events, fast_config, position, ScriptedService};

#[tokio::test]
async fn startup_and_shutdown_follow_dependency_order() {
    let log = event_log();
    let orch = LifecycleOrchestrator::new(fast_config());

    orch.register_service(Arc::new(ScriptedService::new("b", log.clone())), &["a"]);
    orch.register_service(Arc::new(ScriptedService::new("c", log.clone())), &["a"]);
    orch.register_service(Arc::new(ScriptedService::new("a", log.clone())), &[]);

    let report = orch.startup().await.unwrap();
    assert_eq!(report.order, vec!["a", "b", "c"]);
    assert_eq!(report.durations.len(), 3);

    let started = events(&log);
    assert!(position(&started, "a:start") < position(&started, "b:start"));
    assert!(position(&started, "b:start") < position(&started, "c:start"));

    let shutdown = orch.shutdown("SIGTERM").await;
    assert_eq!(shutdown.reason, "SIGTERM");
    assert_eq!(shutdown.completed_phases.len(), ShutdownPhase::ALL.len());
    assert!(shutdown.errors.is_empty());
    assert_eq!(shutdown.cleaned_resources, 3);

    // Dependents clean up strictly before their dependency.
    let all = events(&log);
    assert!(position(&all, "b:cleanup") < position(&all, "a:cleanup"));
    assert!(position(&all, "c:cleanup") < position(&all, "a:cleanup"));
}

#[tokio::test]
async fn concurrent_shutdowns_share_one_phase_sequence() {
    let log = event_log();
    let orch = LifecycleOrchestrator::new(fast_config());
    orch.register_service(Arc::new(ScriptedService::new("svc", log.clone())), &[]);
    orch.startup().await.unwrap();

    let first = orch.clone();
    let second = orch.clone();
    let (r1, r2) = tokio::join!(first.shutdown("SIGTERM"), second.shutdown("SIGINT"));

    // One run, one reason, one report for both callers.
    assert_eq!(r1.reason, r2.reason);
    assert_eq!(r1.elapsed, r2.elapsed);
    assert_eq!(
        events(&log).iter().filter(|e| *e == "svc:cleanup").count(),
        1
    );

    // A third call after completion still returns the same report.
    let r3 = orch.shutdown("again").await;
    assert_eq!(r3.reason, r1.reason);
}

#[tokio::test]
async fn slow_phase_handler_records_timeout_but_shutdown_finishes() {
    let orch = LifecycleOrchestrator::new(fast_config());

    orch.register_phase_handler(ShutdownPhase::DrainRequests, "slow-drain", || async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    });
    orch.register_phase_handler(ShutdownPhase::StopAccepting, "close-listener", || async {
        Ok(())
    });

    let report = orch.shutdown("SIGTERM").await;

    assert!(report
        .errors
        .iter()
        .any(|e| e.phase == ShutdownPhase::DrainRequests));
    assert!(!report
        .completed_phases
        .contains(&ShutdownPhase::DrainRequests));
    assert!(report.completed_phases.contains(&ShutdownPhase::Finalize));
    // The missed deadline stops the phase, not the shutdown.
    assert_eq!(report.completed_phases.len(), ShutdownPhase::ALL.len() - 1);
}

#[tokio::test]
async fn cleanup_timeout_is_an_error_but_every_phase_completes() {
    let log = event_log();
    let orch = LifecycleOrchestrator::new(fast_config());

    orch.register_service(
        Arc::new(ScriptedService::new("stuck", log.clone()).with_cleanup_delay(Duration::from_secs(30))),
        &[],
    );
    orch.register_service(Arc::new(ScriptedService::new("quick", log.clone())), &[]);
    orch.startup().await.unwrap();

    let report = orch.shutdown("SIGTERM").await;

    assert_eq!(report.completed_phases.len(), ShutdownPhase::ALL.len());
    assert_eq!(report.cleaned_resources, 1);
    assert_eq!(report.failed_resources, 1);
    assert!(report
        .errors
        .iter()
        .any(|e| e.subject == "stuck" && e.phase == ShutdownPhase::CleanupResources));
    assert!(events(&log).contains(&"quick:cleanup".to_string()));
}

#[tokio::test]
async fn tracked_tasks_are_cancelled_by_priority() {
    let orch = LifecycleOrchestrator::new(fast_config());
    let stopped = Arc::new(AtomicUsize::new(0));

    for (name, priority) in [
        ("feed", TaskPriority::Low),
        ("stream", TaskPriority::Critical),
        ("sweeper", TaskPriority::Medium),
    ] {
        let stopped = stopped.clone();
        orch.spawn_task(name, priority, move |token| async move {
            token.cancelled().await;
            stopped.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(orch.tasks().len(), 3);

    let report = orch.shutdown("SIGTERM").await;
    assert_eq!(report.cancelled_tasks, 3);
    assert_eq!(stopped.load(Ordering::SeqCst), 3);
    assert!(orch.tasks().is_empty());
}

#[tokio::test]
async fn standalone_cleanup_handlers_follow_registered_ordering() {
    let log = event_log();
    let orch = LifecycleOrchestrator::new(fast_config());

    let l1 = log.clone();
    orch.register_cleanup_handler(
        "cache-dir",
        TaskPriority::Low,
        Duration::from_secs(1),
        move || {
            let log = l1.clone();
            async move {
                log.lock().unwrap().push("cache-dir".to_string());
                Ok(())
            }
        },
    );
    let l2 = log.clone();
    orch.register_cleanup_handler(
        "scratch",
        TaskPriority::Critical,
        Duration::from_secs(1),
        move || {
            let log = l2.clone();
            async move {
                log.lock().unwrap().push("scratch".to_string());
                Ok(())
            }
        },
    );
    // The cache directory lives on the scratch volume, so it goes first
    // regardless of handler priority.
    orch.register_dependency("cache-dir", &["scratch"]);

    let report = orch.shutdown("SIGTERM").await;

    assert_eq!(report.cleaned_resources, 2);
    assert_eq!(events(&log), vec!["cache-dir", "scratch"]);
}

#[tokio::test]
async fn health_status_aggregates_checks() {
    let log = event_log();
    let orch = LifecycleOrchestrator::new(fast_config());
    orch.register_service(Arc::new(ScriptedService::new("good", log.clone())), &[]);

    let status = orch.health_status().await;
    assert!(status.healthy);
    assert_eq!(status.details.get("good"), Some(&true));

    orch.register_health_check("queue-depth", || async { false });
    let status = orch.health_status().await;
    assert!(!status.healthy);
    assert_eq!(status.details.get("queue-depth"), Some(&false));
    assert_eq!(status.details.get("good"), Some(&true));
}

#[tokio::test]
async fn hung_health_check_reads_as_unhealthy() {
    let mut config = fast_config();
    config.health_check_timeout_secs = 1;
    let orch = LifecycleOrchestrator::new(config);

    orch.register_health_check("wedged", || async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        true
    });

    let status = orch.health_status().await;
    assert!(!status.healthy);
    assert_eq!(status.details.get("wedged"), Some(&false));
}

#[tokio::test]
async fn shutdown_signal_reaches_subscribers() {
    let orch = LifecycleOrchestrator::new(fast_config());
    let mut watcher = orch.subscribe();
    assert!(!orch.is_shutting_down());

    orch.shutdown("SIGTERM").await;

    assert!(orch.is_shutting_down());
    watcher.recv().await.unwrap();

    let progress = orch.progress().unwrap();
    assert_eq!(progress.phase, ShutdownPhase::Finalize);
}

#[tokio::test]
async fn cycle_in_dependencies_fails_startup() {
    let log = event_log();
    let orch = LifecycleOrchestrator::new(fast_config());
    orch.register_service(Arc::new(ScriptedService::new("a", log.clone())), &["b"]);
    orch.register_service(Arc::new(ScriptedService::new("b", log.clone())), &["a"]);

    match orch.startup().await {
        Err(Error::Cycle { node }) => assert!(node == "a" || node == "b"),
        other => panic!("expected cycle error, got {other:?}"),
    }
    assert!(events(&log).is_empty());
}

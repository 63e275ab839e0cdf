//! Load testing for the orchestrator's cancellation path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use service_orchestrator::{LifecycleOrchestrator, TaskPriority};

mod common;
use common::fast_config;

#[tokio::test(flavor = "multi_thread")]
async fn test_cancellation_under_load() {
    // 1. Setup: a few hundred tracked tasks spread across tiers
    let mut config = fast_config();
    config.shutdown.cancel_batch_size = 25;
    let orch = LifecycleOrchestrator::new(config);

    let total = 200;
    let stopped = Arc::new(AtomicUsize::new(0));
    let priorities = [
        TaskPriority::Critical,
        TaskPriority::High,
        TaskPriority::Medium,
        TaskPriority::Low,
    ];

    for i in 0..total {
        let stopped = stopped.clone();
        let priority = priorities[i % priorities.len()];
        orch.spawn_task(format!("worker-{i}"), priority, move |token| async move {
            token.cancelled().await;
            stopped.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(orch.tasks().len(), total);

    // 2. Run the shutdown and measure the cancellation pass
    let start = Instant::now();
    let report = orch.shutdown("SIGTERM").await;
    let duration = start.elapsed();

    // 3. Every task acknowledged, nothing timed out
    assert_eq!(report.cancelled_tasks, total);
    assert_eq!(stopped.load(Ordering::SeqCst), total);
    assert!(report.errors.is_empty());
    assert!(orch.tasks().is_empty());

    println!("\n--- Cancellation Load Results ---");
    println!("Tasks:          {}", total);
    println!("Batch size:     25");
    println!("Total Duration: {:?}", duration);
    println!("Cancelled:      {}", report.cancelled_tasks);
    println!("---------------------------------\n");

    // Cooperative tasks should drain far inside the tier budgets.
    assert!(duration < Duration::from_secs(10));
}

//! Priority-ordered, batched task cancellation.

use std::time::Instant;

use futures_util::future::join_all;

use crate::error::Error;
use crate::observability::metrics;
use crate::tasks::registry::{TaskPriority, TaskRegistry, TrackedTask};

/// Outcome of one `cancel_all` pass.
#[derive(Debug, Default)]
pub struct CancelSummary {
    /// Tasks that acknowledged cancellation.
    pub cancelled: usize,
    /// Tasks whose join failed (panicked work).
    pub failed: usize,
    /// Batch timeouts, in the order they occurred.
    pub errors: Vec<Error>,
}

impl TaskRegistry {
    /// Cancel every tracked task, tier by tier in priority order.
    ///
    /// Within a tier, tasks are cancelled in bounded batches under the
    /// tier's timeout; a timed-out batch is recorded and the pass moves on,
    /// so one hung task cannot block the whole tier. Best-effort, not
    /// all-or-nothing.
    pub async fn cancel_all(&self) -> CancelSummary {
        let mut summary = CancelSummary::default();

        for priority in TaskPriority::ALL {
            let mut tier = self.drain_tier(priority);
            if tier.is_empty() {
                continue;
            }
            tier.sort_by(|a, b| a.name.cmp(&b.name));

            tracing::info!(
                priority = %priority,
                count = tier.len(),
                "Cancelling task tier"
            );
            let tier_timeout = self.tier_timeout(priority);

            while !tier.is_empty() {
                let take = tier.len().min(self.batch_size());
                let batch: Vec<TrackedTask> = tier.drain(..take).collect();
                let count = batch.len();
                let cancels = batch.into_iter().map(|task| self.cancel_one(task));

                match tokio::time::timeout(tier_timeout, join_all(cancels)).await {
                    Ok(results) => {
                        for acknowledged in results {
                            if acknowledged {
                                summary.cancelled += 1;
                            } else {
                                summary.failed += 1;
                            }
                        }
                    }
                    Err(_) => {
                        // Tokens were already cancelled when the batch started;
                        // the stragglers are detached, not aborted.
                        tracing::error!(
                            priority = %priority,
                            count,
                            timeout = ?tier_timeout,
                            "Cancellation batch timed out"
                        );
                        metrics::record_cancel_batch_timeout(priority);
                        summary.errors.push(Error::CancelBatchTimeout { priority, count });
                    }
                }
            }
        }

        summary
    }

    /// Cancel one task: signal its token, await the join handle as the
    /// acknowledgment, and feed the observed elapsed time to the estimator.
    async fn cancel_one(&self, task: TrackedTask) -> bool {
        let started = Instant::now();
        task.token.cancel();

        let acknowledged = match task.handle.await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    task = %task.name,
                    error = %e,
                    "Task join failed during cancellation"
                );
                false
            }
        };

        let elapsed = started.elapsed();
        self.estimator()
            .update(&format!("cancel:{}", task.name), elapsed);
        metrics::record_cancellation(
            task.priority,
            if acknowledged { "cancelled" } else { "join_error" },
            elapsed,
        );
        acknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::AdaptiveTimeoutEstimator;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn registry(tier_timeout: Duration, batch_size: usize) -> Arc<TaskRegistry> {
        let estimator = Arc::new(AdaptiveTimeoutEstimator::new(
            Duration::from_millis(100),
            Duration::from_secs(30),
            10,
        ));
        let timeouts: HashMap<TaskPriority, Duration> = TaskPriority::ALL
            .iter()
            .map(|p| (*p, tier_timeout))
            .collect();
        TaskRegistry::new(estimator, timeouts, batch_size)
    }

    #[tokio::test]
    async fn cancels_cooperative_tasks() {
        let registry = registry(Duration::from_secs(2), 10);
        let stopped = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let stopped = stopped.clone();
            registry.spawn(format!("worker-{i}"), TaskPriority::Medium, |token| async move {
                token.cancelled().await;
                stopped.fetch_add(1, Ordering::SeqCst);
            });
        }

        let summary = registry.cancel_all().await;
        assert_eq!(summary.cancelled, 5);
        assert!(summary.errors.is_empty());
        assert_eq!(stopped.load(Ordering::SeqCst), 5);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn hung_task_times_out_its_batch_but_not_the_pass() {
        let registry = registry(Duration::from_millis(100), 1);

        registry.spawn("deaf", TaskPriority::High, |_token| async {
            // Ignores its token entirely.
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        registry.spawn("polite", TaskPriority::Low, |token| async move {
            token.cancelled().await;
        });

        let summary = registry.cancel_all().await;
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(matches!(
            summary.errors[0],
            Error::CancelBatchTimeout {
                priority: TaskPriority::High,
                count: 1
            }
        ));
    }

    #[tokio::test]
    async fn tiers_are_processed_in_priority_order() {
        let registry = registry(Duration::from_secs(2), 10);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for (name, priority) in [
            ("low", TaskPriority::Low),
            ("critical", TaskPriority::Critical),
            ("medium", TaskPriority::Medium),
        ] {
            let order = order.clone();
            registry.spawn(name, priority, move |token| async move {
                token.cancelled().await;
                order.lock().unwrap().push(name);
            });
        }

        let summary = registry.cancel_all().await;
        assert_eq!(summary.cancelled, 3);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["critical", "medium", "low"]
        );
    }

    #[tokio::test]
    async fn cancellation_feeds_the_estimator() {
        let registry = registry(Duration::from_secs(2), 10);
        registry.spawn("stream", TaskPriority::Medium, |token| async move {
            token.cancelled().await;
        });

        registry.cancel_all().await;
        assert_eq!(registry.estimator().observed("cancel:stream"), 1);
    }
}

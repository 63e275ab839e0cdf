//! Registry of live cancellable work.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::resilience::AdaptiveTimeoutEstimator;

/// How urgently a task must be cancelled at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TaskPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl TaskPriority {
    /// Cancellation processing order.
    pub const ALL: [TaskPriority; 4] = [
        TaskPriority::Critical,
        TaskPriority::High,
        TaskPriority::Medium,
        TaskPriority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Critical => "CRITICAL",
            TaskPriority::High => "HIGH",
            TaskPriority::Medium => "MEDIUM",
            TaskPriority::Low => "LOW",
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

pub(crate) struct TrackedTask {
    pub name: String,
    pub priority: TaskPriority,
    pub token: CancellationToken,
    pub handle: JoinHandle<()>,
}

/// Tracks live cancellable work by priority tier.
///
/// Tasks are exclusively owned here: they are removed on natural completion,
/// on `unregister`, or when the canceller drains their tier. A removed task
/// is never re-added.
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, TrackedTask>>,
    estimator: Arc<AdaptiveTimeoutEstimator>,
    tier_timeouts: HashMap<TaskPriority, Duration>,
    batch_size: usize,
    /// Handle back to this registry for task self-removal.
    weak: Weak<TaskRegistry>,
}

impl TaskRegistry {
    pub fn new(
        estimator: Arc<AdaptiveTimeoutEstimator>,
        tier_timeouts: HashMap<TaskPriority, Duration>,
        batch_size: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            tasks: Mutex::new(HashMap::new()),
            estimator,
            tier_timeouts,
            batch_size: batch_size.max(1),
            weak: weak.clone(),
        })
    }

    /// Spawn `f(token)` on the runtime and track it under `name`.
    ///
    /// The token is the cancellation signal: the work is expected to watch it
    /// and return promptly once cancelled.
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, priority: TaskPriority, f: F) -> TaskId
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let id = TaskId(Uuid::new_v4());
        let token = CancellationToken::new();
        let registry = self.weak.clone();
        let fut = f(token.clone());
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            fut.await;
            if let Some(registry) = registry.upgrade() {
                registry.remove_completed(id);
            }
            tracing::trace!(task = %task_name, "Tracked task finished");
        });

        self.tasks
            .lock()
            .expect("task registry mutex poisoned")
            .insert(
                id,
                TrackedTask {
                    name,
                    priority,
                    token,
                    handle,
                },
            );
        id
    }

    /// Stop tracking a task without cancelling it.
    pub fn unregister(&self, id: TaskId) -> bool {
        self.tasks
            .lock()
            .expect("task registry mutex poisoned")
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().expect("task registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live tasks in one priority tier.
    pub fn count(&self, priority: TaskPriority) -> usize {
        self.tasks
            .lock()
            .expect("task registry mutex poisoned")
            .values()
            .filter(|t| t.priority == priority)
            .count()
    }

    pub(crate) fn estimator(&self) -> &AdaptiveTimeoutEstimator {
        &self.estimator
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub(crate) fn tier_timeout(&self, priority: TaskPriority) -> Duration {
        self.tier_timeouts
            .get(&priority)
            .copied()
            .unwrap_or(Duration::from_secs(10))
    }

    /// Remove and return every task in one tier.
    pub(crate) fn drain_tier(&self, priority: TaskPriority) -> Vec<TrackedTask> {
        let mut tasks = self.tasks.lock().expect("task registry mutex poisoned");
        let ids: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, t)| t.priority == priority)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().filter_map(|id| tasks.remove(&id)).collect()
    }

    fn remove_completed(&self, id: TaskId) {
        self.tasks
            .lock()
            .expect("task registry mutex poisoned")
            .remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<TaskRegistry> {
        let estimator = Arc::new(AdaptiveTimeoutEstimator::new(
            Duration::from_millis(100),
            Duration::from_secs(30),
            10,
        ));
        let timeouts = TaskPriority::ALL
            .iter()
            .map(|p| (*p, Duration::from_secs(1)))
            .collect();
        TaskRegistry::new(estimator, timeouts, 10)
    }

    #[tokio::test]
    async fn completed_tasks_unregister_themselves() {
        let registry = registry();
        registry.spawn("short", TaskPriority::Low, |_token| async {});
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unregister_stops_tracking() {
        let registry = registry();
        let id = registry.spawn("long", TaskPriority::High, |token| async move {
            token.cancelled().await;
        });
        assert_eq!(registry.count(TaskPriority::High), 1);
        assert!(registry.unregister(id));
        assert!(registry.is_empty());
        assert!(!registry.unregister(id));
    }

    #[tokio::test]
    async fn drain_tier_only_takes_matching_priority() {
        let registry = registry();
        registry.spawn("a", TaskPriority::High, |token| async move {
            token.cancelled().await;
        });
        registry.spawn("b", TaskPriority::Low, |token| async move {
            token.cancelled().await;
        });

        let drained = registry.drain_tier(TaskPriority::High);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].name, "a");
        assert_eq!(registry.len(), 1);

        for task in drained {
            task.token.cancel();
        }
    }
}

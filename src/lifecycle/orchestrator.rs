//! Root lifecycle orchestrator.
//!
//! # Responsibilities
//! - Own the dependency graph, task registry, lock manager, state machine,
//!   circuit breakers, and timeout estimator as one explicitly-constructed
//!   unit (no process-wide singletons)
//! - Start registered services in dependency order
//! - Drive the six-phase graceful shutdown exactly once

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use futures_util::future::{join_all, BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::error::{BoxError, Error};
use crate::graph::DependencyGraph;
use crate::lifecycle::phases::{
    HealthStatus, ShutdownContext, ShutdownPhase, ShutdownProgress, ShutdownReport, StartupReport,
};
use crate::lifecycle::service::ServiceHandle;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_linear_backoff;
use crate::resilience::{AdaptiveTimeoutEstimator, CallPolicy, CircuitBreaker};
use crate::resources::{LockStat, ResourceLockManager, ResourceState, ResourceStateMachine};
use crate::tasks::{TaskId, TaskPriority, TaskRegistry};

type HandlerFuture = BoxFuture<'static, Result<(), BoxError>>;
type HandlerFn = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;
type HealthCheckFn = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;
type SharedShutdown = Shared<BoxFuture<'static, ShutdownReport>>;

struct CleanupHandler {
    name: String,
    priority: TaskPriority,
    timeout: Duration,
    run: HandlerFn,
}

struct PhaseHandler {
    name: String,
    run: HandlerFn,
}

/// Owns the orchestration state and exposes the registration and control
/// APIs. One instance per process lifecycle; collaborators hold it in an
/// `Arc`.
pub struct LifecycleOrchestrator {
    config: OrchestratorConfig,
    graph: Mutex<DependencyGraph>,
    services: Mutex<BTreeMap<String, Arc<dyn ServiceHandle>>>,
    breakers: Mutex<BTreeMap<String, Arc<CircuitBreaker>>>,
    cleanup_handlers: Mutex<BTreeMap<String, Arc<CleanupHandler>>>,
    phase_handlers: Mutex<HashMap<ShutdownPhase, Vec<PhaseHandler>>>,
    health_checks: Mutex<BTreeMap<String, HealthCheckFn>>,
    tasks: Arc<TaskRegistry>,
    locks: Arc<ResourceLockManager>,
    states: Arc<ResourceStateMachine>,
    estimator: Arc<AdaptiveTimeoutEstimator>,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: AtomicBool,
    progress: Mutex<Option<ShutdownProgress>>,
    /// The one shutdown run, shared by every caller once it exists.
    shutdown_run: Mutex<Option<SharedShutdown>>,
    /// Handle back to this orchestrator so the run can be spawned.
    weak: Weak<LifecycleOrchestrator>,
}

impl LifecycleOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Arc<Self> {
        let estimator = Arc::new(AdaptiveTimeoutEstimator::new(
            Duration::from_millis(config.adaptive.min_ms),
            Duration::from_secs(config.adaptive.max_secs),
            config.adaptive.history_size,
        ));
        let tasks = TaskRegistry::new(
            estimator.clone(),
            config.shutdown.cancellation.tier_timeouts(),
            config.shutdown.cancel_batch_size,
        );
        let locks = Arc::new(ResourceLockManager::new(Duration::from_millis(
            config.locks.check_interval_ms,
        )));
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new_cyclic(|weak| Self {
            config,
            graph: Mutex::new(DependencyGraph::new()),
            services: Mutex::new(BTreeMap::new()),
            breakers: Mutex::new(BTreeMap::new()),
            cleanup_handlers: Mutex::new(BTreeMap::new()),
            phase_handlers: Mutex::new(HashMap::new()),
            health_checks: Mutex::new(BTreeMap::new()),
            tasks,
            locks,
            states: Arc::new(ResourceStateMachine::new()),
            estimator,
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
            progress: Mutex::new(None),
            shutdown_run: Mutex::new(None),
            weak: weak.clone(),
        })
    }

    // --- Registration API ---

    /// Register a service and its dependencies.
    ///
    /// The handle's `cleanup` is registered as this service's cleanup handler
    /// and its `health_check` joins the health surface.
    pub fn register_service(&self, handle: Arc<dyn ServiceHandle>, deps: &[&str]) {
        let name = handle.name().to_string();
        self.graph
            .lock()
            .expect("graph mutex poisoned")
            .register(&name, deps.iter().map(|d| d.to_string()));

        let cleanup_handle = handle.clone();
        let run: HandlerFn = Arc::new(move || {
            let handle = cleanup_handle.clone();
            async move { handle.cleanup().await }.boxed()
        });
        self.cleanup_handlers
            .lock()
            .expect("cleanup handler mutex poisoned")
            .insert(
                name.clone(),
                Arc::new(CleanupHandler {
                    name: name.clone(),
                    priority: TaskPriority::Medium,
                    timeout: Duration::from_secs(self.config.shutdown.default_timeout_secs),
                    run,
                }),
            );

        let health_handle = handle.clone();
        self.health_checks
            .lock()
            .expect("health check mutex poisoned")
            .insert(
                name.clone(),
                Arc::new(move || {
                    let handle = health_handle.clone();
                    async move { handle.health_check().await }.boxed()
                }),
            );

        tracing::info!(service = %name, deps = ?deps, "Service registered");
        self.services
            .lock()
            .expect("service mutex poisoned")
            .insert(name, handle);
    }

    /// Register cleanup ordering for a resource that is not a service.
    pub fn register_dependency(&self, resource: &str, deps: &[&str]) {
        self.graph
            .lock()
            .expect("graph mutex poisoned")
            .register(resource, deps.iter().map(|d| d.to_string()));
    }

    /// Register a weighted cleanup-ordering edge; heavier edges release last.
    pub fn register_weighted_dependency(&self, resource: &str, dep: &str, weight: u32) {
        self.graph
            .lock()
            .expect("graph mutex poisoned")
            .register_weighted(resource, dep, weight);
    }

    /// Register a standalone cleanup handler. Handlers whose name matches a
    /// graph node clean up in reverse dependency order; the rest run after
    /// the graph pass, grouped by `priority`.
    pub fn register_cleanup_handler<F, Fut>(
        &self,
        name: &str,
        priority: TaskPriority,
        timeout: Duration,
        f: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.cleanup_handlers
            .lock()
            .expect("cleanup handler mutex poisoned")
            .insert(
                name.to_string(),
                Arc::new(CleanupHandler {
                    name: name.to_string(),
                    priority,
                    timeout,
                    run: Arc::new(move || f().boxed()),
                }),
            );
    }

    /// Register a handler to run during a specific shutdown phase. Handlers
    /// of one phase run concurrently under the phase deadline.
    pub fn register_phase_handler<F, Fut>(&self, phase: ShutdownPhase, name: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.phase_handlers
            .lock()
            .expect("phase handler mutex poisoned")
            .entry(phase)
            .or_default()
            .push(PhaseHandler {
                name: name.to_string(),
                run: Arc::new(move || f().boxed()),
            });
    }

    pub fn register_health_check<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.health_checks
            .lock()
            .expect("health check mutex poisoned")
            .insert(name.to_string(), Arc::new(move || f().boxed()));
    }

    /// Spawn tracked cancellable work; see [`TaskRegistry::spawn`].
    pub fn spawn_task<F, Fut>(&self, name: impl Into<String>, priority: TaskPriority, f: F) -> TaskId
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(name, priority, f)
    }

    // --- Component access ---

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn locks(&self) -> &Arc<ResourceLockManager> {
        &self.locks
    }

    pub fn states(&self) -> &Arc<ResourceStateMachine> {
        &self.states
    }

    pub fn estimator(&self) -> &Arc<AdaptiveTimeoutEstimator> {
        &self.estimator
    }

    pub fn lock_stats(&self) -> Vec<LockStat> {
        self.locks.lock_stats()
    }

    // --- Control API ---

    /// Start every registered service in dependency order.
    ///
    /// A dependency fully starts (retries included) before any dependent
    /// begins. The first service to exhaust its retries aborts startup;
    /// there is no partial success.
    pub async fn startup(&self) -> Result<StartupReport, Error> {
        let started = Instant::now();
        let order = self.graph.lock().expect("graph mutex poisoned").order()?;
        tracing::info!(services = order.len(), order = ?order, "Starting services in dependency order");

        let mut durations = Vec::new();
        for name in &order {
            let handle = self
                .services
                .lock()
                .expect("service mutex poisoned")
                .get(name)
                .cloned();
            let Some(handle) = handle else {
                tracing::debug!(node = %name, "Dependency-only node; nothing to start");
                continue;
            };

            let policy = CallPolicy::new(
                self.config.startup.max_retries,
                self.config.startup.base_delay_ms,
                self.config.startup.max_delay_ms,
            )
            .with_breaker(self.breaker_for(name));

            let key = format!("start:{name}");
            let timeout = self
                .estimator
                .timeout_for(&key)
                .max(Duration::from_secs(self.config.startup.default_timeout_secs));

            let result = policy
                .execute(name, timeout, || {
                    let handle = handle.clone();
                    async move { handle.start().await }
                })
                .await;

            match result {
                Ok(done) => {
                    self.estimator.update(&key, done.elapsed);
                    metrics::record_service_start(name, done.elapsed, done.attempts);
                    tracing::info!(
                        service = %name,
                        elapsed = ?done.elapsed,
                        attempts = done.attempts,
                        "Service started"
                    );
                    durations.push((name.clone(), done.elapsed));
                }
                Err(e) => {
                    let err = Error::ServiceInit {
                        service: name.clone(),
                        attempts: self.config.startup.max_retries,
                        message: e.to_string(),
                    };
                    tracing::error!(service = %name, error = %err, "Startup aborted");
                    metrics::record_startup_failure(name);
                    return Err(err);
                }
            }
        }

        tracing::info!(elapsed = ?started.elapsed(), "Startup complete");
        Ok(StartupReport {
            order,
            durations,
            elapsed: started.elapsed(),
        })
    }

    /// Run the graceful shutdown, or await the one already in flight.
    ///
    /// Idempotent: the phase sequence executes exactly once and every caller
    /// receives the same report. The walk is spawned on the runtime, so a
    /// caller that drops this future cannot cancel it; a shutdown, once
    /// begun, always reaches FINALIZE.
    pub async fn shutdown(&self, reason: &str) -> ShutdownReport {
        let run = {
            let mut slot = self
                .shutdown_run
                .lock()
                .expect("shutdown run mutex poisoned");
            match slot.as_ref() {
                Some(run) => run.clone(),
                None => {
                    let this = self
                        .weak
                        .upgrade()
                        .expect("orchestrator alive while borrowed");
                    let reason = reason.to_string();
                    let handle = tokio::spawn(async move { this.run_shutdown(reason).await });
                    let run: SharedShutdown =
                        async move { handle.await.expect("shutdown task panicked") }
                            .boxed()
                            .shared();
                    *slot = Some(run.clone());
                    run
                }
            }
        };
        run.await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Subscribe to the shutdown signal; fires when `shutdown()` begins.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Point-in-time progress of the in-flight shutdown, if any.
    pub fn progress(&self) -> Option<ShutdownProgress> {
        self.progress.lock().expect("progress mutex poisoned").clone()
    }

    /// Run every registered health check under a per-check timeout.
    pub async fn health_status(&self) -> HealthStatus {
        let checks: Vec<(String, HealthCheckFn)> = self
            .health_checks
            .lock()
            .expect("health check mutex poisoned")
            .iter()
            .map(|(name, f)| (name.clone(), f.clone()))
            .collect();

        let timeout = Duration::from_secs(self.config.health_check_timeout_secs);
        let probes = checks.into_iter().map(|(name, run)| async move {
            let healthy = match tokio::time::timeout(timeout, run()).await {
                Ok(healthy) => healthy,
                Err(_) => {
                    tracing::warn!(check = %name, "Health check timed out");
                    false
                }
            };
            (name, healthy)
        });

        let mut details = BTreeMap::new();
        for (name, healthy) in join_all(probes).await {
            details.insert(name, healthy);
        }
        let healthy = details.values().all(|h| *h);
        HealthStatus {
            healthy,
            message: if healthy {
                "all systems operational".to_string()
            } else {
                "some systems are degraded".to_string()
            },
            details,
        }
    }

    // --- Shutdown internals ---

    async fn run_shutdown(&self, reason: String) -> ShutdownReport {
        self.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
        tracing::info!(reason = %reason, "Initiating shutdown");

        let mut ctx = ShutdownContext::new(reason);

        for phase in ShutdownPhase::ALL {
            ctx.current = phase;
            self.update_progress(&ctx);

            let phase_started = Instant::now();
            tracing::info!(phase = %phase, "Entering shutdown phase");

            let deadline = self.config.shutdown.phase_timeout(phase);
            let completed = self.run_phase_handlers(phase, deadline, &mut ctx).await;

            match phase {
                ShutdownPhase::CancelTasks => {
                    let summary = self.tasks.cancel_all().await;
                    ctx.cancelled_tasks += summary.cancelled;
                    for error in summary.errors {
                        ctx.record(phase, "task-canceller", &error);
                    }
                }
                ShutdownPhase::CleanupResources => {
                    self.run_cleanup(&mut ctx).await;
                }
                _ => {}
            }

            if completed {
                ctx.completed.insert(phase);
            }
            metrics::record_phase(phase, phase_started.elapsed(), completed);
            self.update_progress(&ctx);
        }

        let report = ctx.into_report();
        metrics::record_shutdown(report.elapsed, report.errors.len());
        if let Ok(json) = serde_json::to_string(&report) {
            tracing::debug!(report = %json, "Shutdown report");
        }
        tracing::info!(
            reason = %report.reason,
            elapsed = ?report.elapsed,
            completed_phases = report.completed_phases.len(),
            errors = report.errors.len(),
            cancelled_tasks = report.cancelled_tasks,
            cleaned_resources = report.cleaned_resources,
            "Shutdown complete"
        );
        report
    }

    /// Run the registered handlers of one phase concurrently under the phase
    /// deadline. Returns whether they all finished in time.
    async fn run_phase_handlers(
        &self,
        phase: ShutdownPhase,
        deadline: Duration,
        ctx: &mut ShutdownContext,
    ) -> bool {
        let handlers: Vec<(String, HandlerFn)> = self
            .phase_handlers
            .lock()
            .expect("phase handler mutex poisoned")
            .get(&phase)
            .map(|hs| hs.iter().map(|h| (h.name.clone(), h.run.clone())).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            return true;
        }

        let runs = handlers
            .into_iter()
            .map(|(name, run)| async move { (name, run().await) });

        match tokio::time::timeout(deadline, join_all(runs)).await {
            Ok(results) => {
                for (name, result) in results {
                    if let Err(e) = result {
                        let err = Error::PhaseHandler {
                            name: name.clone(),
                            message: e.to_string(),
                        };
                        tracing::error!(phase = %phase, handler = %name, error = %err, "Phase handler failed");
                        ctx.record(phase, name, &err);
                    }
                }
                true
            }
            Err(_) => {
                let err = Error::PhaseTimeout {
                    phase,
                    elapsed: deadline,
                };
                tracing::error!(phase = %phase, timeout = ?deadline, "Phase handlers missed deadline");
                ctx.record(phase, phase.as_str(), &err);
                false
            }
        }
    }

    /// Cleanup pass: graph waves in reverse dependency order, then handlers
    /// outside the graph grouped by priority.
    async fn run_cleanup(&self, ctx: &mut ShutdownContext) {
        let mut remaining: BTreeMap<String, Arc<CleanupHandler>> = self
            .cleanup_handlers
            .lock()
            .expect("cleanup handler mutex poisoned")
            .clone();
        if remaining.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(
            self.config.shutdown.max_concurrent_cleanups.max(1),
        ));

        let waves = self.graph.lock().expect("graph mutex poisoned").cleanup_waves();
        match waves {
            Ok(waves) => {
                for wave in waves {
                    let batch: Vec<Arc<CleanupHandler>> = wave
                        .iter()
                        .filter_map(|resource| remaining.remove(resource))
                        .collect();
                    self.run_cleanup_batch(batch, &semaphore, ctx).await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Cleanup ordering unavailable; falling back to priority order");
                ctx.record(ShutdownPhase::CleanupResources, "dependency-graph", &e);
            }
        }

        for priority in TaskPriority::ALL {
            let batch: Vec<Arc<CleanupHandler>> = remaining
                .values()
                .filter(|h| h.priority == priority)
                .cloned()
                .collect();
            remaining.retain(|_, h| h.priority != priority);
            self.run_cleanup_batch(batch, &semaphore, ctx).await;
        }
    }

    async fn run_cleanup_batch(
        &self,
        batch: Vec<Arc<CleanupHandler>>,
        semaphore: &Arc<Semaphore>,
        ctx: &mut ShutdownContext,
    ) {
        if batch.is_empty() {
            return;
        }

        let runs = batch.into_iter().map(|handler| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let name = handler.name.clone();
                let result = self.cleanup_resource(&handler).await;
                (name, result)
            }
        });

        for (name, result) in join_all(runs).await {
            match result {
                Ok(()) => ctx.cleaned_resources += 1,
                Err(e) => {
                    ctx.failed_resources += 1;
                    ctx.record(ShutdownPhase::CleanupResources, name, &e);
                }
            }
        }
    }

    /// Clean up one resource: take its lock (best-effort), drive the state
    /// machine through CLEANING, and retry the handler with linear backoff.
    async fn cleanup_resource(&self, handler: &CleanupHandler) -> Result<(), Error> {
        let resource = handler.name.as_str();
        let holder = format!("cleanup:{resource}");
        let max_wait = Duration::from_secs(self.config.locks.max_wait_secs);

        let locked = match self.locks.acquire(resource, &holder, max_wait).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(resource, "Cleaning up without lock after contention timeout");
                false
            }
            Err(e) => {
                tracing::warn!(resource, error = %e, "Cleaning up without lock after deadlock break");
                false
            }
        };

        let result = self.drive_cleanup(handler).await;

        if locked {
            self.locks.release(resource, &holder);
        }
        result
    }

    async fn drive_cleanup(&self, handler: &CleanupHandler) -> Result<(), Error> {
        let resource = handler.name.as_str();
        if self.states.current(resource) == ResourceState::Cleaned {
            tracing::debug!(resource, "Resource already cleaned");
            return Ok(());
        }

        self.states.transition(resource, ResourceState::Cleaning)?;

        let key = format!("cleanup:{resource}");
        let max_retries = self.config.shutdown.max_retries.max(1);
        let mut last_message = String::new();

        for attempt in 1..=max_retries {
            let timeout = handler.timeout.max(self.estimator.timeout_for(&key));
            let started = Instant::now();
            let outcome = tokio::time::timeout(timeout, (handler.run)()).await;
            let elapsed = started.elapsed();

            match outcome {
                Ok(Ok(())) => {
                    self.estimator.update(&key, elapsed);
                    self.states.transition(resource, ResourceState::Cleaned)?;
                    metrics::record_cleanup(resource, "cleaned", elapsed);
                    tracing::info!(resource, elapsed = ?elapsed, attempt, "Resource cleaned up");
                    return Ok(());
                }
                Ok(Err(e)) => last_message = e.to_string(),
                Err(_) => last_message = format!("timed out after {timeout:?}"),
            }

            tracing::warn!(
                resource,
                attempt,
                max_retries,
                error = %last_message,
                "Cleanup attempt failed"
            );
            metrics::record_cleanup_retry(resource);
            let _ = self.states.transition(resource, ResourceState::Failed);

            if attempt < max_retries {
                let delay = calculate_linear_backoff(
                    attempt,
                    self.config.shutdown.retry_delay_ms,
                    self.config.shutdown.retry_delay_ms.saturating_mul(10),
                );
                tokio::time::sleep(delay).await;
                let _ = self.states.transition(resource, ResourceState::Cleaning);
            }
        }

        metrics::record_cleanup(resource, "failed", Duration::ZERO);
        Err(Error::ResourceCleanup {
            resource: resource.to_string(),
            attempts: max_retries,
            message: last_message,
        })
    }

    fn breaker_for(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("breaker mutex poisoned");
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    name,
                    self.config.circuit_breaker.failure_threshold,
                    Duration::from_secs(self.config.circuit_breaker.recovery_timeout_secs),
                    self.config.circuit_breaker.half_open_max_calls,
                ))
            })
            .clone()
    }

    fn update_progress(&self, ctx: &ShutdownContext) {
        *self.progress.lock().expect("progress mutex poisoned") = Some(ShutdownProgress {
            phase: ctx.current,
            completed_phases: ctx.completed.iter().copied().collect(),
            errors: ctx.errors.len(),
            elapsed: ctx.started.elapsed(),
        });
    }
}

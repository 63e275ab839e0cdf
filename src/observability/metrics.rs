//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define orchestrator metrics (startup/shutdown durations, cancellations,
//!   state transitions, circuit state, deadlocks, cleanup retries)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `orchestrator_service_start_seconds` (histogram): start latency by service
//! - `orchestrator_start_attempts_total` (counter): start attempts by service
//! - `orchestrator_startup_failures_total` (counter): aborted startups by service
//! - `orchestrator_phase_seconds` (histogram): phase duration by phase, outcome
//! - `orchestrator_cancellations_total` (counter): cancellations by priority, outcome
//! - `orchestrator_cancel_seconds` (histogram): per-task cancel latency by priority
//! - `orchestrator_cancel_batch_timeouts_total` (counter): batch timeouts by priority
//! - `orchestrator_state_transitions_total` (counter): by resource, from, to
//! - `orchestrator_state_seconds` (histogram): time in previous state
//! - `orchestrator_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `orchestrator_circuit_failures_total` (counter): failures by breaker
//! - `orchestrator_deadlocks_total` (counter): forced releases by resource
//! - `orchestrator_lock_contention_total` (counter): contended acquires
//! - `orchestrator_cleanup_seconds` (histogram): cleanup latency by resource, outcome
//! - `orchestrator_cleanup_retries_total` (counter): retries by resource
//! - `orchestrator_shutdown_seconds` (histogram): total shutdown duration
//!
//! # Design Decisions
//! - All recording goes through helpers here; call sites stay label-free
//! - Low-overhead updates via the `metrics` facade

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::lifecycle::ShutdownPhase;
use crate::resilience::CircuitState;
use crate::resources::ResourceState;
use crate::tasks::TaskPriority;

/// Install the Prometheus exporter on `addr`. Must run inside the runtime.
pub fn init_metrics(addr: SocketAddr) {
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::error!(error = %e, "Failed to install Prometheus exporter");
    } else {
        tracing::info!(address = %addr, "Metrics endpoint listening");
    }
}

pub fn record_service_start(service: &str, elapsed: Duration, attempts: u32) {
    histogram!(
        "orchestrator_service_start_seconds",
        "service" => service.to_string()
    )
    .record(elapsed.as_secs_f64());
    counter!(
        "orchestrator_start_attempts_total",
        "service" => service.to_string()
    )
    .increment(attempts as u64);
}

pub fn record_startup_failure(service: &str) {
    counter!(
        "orchestrator_startup_failures_total",
        "service" => service.to_string()
    )
    .increment(1);
}

pub fn record_phase(phase: ShutdownPhase, elapsed: Duration, completed: bool) {
    histogram!(
        "orchestrator_phase_seconds",
        "phase" => phase.as_str(),
        "outcome" => if completed { "completed" } else { "timed_out" }
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_cancellation(priority: TaskPriority, outcome: &'static str, elapsed: Duration) {
    counter!(
        "orchestrator_cancellations_total",
        "priority" => priority.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "orchestrator_cancel_seconds",
        "priority" => priority.as_str()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_cancel_batch_timeout(priority: TaskPriority) {
    counter!(
        "orchestrator_cancel_batch_timeouts_total",
        "priority" => priority.as_str()
    )
    .increment(1);
}

pub fn record_state_transition(
    resource: &str,
    from: ResourceState,
    to: ResourceState,
    held: Duration,
) {
    counter!(
        "orchestrator_state_transitions_total",
        "resource" => resource.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    histogram!(
        "orchestrator_state_seconds",
        "resource" => resource.to_string(),
        "state" => from.as_str()
    )
    .record(held.as_secs_f64());
}

pub fn record_circuit_state(name: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("orchestrator_circuit_state", "breaker" => name.to_string()).set(value);
}

pub fn record_circuit_failure(name: &str) {
    counter!(
        "orchestrator_circuit_failures_total",
        "breaker" => name.to_string()
    )
    .increment(1);
}

pub fn record_deadlock(resource: &str) {
    counter!(
        "orchestrator_deadlocks_total",
        "resource" => resource.to_string()
    )
    .increment(1);
}

pub fn record_lock_contention(resource: &str) {
    counter!(
        "orchestrator_lock_contention_total",
        "resource" => resource.to_string()
    )
    .increment(1);
}

pub fn record_cleanup(resource: &str, outcome: &'static str, elapsed: Duration) {
    histogram!(
        "orchestrator_cleanup_seconds",
        "resource" => resource.to_string(),
        "outcome" => outcome
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_cleanup_retry(resource: &str) {
    counter!(
        "orchestrator_cleanup_retries_total",
        "resource" => resource.to_string()
    )
    .increment(1);
}

pub fn record_shutdown(elapsed: Duration, errors: usize) {
    histogram!("orchestrator_shutdown_seconds").record(elapsed.as_secs_f64());
    counter!("orchestrator_shutdown_errors_total").increment(errors as u64);
}

//! Crate-wide error taxonomy.
//!
//! # Responsibilities
//! - One `Error` enum covering every orchestration failure mode
//! - Distinguish fatal startup errors from recorded shutdown errors
//!
//! # Design Decisions
//! - Startup errors are fatal and propagate with `?`
//! - Shutdown errors accumulate in the shutdown context, never abort it
//! - Collaborator-facing signatures use `BoxError` so handles stay narrow

use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::ShutdownPhase;
use crate::resources::ResourceState;
use crate::tasks::TaskPriority;

/// Error type returned by service handles and handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All orchestration errors.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The dependency graph is not acyclic. Fatal, detected before startup.
    #[error("dependency cycle detected at '{node}'")]
    Cycle { node: String },

    /// A service failed to start after all retries. Fatal, aborts startup.
    #[error("service '{service}' failed to start after {attempts} attempts: {message}")]
    ServiceInit {
        service: String,
        attempts: u32,
        message: String,
    },

    /// A call was rejected because its circuit breaker is open.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    /// A half-open probe was rejected because the probe budget is spent.
    #[error("circuit breaker '{name}' rejected call: half-open probe limit reached")]
    CircuitHalfOpenLimit { name: String },

    /// A lock-wait cycle was detected and broken. Retryable by the waiter.
    #[error("deadlock on '{resource}': lock held by '{victim}' was force-released")]
    Deadlock { resource: String, victim: String },

    /// Resource cleanup exhausted its retries. Recorded, non-fatal.
    #[error("cleanup of '{resource}' failed after {attempts} attempts: {message}")]
    ResourceCleanup {
        resource: String,
        attempts: u32,
        message: String,
    },

    /// Registered handlers for a shutdown phase missed the phase deadline.
    #[error("shutdown phase {phase} missed its deadline after {elapsed:?}")]
    PhaseTimeout {
        phase: ShutdownPhase,
        elapsed: Duration,
    },

    /// Illegal resource state transition. Fatal for that resource only.
    #[error("invalid transition for '{resource}': {from} -> {to}")]
    InvalidTransition {
        resource: String,
        from: ResourceState,
        to: ResourceState,
    },

    /// A cancellation batch missed its tier timeout. Recorded, non-fatal.
    #[error("timed out cancelling a batch of {count} {priority} tasks")]
    CancelBatchTimeout { priority: TaskPriority, count: usize },

    /// A registered phase handler returned an error. Recorded, non-fatal.
    #[error("phase handler '{name}' failed: {message}")]
    PhaseHandler { name: String, message: String },

    /// A wrapped collaborator call failed. Carries the collaborator's error
    /// text; timeouts surface here as elapsed-deadline errors.
    #[error("{message}")]
    Upstream { message: String },
}

impl Error {
    /// Whether the caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Deadlock { .. } | Error::CircuitHalfOpenLimit { .. })
    }
}

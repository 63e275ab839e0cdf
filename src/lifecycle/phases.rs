//! Shutdown phases, context, and the final report.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::Error;

/// Named stages of the shutdown process, walked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ShutdownPhase {
    Initialize,
    StopAccepting,
    DrainRequests,
    CancelTasks,
    CleanupResources,
    Finalize,
}

impl ShutdownPhase {
    /// Walk order. Every shutdown visits all six, timeouts included.
    pub const ALL: [ShutdownPhase; 6] = [
        ShutdownPhase::Initialize,
        ShutdownPhase::StopAccepting,
        ShutdownPhase::DrainRequests,
        ShutdownPhase::CancelTasks,
        ShutdownPhase::CleanupResources,
        ShutdownPhase::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownPhase::Initialize => "INITIALIZE",
            ShutdownPhase::StopAccepting => "STOP_ACCEPTING",
            ShutdownPhase::DrainRequests => "DRAIN_REQUESTS",
            ShutdownPhase::CancelTasks => "CANCEL_TASKS",
            ShutdownPhase::CleanupResources => "CLEANUP_RESOURCES",
            ShutdownPhase::Finalize => "FINALIZE",
        }
    }
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded shutdown error, annotated for the final report.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub phase: ShutdownPhase,
    /// Resource, task, or handler the error belongs to.
    pub subject: String,
    pub message: String,
    /// Elapsed shutdown time when the error was recorded.
    pub elapsed: Duration,
}

/// Mutable state of one in-flight shutdown. Created once per `shutdown()`
/// call and folded into the report at FINALIZE.
pub(crate) struct ShutdownContext {
    pub reason: String,
    pub started: Instant,
    pub current: ShutdownPhase,
    pub completed: BTreeSet<ShutdownPhase>,
    pub errors: Vec<ErrorRecord>,
    pub cancelled_tasks: usize,
    pub cleaned_resources: usize,
    pub failed_resources: usize,
}

impl ShutdownContext {
    pub fn new(reason: String) -> Self {
        Self {
            reason,
            started: Instant::now(),
            current: ShutdownPhase::Initialize,
            completed: BTreeSet::new(),
            errors: Vec::new(),
            cancelled_tasks: 0,
            cleaned_resources: 0,
            failed_resources: 0,
        }
    }

    pub fn record(&mut self, phase: ShutdownPhase, subject: impl Into<String>, error: &Error) {
        self.errors.push(ErrorRecord {
            phase,
            subject: subject.into(),
            message: error.to_string(),
            elapsed: self.started.elapsed(),
        });
    }

    pub fn into_report(self) -> ShutdownReport {
        ShutdownReport {
            reason: self.reason,
            elapsed: self.started.elapsed(),
            completed_phases: self.completed.into_iter().collect(),
            errors: self.errors,
            cancelled_tasks: self.cancelled_tasks,
            cleaned_resources: self.cleaned_resources,
            failed_resources: self.failed_resources,
        }
    }
}

/// Final shutdown report, returned to every `shutdown()` caller.
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    pub reason: String,
    pub elapsed: Duration,
    pub completed_phases: Vec<ShutdownPhase>,
    pub errors: Vec<ErrorRecord>,
    pub cancelled_tasks: usize,
    pub cleaned_resources: usize,
    pub failed_resources: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.completed_phases.len() == ShutdownPhase::ALL.len()
    }
}

/// Point-in-time view of an in-flight shutdown.
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownProgress {
    pub phase: ShutdownPhase,
    pub completed_phases: Vec<ShutdownPhase>,
    pub errors: usize,
    pub elapsed: Duration,
}

/// Aggregated result of all registered health checks.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
    /// Per-check result; a timed-out check reads as `false`.
    pub details: std::collections::BTreeMap<String, bool>,
}

/// Per-service startup durations, in start order.
#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    pub order: Vec<String>,
    pub durations: Vec<(String, Duration)>,
    pub elapsed: Duration,
}

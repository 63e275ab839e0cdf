//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! orchestrator. All types derive Serde traits for deserialization from
//! config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lifecycle::ShutdownPhase;
use crate::tasks::TaskPriority;

/// Root configuration for the lifecycle orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Service startup behavior (retries, backoff, default timeout).
    pub startup: StartupConfig,

    /// Shutdown behavior (phase timeouts, cancellation, cleanup).
    pub shutdown: ShutdownConfig,

    /// Adaptive timeout learning.
    pub adaptive: AdaptiveTimeoutConfig,

    /// Resource lock waits and deadlock checking.
    pub locks: LockConfig,

    /// Per-service circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Per-check timeout for the aggregated health surface, in seconds.
    pub health_check_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            startup: StartupConfig::default(),
            shutdown: ShutdownConfig::default(),
            adaptive: AdaptiveTimeoutConfig::default(),
            locks: LockConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            observability: ObservabilityConfig::default(),
            health_check_timeout_secs: 3,
        }
    }
}

/// Startup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Maximum start attempts per service.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Floor for the per-attempt start timeout in seconds. The adaptive
    /// estimator can raise it, never lower it below this.
    pub default_timeout_secs: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            default_timeout_secs: 10,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Concurrent resource cleanups within one wave.
    pub max_concurrent_cleanups: usize,

    /// Default cleanup handler timeout in seconds.
    pub default_timeout_secs: u64,

    /// Cleanup attempts per resource.
    pub max_retries: u32,

    /// Tasks cancelled per batch within a priority tier.
    pub cancel_batch_size: usize,

    /// Linear backoff step between cleanup retries, in milliseconds.
    pub retry_delay_ms: u64,

    /// Per-phase deadlines.
    pub phases: PhaseTimeoutsConfig,

    /// Per-priority cancellation timeouts.
    pub cancellation: CancellationTimeoutsConfig,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            max_concurrent_cleanups: 5,
            default_timeout_secs: 10,
            max_retries: 3,
            cancel_batch_size: 10,
            retry_delay_ms: 1000,
            phases: PhaseTimeoutsConfig::default(),
            cancellation: CancellationTimeoutsConfig::default(),
        }
    }
}

impl ShutdownConfig {
    /// Deadline for one shutdown phase.
    pub fn phase_timeout(&self, phase: ShutdownPhase) -> Duration {
        let secs = match phase {
            ShutdownPhase::Initialize => self.phases.initialize_secs,
            ShutdownPhase::StopAccepting => self.phases.stop_accepting_secs,
            ShutdownPhase::DrainRequests => self.phases.drain_requests_secs,
            ShutdownPhase::CancelTasks => self.phases.cancel_tasks_secs,
            ShutdownPhase::CleanupResources => self.phases.cleanup_resources_secs,
            ShutdownPhase::Finalize => self.phases.finalize_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Per-phase timeout overrides, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PhaseTimeoutsConfig {
    pub initialize_secs: u64,
    pub stop_accepting_secs: u64,
    pub drain_requests_secs: u64,
    pub cancel_tasks_secs: u64,
    pub cleanup_resources_secs: u64,
    pub finalize_secs: u64,
}

impl Default for PhaseTimeoutsConfig {
    fn default() -> Self {
        Self {
            initialize_secs: 2,
            stop_accepting_secs: 3,
            drain_requests_secs: 10,
            cancel_tasks_secs: 10,
            cleanup_resources_secs: 10,
            finalize_secs: 5,
        }
    }
}

/// Per-priority cancellation timeouts, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CancellationTimeoutsConfig {
    pub critical_secs: u64,
    pub high_secs: u64,
    pub medium_secs: u64,
    pub low_secs: u64,
}

impl Default for CancellationTimeoutsConfig {
    fn default() -> Self {
        Self {
            critical_secs: 30,
            high_secs: 20,
            medium_secs: 10,
            low_secs: 5,
        }
    }
}

impl CancellationTimeoutsConfig {
    pub fn tier_timeouts(&self) -> HashMap<TaskPriority, Duration> {
        HashMap::from([
            (TaskPriority::Critical, Duration::from_secs(self.critical_secs)),
            (TaskPriority::High, Duration::from_secs(self.high_secs)),
            (TaskPriority::Medium, Duration::from_secs(self.medium_secs)),
            (TaskPriority::Low, Duration::from_secs(self.low_secs)),
        ])
    }
}

/// Adaptive timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdaptiveTimeoutConfig {
    /// Lower clamp for suggested timeouts, in milliseconds.
    pub min_ms: u64,

    /// Upper clamp for suggested timeouts, in seconds.
    pub max_secs: u64,

    /// Observations kept per key.
    pub history_size: usize,
}

impl Default for AdaptiveTimeoutConfig {
    fn default() -> Self {
        Self {
            min_ms: 100,
            max_secs: 30,
            history_size: 10,
        }
    }
}

/// Resource lock configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockConfig {
    /// Maximum wait for a contended lock, in seconds.
    pub max_wait_secs: u64,

    /// Deadlock check throttle, in milliseconds.
    pub check_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: 5,
            check_interval_ms: 1000,
        }
    }
}

/// Circuit breaker configuration, applied per service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Time the circuit stays open before probing, in seconds.
    pub recovery_timeout_secs: u64,

    /// Probe budget while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            half_open_max_calls: 3,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Shorthand used by tests and embedders who configure in code.
    pub fn with_fast_phases(mut self, secs: u64) -> Self {
        self.shutdown.phases = PhaseTimeoutsConfig {
            initialize_secs: secs,
            stop_accepting_secs: secs,
            drain_requests_secs: secs,
            cancel_tasks_secs: secs,
            cleanup_resources_secs: secs,
            finalize_secs: secs,
        };
        self
    }
}

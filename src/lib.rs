//! Service lifecycle orchestration engine.
//!
//! Starts a set of interdependent async services in dependency order and, on
//! termination, drives them through a bounded, phased, priority-aware
//! graceful shutdown with deadlock detection and adaptive timeouts.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌─────────────────────────────────────────────┐
//!                      │            LIFECYCLE ORCHESTRATOR            │
//!                      │                                              │
//!   register_service   │  ┌──────────┐   startup()    ┌────────────┐ │
//!   ───────────────────┼─▶│  graph   │───────────────▶│ resilience │ │
//!                      │  │ (topo    │  per-service   │ policy:    │ │
//!                      │  │  order)  │  CallPolicy    │ breaker +  │ │
//!                      │  └──────────┘                │ retry +    │ │
//!                      │                              │ timeout    │ │
//!                      │                              └────────────┘ │
//!                      │                                              │
//!   shutdown(reason)   │  INITIALIZE → STOP_ACCEPTING → DRAIN        │
//!   ───────────────────┼─▶    → CANCEL_TASKS ──────▶ tasks (tiered   │
//!                      │         │                    timed batches) │
//!                      │         → CLEANUP_RESOURCES ▶ resources     │
//!                      │         │     (reverse deps) (locks + state │
//!                      │         │                     + deadlocks)  │
//!                      │         → FINALIZE ─────────▶ report        │
//!                      │                                              │
//!                      │  ┌────────────────────────────────────────┐ │
//!                      │  │          Cross-Cutting Concerns         │ │
//!                      │  │  config │ observability │ error types   │ │
//!                      │  └────────────────────────────────────────┘ │
//!                      └─────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod graph;
pub mod lifecycle;
pub mod resources;
pub mod tasks;

// Cross-cutting concerns
pub mod error;
pub mod observability;
pub mod resilience;

pub use config::OrchestratorConfig;
pub use error::{BoxError, Error};
pub use lifecycle::{
    HealthStatus, LifecycleOrchestrator, ServiceHandle, ShutdownPhase, ShutdownReport,
    StartupReport,
};
pub use resilience::{CircuitBreaker, CircuitState};
pub use resources::ResourceState;
pub use tasks::TaskPriority;

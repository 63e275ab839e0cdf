//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (orchestrator.rs):
//!     order() → per-service CallPolicy (breaker + retry + timeout)
//!     → any exhausted retry aborts startup entirely
//!
//! Shutdown (orchestrator.rs, phases.rs):
//!     INITIALIZE → STOP_ACCEPTING → DRAIN_REQUESTS → CANCEL_TASKS
//!     → CLEANUP_RESOURCES → FINALIZE, each under its own deadline
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown(signal_name)
//! ```
//!
//! # Design Decisions
//! - Shutdown is idempotent: one phase walk, every caller gets the report
//! - Phase timeouts convert to recorded errors, never to an aborted shutdown
//! - Cleanup follows reverse dependency order; bounded concurrency per wave

pub mod orchestrator;
pub mod phases;
pub mod service;
pub mod signals;

pub use orchestrator::LifecycleOrchestrator;
pub use phases::{
    ErrorRecord, HealthStatus, ShutdownPhase, ShutdownProgress, ShutdownReport, StartupReport,
};
pub use service::ServiceHandle;
pub use signals::spawn_signal_listener;

//! Tracked-task subsystem.
//!
//! # Data Flow
//! ```text
//! spawn(name, priority, f):
//!     → registry.rs (tracked with a cancellation token + join handle)
//!     → task self-unregisters on natural completion
//!
//! shutdown CANCEL_TASKS phase:
//!     → canceller.rs (tiers in priority order, bounded timed batches,
//!       elapsed times fed to the adaptive estimator)
//! ```
//!
//! # Design Decisions
//! - Cancellation is token-based and cooperative; never `JoinHandle::abort`
//! - One hung task cannot block its tier: batches share a timeout and a
//!   timed-out batch is an error, not a stop sign
//! - Cancellation order within a tier is unspecified beyond tier membership

pub mod canceller;
pub mod registry;

pub use canceller::CancelSummary;
pub use registry::{TaskId, TaskPriority, TaskRegistry};

//! Resource coordination subsystem.
//!
//! # Data Flow
//! ```text
//! Cleanup pass:
//!     → locks.rs (exclusive lock per named resource, bounded wait)
//!     → state.rs (AVAILABLE/IN_USE → CLEANING → CLEANED|FAILED)
//!
//! While any waiter is blocked:
//!     → deadlock.rs (wait-for graph, throttled cycle check)
//!     → on cycle: force-release one lock, fail affected waiters
//! ```
//!
//! # Design Decisions
//! - One lock per named resource; only the declared holder may release
//! - Forced release is deterministic (lexicographically-smallest holder)
//!   and always logged as an error event
//! - Illegal state transitions fail loudly and leave state unchanged

pub mod deadlock;
pub mod locks;
pub mod state;

pub use deadlock::DeadlockDetector;
pub use locks::{LockStat, ResourceLockManager};
pub use state::{ResourceState, ResourceStateMachine};

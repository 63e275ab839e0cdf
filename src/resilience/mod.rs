//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Service start / cleanup call:
//!     → policy.rs (one CallPolicy per call site: retry + timeout + breaker)
//!     → circuit_breaker.rs (fail fast while the dependency is down)
//!     → backoff.rs (exponential for startup, linear for cleanup)
//!
//! Observed durations:
//!     → adaptive.rs (per-key history → suggested timeout)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retry, timeout and breaker compose in one policy object, applied once
//! - Timeouts are learned per key instead of one static constant

pub mod adaptive;
pub mod backoff;
pub mod circuit_breaker;
pub mod policy;

pub use adaptive::AdaptiveTimeoutEstimator;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use policy::CallPolicy;

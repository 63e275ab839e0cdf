//! Dependency graph subsystem.
//!
//! # Data Flow
//! ```text
//! register_service(name, deps)
//!     → graph edges (node → its dependencies)
//!
//! startup():
//!     order() → dependencies first, deterministic
//!
//! shutdown():
//!     cleanup_order() → dependents first (reverse, weight-aware)
//!     cleanup_waves() → groups safe to clean concurrently
//! ```
//!
//! # Design Decisions
//! - One graph serves both startup and cleanup ordering
//! - Ties broken lexicographically so runs are reproducible
//! - Cycles are fatal and detected before any ordering is used

pub mod dependency;

pub use dependency::DependencyGraph;

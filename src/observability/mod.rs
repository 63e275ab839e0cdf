//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields over formatted strings
//! - Metrics are cheap (atomic increments through the `metrics` facade)
//! - An external backend scrapes; nothing here stores time series

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → OrchestratorConfig (validated, immutable)
//!     → consumed once at orchestrator construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the orchestrator is rebuilt to change it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdaptiveTimeoutConfig, CancellationTimeoutsConfig, CircuitBreakerConfig, LockConfig,
    ObservabilityConfig, OrchestratorConfig, PhaseTimeoutsConfig, ShutdownConfig, StartupConfig,
};
pub use validation::{validate_config, ValidationError};

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, batch sizes > 0)
//! - Catch an adaptive range whose floor exceeds its ceiling
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: OrchestratorConfig → Result
//! - Runs before config is accepted into the system

use crate::config::schema::OrchestratorConfig;

/// One semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: &str) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &OrchestratorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.startup.max_retries == 0 {
        errors.push(err("startup.max_retries", "must be at least 1"));
    }
    if config.startup.default_timeout_secs == 0 {
        errors.push(err("startup.default_timeout_secs", "must be greater than 0"));
    }

    if config.shutdown.max_concurrent_cleanups == 0 {
        errors.push(err("shutdown.max_concurrent_cleanups", "must be at least 1"));
    }
    if config.shutdown.cancel_batch_size == 0 {
        errors.push(err("shutdown.cancel_batch_size", "must be at least 1"));
    }
    if config.shutdown.max_retries == 0 {
        errors.push(err("shutdown.max_retries", "must be at least 1"));
    }

    let phases = [
        ("shutdown.phases.initialize_secs", config.shutdown.phases.initialize_secs),
        ("shutdown.phases.stop_accepting_secs", config.shutdown.phases.stop_accepting_secs),
        ("shutdown.phases.drain_requests_secs", config.shutdown.phases.drain_requests_secs),
        ("shutdown.phases.cancel_tasks_secs", config.shutdown.phases.cancel_tasks_secs),
        ("shutdown.phases.cleanup_resources_secs", config.shutdown.phases.cleanup_resources_secs),
        ("shutdown.phases.finalize_secs", config.shutdown.phases.finalize_secs),
    ];
    for (field, secs) in phases {
        if secs == 0 {
            errors.push(err(field, "phase timeout must be greater than 0"));
        }
    }

    if config.adaptive.history_size == 0 {
        errors.push(err("adaptive.history_size", "must be at least 1"));
    }
    if config.adaptive.min_ms > config.adaptive.max_secs.saturating_mul(1000) {
        errors.push(err("adaptive.min_ms", "must not exceed adaptive.max_secs"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(err("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if config.circuit_breaker.half_open_max_calls == 0 {
        errors.push(err("circuit_breaker.half_open_max_calls", "must be at least 1"));
    }

    match config.observability.log_level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => {
            errors.push(err(
                "observability.log_level",
                &format!("unknown log level '{other}'"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

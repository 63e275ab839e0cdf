//! Supervisor binary.
//!
//! Wires logging, configuration, metrics, and signal handling around one
//! orchestrator instance. Collaborating services are registered by the
//! embedding application before `startup()`; this binary ships the bare
//! supervisor loop.
//!
//! The exit code reflects startup only: shutdown errors are recorded in the
//! report while the process is already terminating.

use std::path::PathBuf;
use std::process::ExitCode;

use service_orchestrator::config::load_config;
use service_orchestrator::lifecycle::spawn_signal_listener;
use service_orchestrator::observability::{init_logging, init_metrics};
use service_orchestrator::{LifecycleOrchestrator, OrchestratorConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => match load_config(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load configuration from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => OrchestratorConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!("service-orchestrator v0.1.0 starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let orchestrator = LifecycleOrchestrator::new(config);

    // Collaborators register their service handles, cleanup handlers, and
    // health checks here, before startup.

    let signals = spawn_signal_listener(orchestrator.clone());

    match orchestrator.startup().await {
        Ok(report) => {
            tracing::info!(
                services = report.order.len(),
                elapsed = ?report.elapsed,
                "Services started; awaiting termination signal"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    }

    // The listener runs the full shutdown before it returns.
    let _ = signals.await;
    ExitCode::SUCCESS
}

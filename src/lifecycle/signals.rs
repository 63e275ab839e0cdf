//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate signals to `shutdown(signal_name)`
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Repeat signals are harmless: `shutdown` is idempotent and the second
//!   delivery just awaits the in-flight run

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::orchestrator::LifecycleOrchestrator;

/// Spawn a listener that maps process termination signals to
/// `shutdown(signal_name)`. The task exits once a shutdown has run.
pub fn spawn_signal_listener(orchestrator: Arc<LifecycleOrchestrator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signal_name = wait_for_signal().await;
        tracing::info!(signal = %signal_name, "Termination signal received");
        let report = orchestrator.shutdown(signal_name).await;
        tracing::info!(
            signal = %signal_name,
            errors = report.errors.len(),
            "Signal-initiated shutdown finished"
        );
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            return wait_for_ctrl_c().await;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGINT handler");
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to wait for Ctrl+C");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

//! Shared utilities for integration and load testing.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use service_orchestrator::{BoxError, OrchestratorConfig, ServiceHandle};

/// Ordered record of lifecycle events across all scripted services.
pub type EventLog = Arc<Mutex<Vec<String>>>;

#[allow(dead_code)]
pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[allow(dead_code)]
pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[allow(dead_code)]
pub fn position(events: &[String], event: &str) -> usize {
    events
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("event '{event}' not found in {events:?}"))
}

/// A service handle scripted for tests: configurable delays, a budget of
/// initial failures, and an event log shared across services.
#[allow(dead_code)]
pub struct ScriptedService {
    name: String,
    log: EventLog,
    start_delay: Duration,
    cleanup_delay: Duration,
    fail_starts: AtomicU32,
    fail_cleanups: AtomicU32,
    start_calls: AtomicU32,
    healthy: AtomicBool,
}

#[allow(dead_code)]
impl ScriptedService {
    pub fn new(name: &str, log: EventLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            start_delay: Duration::ZERO,
            cleanup_delay: Duration::ZERO,
            fail_starts: AtomicU32::new(0),
            fail_cleanups: AtomicU32::new(0),
            start_calls: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    /// The first `n` start calls fail.
    pub fn failing_starts(self, n: u32) -> Self {
        self.fail_starts.store(n, Ordering::SeqCst);
        self
    }

    /// The first `n` cleanup calls fail.
    pub fn failing_cleanups(self, n: u32) -> Self {
        self.fail_cleanups.store(n, Ordering::SeqCst);
        self
    }

    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    fn record(&self, event: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, event));
    }
}

#[async_trait]
impl ServiceHandle for ScriptedService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), BoxError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.start_delay > Duration::ZERO {
            tokio::time::sleep(self.start_delay).await;
        }
        if self.fail_starts.load(Ordering::SeqCst) > 0 {
            self.fail_starts.fetch_sub(1, Ordering::SeqCst);
            self.record("start-failed");
            return Err(format!("{} refused to start", self.name).into());
        }
        self.record("start");
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BoxError> {
        if self.cleanup_delay > Duration::ZERO {
            tokio::time::sleep(self.cleanup_delay).await;
        }
        if self.fail_cleanups.load(Ordering::SeqCst) > 0 {
            self.fail_cleanups.fetch_sub(1, Ordering::SeqCst);
            self.record("cleanup-failed");
            return Err(format!("{} cleanup failed", self.name).into());
        }
        self.record("cleanup");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// Orchestrator config with second-scale deadlines so failure paths finish
/// inside test budgets.
#[allow(dead_code)]
pub fn fast_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default().with_fast_phases(1);
    config.startup.max_retries = 2;
    config.startup.base_delay_ms = 10;
    config.startup.max_delay_ms = 50;
    config.startup.default_timeout_secs = 2;
    config.shutdown.default_timeout_secs = 1;
    config.shutdown.max_retries = 2;
    config.shutdown.retry_delay_ms = 10;
    config.shutdown.cancellation.critical_secs = 1;
    config.shutdown.cancellation.high_secs = 1;
    config.shutdown.cancellation.medium_secs = 1;
    config.shutdown.cancellation.low_secs = 1;
    config.locks.max_wait_secs = 1;
    config.locks.check_interval_ms = 10;
    config.circuit_breaker.recovery_timeout_secs = 1;
    config
}

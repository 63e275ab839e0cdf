//! Adaptive timeout estimation.
//!
//! # Responsibilities
//! - Track recent observed durations per key (service start, task cancel,
//!   resource cleanup)
//! - Suggest a timeout from the history, clamped to a configured range
//!
//! # Design Decisions
//! - Static timeouts either waste time on fast resources or kill
//!   slow-but-healthy ones; per-key learning narrows both failure modes
//! - History is a small capped ring; old observations age out naturally

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;

/// Per-key rolling history of observed durations.
pub struct AdaptiveTimeoutEstimator {
    min: Duration,
    max: Duration,
    history_size: usize,
    histories: DashMap<String, VecDeque<Duration>>,
}

impl AdaptiveTimeoutEstimator {
    pub fn new(min: Duration, max: Duration, history_size: usize) -> Self {
        Self {
            min,
            max,
            history_size: history_size.max(1),
            histories: DashMap::new(),
        }
    }

    /// Record an observed duration for `key`, evicting the oldest entry once
    /// the history is full.
    pub fn update(&self, key: &str, observed: Duration) {
        let mut history = self.histories.entry(key.to_string()).or_default();
        if history.len() == self.history_size {
            history.pop_front();
        }
        history.push_back(observed);
    }

    /// Suggested timeout for `key`: the historical mean clamped to
    /// `[min, max]`, or `min` when nothing has been observed yet.
    pub fn timeout_for(&self, key: &str) -> Duration {
        let Some(history) = self.histories.get(key) else {
            return self.min;
        };
        if history.is_empty() {
            return self.min;
        }
        let total: Duration = history.iter().sum();
        let mean = total / history.len() as u32;
        mean.clamp(self.min, self.max)
    }

    /// Number of observations currently held for `key`.
    pub fn observed(&self, key: &str) -> usize {
        self.histories.get(key).map(|h| h.len()).unwrap_or(0)
    }
}

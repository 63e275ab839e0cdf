//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: testing if the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: after recovery timeout
//! Half-Open → Closed: probe call succeeds
//! Half-Open → Open: probe call fails
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global)
//! - Fail fast in Open state without invoking the wrapped call
//! - Bounded probes in Half-Open (prevents hammering a recovering service)

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{BoxError, Error};
use crate::observability::metrics;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_calls: u32,
    last_transition: Instant,
}

/// Wraps a fallible async call with CLOSED/OPEN/HALF_OPEN protection.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout: Duration,
        half_open_max_calls: u32,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            half_open_max_calls: half_open_max_calls.max(1),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_calls: 0,
                last_transition: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute `f` if the circuit permits it.
    ///
    /// In OPEN the call fails fast with `Error::CircuitOpen` and `f` is never
    /// invoked; in HALF_OPEN at most `half_open_max_calls` probes run, and a
    /// single success closes the circuit and resets the failure counter.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        self.before_call()?;

        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(Error::Upstream {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Current state, as last transitioned. An elapsed recovery timeout is
    /// only observed by the next `call()`.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner
            .lock()
            .expect("circuit breaker mutex poisoned")
            .consecutive_failures
    }

    fn before_call(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");

        if inner.state == CircuitState::Open {
            if inner.last_transition.elapsed() >= self.recovery_timeout {
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.half_open_calls = 0;
            } else {
                return Err(Error::CircuitOpen {
                    name: self.name.clone(),
                });
            }
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.half_open_calls >= self.half_open_max_calls {
                return Err(Error::CircuitHalfOpenLimit {
                    name: self.name.clone(),
                });
            }
            inner.half_open_calls += 1;
        }

        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures += 1;
        metrics::record_circuit_failure(&self.name);

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.last_transition = Instant::now();
        metrics::record_circuit_state(&self.name, to);
        tracing::info!(
            breaker = %self.name,
            from = %from,
            to = %to,
            "Circuit breaker state change"
        );
    }
}

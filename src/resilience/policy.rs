//! Composable call policy: retry + timeout + circuit breaker.
//!
//! # Responsibilities
//! - Apply one bounded-retry, per-attempt-timeout, breaker-gated policy to a
//!   call site in a single place
//!
//! # Design Decisions
//! - One policy object instead of stacked wrappers, so ordering is fixed:
//!   breaker gates the attempt, the timeout bounds it, retries go around both
//! - A fast-failed (open-circuit) attempt still consumes an attempt and
//!   waits out the backoff, giving the breaker time to recover

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{BoxError, Error};
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::circuit_breaker::CircuitBreaker;

/// Result of a successful policy execution.
#[derive(Debug)]
pub struct PolicyOutcome<T> {
    pub value: T,
    /// 1-based attempt number that succeeded.
    pub attempts: u32,
    /// Elapsed time of the successful attempt only.
    pub elapsed: Duration,
}

/// Bounded retries with exponential backoff, a per-attempt timeout, and an
/// optional circuit breaker gating each attempt.
#[derive(Clone)]
pub struct CallPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl CallPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms,
            breaker: None,
        }
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Run `f` until it succeeds or attempts are exhausted. Returns the last
    /// error on exhaustion.
    pub async fn execute<T, F, Fut>(
        &self,
        name: &str,
        timeout: Duration,
        mut f: F,
    ) -> Result<PolicyOutcome<T>, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let mut last_error = Error::Upstream {
            message: "no attempts were made".to_string(),
        };

        for attempt in 1..=self.max_attempts {
            let started = Instant::now();
            let result = self.attempt(timeout, f()).await;

            match result {
                Ok(value) => {
                    return Ok(PolicyOutcome {
                        value,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        call = %name,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Call attempt failed"
                    );
                    last_error = e;
                }
            }

            if attempt < self.max_attempts {
                let delay = calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms);
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error)
    }

    async fn attempt<T, Fut>(&self, timeout: Duration, fut: Fut) -> Result<T, Error>
    where
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let bounded = async {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(elapsed) => Err(Box::new(elapsed) as BoxError),
            }
        };

        match &self.breaker {
            Some(breaker) => breaker.call(|| bounded).await,
            None => bounded.await.map_err(|e| Error::Upstream {
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_first_attempt() {
        let policy = CallPolicy::new(3, 1, 10);
        let outcome = policy
            .execute("ok", Duration::from_secs(1), || async { Ok(42u32) })
            .await
            .unwrap();
        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = CallPolicy::new(3, 1, 10);
        let calls = AtomicU32::new(0);
        let outcome = policy
            .execute("flaky", Duration::from_secs(1), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet".into())
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let policy = CallPolicy::new(2, 1, 10);
        let result: Result<PolicyOutcome<()>, Error> = policy
            .execute("down", Duration::from_secs(1), || async {
                Err::<(), BoxError>("still down".into())
            })
            .await;
        match result {
            Err(Error::Upstream { message }) => assert_eq!(message, "still down"),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn attempts_are_bounded_by_the_timeout() {
        let policy = CallPolicy::new(1, 1, 10);
        let result: Result<PolicyOutcome<()>, Error> = policy
            .execute("hung", Duration::from_millis(20), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_attempts() {
        let breaker = Arc::new(CircuitBreaker::new(
            "svc",
            1,
            Duration::from_secs(60),
            1,
        ));
        let policy = CallPolicy::new(2, 1, 10).with_breaker(breaker);

        let calls = AtomicU32::new(0);
        let result: Result<PolicyOutcome<()>, Error> = policy
            .execute("svc", Duration::from_secs(1), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), BoxError>("down".into())
            })
            .await;

        assert!(matches!(result, Err(Error::CircuitOpen { .. })));
        // The first attempt opened the circuit; the second never ran.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

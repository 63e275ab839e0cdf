//! Backoff delay calculation.

use std::time::Duration;
use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// Used between startup retry attempts. Attempt numbers are 1-based;
/// attempt 0 means "no delay".
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow((attempt - 1).min(63));
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Calculate linear backoff delay, capped at `max_ms`.
///
/// Used between resource cleanup retries, where total shutdown time is the
/// budget and exponential growth would burn it.
pub fn calculate_linear_backoff(attempt: u32, step_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = step_ms.saturating_mul(attempt as u64).min(max_ms);
    Duration::from_millis(delay_ms)
}

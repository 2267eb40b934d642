// SPDX-License-Identifier: MIT
//! Exponential backoff retry for external calls.
//!
//! [`retry_with_backoff`] retries a fallible async operation with
//! exponentially increasing delays. A `retryable` predicate decides whether
//! a given error is worth another attempt — deterministic failures
//! (authentication, malformed input) short-circuit immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for [`retry_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first try).
    pub max_attempts: u32,
    /// Delay before the second attempt; multiplied by `multiplier` after
    /// each failure.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the previous delay on each retry.
    pub multiplier: f64,
    /// Fixed jitter added to every delay. Callers derive this from a
    /// request counter (see [`counter_jitter`]) so repeated callers do not
    /// retry in lockstep.
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryConfig {
    /// Config suitable for quick unit tests (no real waiting).
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: Duration::ZERO,
        }
    }
}

/// Derive a bounded jitter from a shared request counter.
///
/// The counter is the only cross-call mutable state backoff needs; the
/// Weyl-style multiplication spreads consecutive counter values across the
/// `[0, cap)` range.
pub fn counter_jitter(counter: &AtomicU64, cap: Duration) -> Duration {
    let cap_ms = cap.as_millis() as u64;
    if cap_ms == 0 {
        return Duration::ZERO;
    }
    let n = counter.fetch_add(1, Ordering::Relaxed);
    Duration::from_millis(n.wrapping_mul(0x9E37_79B9) % cap_ms)
}

/// Retry an async operation with exponential backoff.
///
/// Calls `f()` up to `config.max_attempts` times, sleeping between
/// attempts. An error for which `retryable` returns `false` is returned
/// immediately without further attempts.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    mut retryable: impl FnMut(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    assert!(
        config.max_attempts > 0,
        "RetryConfig.max_attempts must be at least 1"
    );

    let mut delay = config.initial_delay;
    let mut last_err: Option<E> = None;

    for attempt in 1..=config.max_attempts {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(e) => {
                if !retryable(&e) {
                    debug!(attempt, err = ?e, "error is not retryable");
                    return Err(e);
                }
                if attempt < config.max_attempts {
                    let wait = delay.saturating_add(config.jitter);
                    warn!(
                        attempt,
                        max = config.max_attempts,
                        delay_ms = wait.as_millis(),
                        err = ?e,
                        "attempt failed — retrying"
                    );
                    tokio::time::sleep(wait).await;
                    let next_ms = (delay.as_millis() as f64 * config.multiplier) as u128;
                    delay = Duration::from_millis(next_ms.min(config.max_delay.as_millis()) as u64);
                } else {
                    warn!(attempt, max = config.max_attempts, err = ?e, "all retry attempts exhausted");
                    last_err = Some(e);
                }
            }
        }
    }

    Err(last_err.expect("retry loop ended without setting last_err"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let cfg = RetryConfig::instant();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<u32, String> = retry_with_backoff(&cfg, |_| true, || {
            let c = calls2.clone();
            async move {
                c.fetch_add(1, Ordering::Relaxed);
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let cfg = RetryConfig::instant();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<u32, String> = retry_with_backoff(&cfg, |_| true, || {
            let c = calls2.clone();
            async move {
                let n = c.fetch_add(1, Ordering::Relaxed) + 1;
                if n < 3 {
                    Err(format!("attempt {n} failed"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_short_circuits() {
        let cfg = RetryConfig::instant();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<u32, String> = retry_with_backoff(&cfg, |_| false, || {
            let c = calls2.clone();
            async move {
                c.fetch_add(1, Ordering::Relaxed);
                Err("auth failed".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), "auth failed");
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn returns_last_error_after_all_attempts() {
        let cfg = RetryConfig::instant();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<u32, String> = retry_with_backoff(&cfg, |_| true, || {
            let c = calls2.clone();
            async move {
                c.fetch_add(1, Ordering::Relaxed);
                Err("transient".to_string())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn counter_jitter_is_bounded() {
        let counter = AtomicU64::new(0);
        for _ in 0..64 {
            let j = counter_jitter(&counter, Duration::from_millis(250));
            assert!(j < Duration::from_millis(250));
        }
        // The counter advanced once per call.
        assert_eq!(counter.load(Ordering::Relaxed), 64);
    }
}

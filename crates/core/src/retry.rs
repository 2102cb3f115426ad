//! Retry policy for node reads and transaction submission.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use keeper_chain::{ChainReadError, ExecutionError};
use tracing::{info, warn};

/// Errors that know whether another attempt can help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ChainReadError {
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for ExecutionError {
    fn is_retryable(&self) -> bool {
        ExecutionError::is_retryable(self)
    }
}

/// Exponential backoff with a cap and optional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Fraction of the delay (0.0..=1.0) that may be shaved off at random.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());

        let jitter = self.jitter.clamp(0.0, 1.0);
        let shaved = if jitter > 0.0 { capped * jitter * unit_noise() } else { 0.0 };

        Duration::from_secs_f64((capped - shaved).max(0.0))
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(what = what, attempt = attempt, "Succeeded on retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(what = what, error = %e, "Failed with non-retryable error");
                    return Err(e);
                }
                Err(e) if attempt >= attempts => {
                    warn!(what = what, attempts = attempts, error = %e, "All retry attempts exhausted");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        what = what,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Cheap pseudo-random value in `[0, 1)` from the clock's sub-second part.
fn unit_noise() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    f64::from(nanos % 1_000_000) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(4),
            jitter: 0.0,
        }
    }

    #[test]
    fn test_delay_growth_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
            jitter: 0.0,
        };

        let delays: Vec<u128> = (1..=6).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(policy.delay_for(1_000), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        for n in 1..20 {
            let delay = policy.delay_for(n);
            assert!(delay <= policy.max_delay);
        }
    }

    #[tokio::test]
    async fn test_revert_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ExecutionError> = fast(5)
            .run("liquidate", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExecutionError::Reverted {
                    tx_hash: None,
                    context: "execution reverted".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_retried_until_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ExecutionError> = fast(3)
            .run("liquidate", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExecutionError::Transport("timeout".into()))
            })
            .await;

        assert!(matches!(result, Err(ExecutionError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_succeeds_on_second_attempt() {
        let calls = AtomicU32::new(0);
        let result = fast(3)
            .run("read", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(ChainReadError::malformed("mode", "empty"))
                } else {
                    Ok(7u8)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

//! Bounded retry with a fixed delay between attempts.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// `attempts` counts the first call; it is clamped to at least one.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn single() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up. The closure receives the 1-based
/// attempt number.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<Attempted<T>, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) => {
                if !is_retryable(&error) || attempt >= policy.attempts {
                    return Err(RetryError {
                        error,
                        attempts: attempt,
                    });
                }
                debug!(attempt, max = policy.attempts, delay_ms = policy.delay.as_millis() as u64, "retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let outcome = with_retry(
            RetryPolicy::new(3, Duration::from_millis(100)),
            |_: &&str| true,
            |_| {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { if call < 3 { Err("transient") } else { Ok(call) } }
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_calls_once() {
        let calls = AtomicU32::new(0);
        let outcome = with_retry(
            RetryPolicy::new(1, Duration::from_millis(100)),
            |_: &&str| true,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("transient") }
            },
        )
        .await;
        assert_eq!(outcome.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let outcome = with_retry(
            RetryPolicy::new(5, Duration::from_millis(100)),
            |error: &&str| *error != "fatal",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("fatal") }
            },
        )
        .await;
        assert_eq!(outcome.unwrap_err().error, "fatal");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

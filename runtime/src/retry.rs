//! Exponential backoff for transient failures and reconnection.
//!
//! Three entry points:
//!
//! - [`retry_with_backoff`]: bounded retries for any failure
//! - [`retry_with_predicate`]: bounded retries for failures the caller
//!   marks as retryable (e.g. re-enqueueing a publish after broker
//!   backpressure, where other broker errors must surface immediately)
//! - [`reconnect_with_backoff`]: unbounded retries with a capped delay,
//!   used for connection establishment — service startup blocks on its
//!   dependencies, and mid-stream disconnects re-enter the same loop
//!
//! The delay doubles per attempt and is capped at 30 seconds.

use std::time::Duration;
use tokio::time::sleep;

/// Backoff policy.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 100ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts for the bounded entry point.
    pub max_retries: usize,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for the exponential delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy tuned for dependency connection loops: start at one
    /// second, double up to the 30s ceiling, retry forever.
    #[must_use]
    pub const fn reconnect() -> Self {
        Self {
            max_retries: usize::MAX,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// Delay for a given attempt number (0-based), capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64);
        delay.min(self.max_delay)
    }
}

/// Retry an async operation with exponential backoff, bounded by the
/// policy's retry budget.
///
/// # Errors
///
/// Returns the final error once `max_retries` is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= policy.max_retries {
                    tracing::error!(attempt, error = %err, "operation failed after max retries");
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retry an async operation with backoff, but only for errors the
/// predicate marks as retryable; any other error fails immediately.
///
/// # Errors
///
/// Returns the first non-retryable error, or the final retryable error
/// once the budget is exhausted.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }
                if attempt >= policy.max_retries {
                    tracing::error!(attempt, error = %err, "operation failed after max retries");
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retry an async operation until it succeeds, with exponentially
/// increasing delay capped at the policy's ceiling.
///
/// Used for connection establishment: readiness stays false while this
/// loops, and the caller only proceeds once the dependency answered.
pub async fn reconnect_with_backoff<F, Fut, T, E>(
    target: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0usize;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(target, attempt, "reconnected");
                }
                return result;
            }
            Err(err) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    target,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "connection failed, backing off"
                );
                sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn delay_is_capped_at_thirty_seconds() {
        let policy = RetryPolicy::reconnect();
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_backoff(&policy, || {
            let c = Arc::clone(&counter_clone);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let policy = RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: Result<i32, _> = retry_with_backoff(&policy, || {
            let c = Arc::clone(&counter_clone);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>("persistent".to_string())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3); // initial + 2 retries
    }

    #[tokio::test]
    async fn predicate_skips_non_retryable_errors() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: Result<i32, _> = retry_with_predicate(
            &policy,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("permanent".to_string())
                }
            },
            |err| err.contains("transient"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1, "no retries for permanent errors");
    }

    #[tokio::test]
    async fn reconnect_loops_until_success() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::reconnect()
        };
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let value = reconnect_with_backoff("broker", &policy, || {
            let c = Arc::clone(&counter_clone);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 4 {
                    Err("refused".to_string())
                } else {
                    Ok("connected")
                }
            }
        })
        .await;

        assert_eq!(value, "connected");
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}

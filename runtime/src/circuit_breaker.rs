//! Circuit breaker for outbound broker and database I/O.
//!
//! A breaker watches a rolling window of call outcomes and "opens" — fails
//! fast without attempting the underlying I/O — once the window holds at
//! least `volume_threshold` calls of which `failure_rate_threshold` percent
//! failed. After `reset_timeout` the breaker lets probe calls through
//! (half-open) and closes again on `success_threshold` consecutive
//! successes.
//!
//! Each call is additionally bounded by `call_timeout`, converting hangs
//! into transient failures that flow into the consumer retry path or an
//! HTTP 5xx.
//!
//! # States
//!
//! - **Closed**: normal operation, outcomes are counted.
//! - **Open**: calls rejected immediately with [`CircuitBreakerError::Open`].
//! - **HalfOpen**: limited probing after the reset timeout.
//!
//! # Example
//!
//! ```rust
//! use orderline_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(
//!     "mq",
//!     CircuitBreakerConfig::builder()
//!         .volume_threshold(5)
//!         .failure_rate_threshold(50)
//!         .call_timeout(Duration::from_secs(3))
//!         .build(),
//! );
//!
//! let result = breaker.call(|| async { Ok::<_, String>(42) }).await;
//! assert!(result.is_ok());
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Minimum calls in the rolling window before the breaker may open.
    pub volume_threshold: usize,
    /// Failure percentage (0–100) at which the breaker opens.
    pub failure_rate_threshold: u32,
    /// Upper bound on a single wrapped call.
    pub call_timeout: Duration,
    /// How long the breaker stays open before probing.
    pub reset_timeout: Duration,
    /// Length of the rolling outcome window.
    pub window: Duration,
    /// Successes required in half-open state to close again.
    pub success_threshold: usize,
    /// When false the breaker is a pass-through (calls run unguarded).
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            volume_threshold: 5,
            failure_rate_threshold: 50,
            call_timeout: Duration::from_secs(3),
            reset_timeout: Duration::from_secs(30),
            window: Duration::from_secs(10),
            success_threshold: 2,
            enabled: true,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder with the default thresholds.
    #[must_use]
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Set the minimum call volume before the breaker may open.
    #[must_use]
    pub const fn volume_threshold(mut self, calls: usize) -> Self {
        self.config.volume_threshold = calls;
        self
    }

    /// Set the failure percentage (0–100) at which the breaker opens.
    #[must_use]
    pub const fn failure_rate_threshold(mut self, percent: u32) -> Self {
        self.config.failure_rate_threshold = percent;
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub const fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Set how long the breaker stays open before probing.
    #[must_use]
    pub const fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    /// Set the rolling window length.
    #[must_use]
    pub const fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// Set the successes required to close from half-open.
    #[must_use]
    pub const fn success_threshold(mut self, successes: usize) -> Self {
        self.config.success_threshold = successes;
        self
    }

    /// Enable or disable the breaker entirely.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> CircuitBreakerConfig {
        self.config
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls pass through; outcomes are counted.
    Closed,
    /// Calls are rejected immediately.
    Open,
    /// Probing whether the dependency recovered.
    HalfOpen,
}

/// Errors from calls made through a circuit breaker.
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// The breaker is open; the call was not attempted.
    #[error("circuit breaker is open")]
    Open,
    /// The call exceeded the per-call timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    /// The wrapped operation failed.
    #[error("operation failed: {0}")]
    Inner(E),
}

#[derive(Debug)]
struct WindowState {
    state: State,
    window_start: Instant,
    calls: usize,
    failures: usize,
    half_open_successes: usize,
    opened_at: Option<Instant>,
}

impl WindowState {
    fn roll(&mut self, window: Duration) {
        if self.window_start.elapsed() >= window {
            self.window_start = Instant::now();
            self.calls = 0;
            self.failures = 0;
        }
    }
}

/// Fail-fast wrapper around a class of outbound calls.
///
/// Cheap to clone; clones share state, so one breaker instance guards one
/// dependency (the platform uses one for the broker and one per database).
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<RwLock<WindowState>>,
    total_rejections: Arc<AtomicU64>,
}

impl CircuitBreaker {
    /// Create a breaker named for the dependency it guards (`mq`, `db`).
    #[must_use]
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config: Arc::new(config),
            state: Arc::new(RwLock::new(WindowState {
                state: State::Closed,
                window_start: Instant::now(),
                calls: 0,
                failures: 0,
                half_open_successes: 0,
                opened_at: None,
            })),
            total_rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The breaker's current state.
    pub async fn state(&self) -> State {
        self.state.read().await.state
    }

    /// Run an operation through the breaker.
    ///
    /// # Errors
    ///
    /// - [`CircuitBreakerError::Open`] when the breaker rejects the call
    /// - [`CircuitBreakerError::Timeout`] when the call exceeds the
    ///   per-call timeout
    /// - [`CircuitBreakerError::Inner`] when the operation itself fails
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            return operation().await.map_err(CircuitBreakerError::Inner);
        }

        if !self.can_attempt().await {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("circuit_breaker.rejections", "breaker" => self.name).increment(1);
            tracing::warn!(breaker = self.name, "circuit breaker is OPEN, rejecting call");
            return Err(CircuitBreakerError::Open);
        }

        match tokio::time::timeout(self.config.call_timeout, operation()).await {
            Ok(Ok(result)) => {
                self.on_success().await;
                Ok(result)
            }
            Ok(Err(err)) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Inner(err))
            }
            Err(_) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Timeout(self.config.call_timeout))
            }
        }
    }

    async fn can_attempt(&self) -> bool {
        let mut state = self.state.write().await;
        match state.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let expired = state
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.reset_timeout);
                if expired {
                    tracing::info!(breaker = self.name, "circuit breaker OPEN -> HALF_OPEN");
                    state.state = State::HalfOpen;
                    state.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.write().await;
        match state.state {
            State::Closed => {
                state.roll(self.config.window);
                state.calls += 1;
            }
            State::HalfOpen => {
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.success_threshold {
                    tracing::info!(breaker = self.name, "circuit breaker HALF_OPEN -> CLOSED");
                    state.state = State::Closed;
                    state.window_start = Instant::now();
                    state.calls = 0;
                    state.failures = 0;
                    state.opened_at = None;
                }
            }
            State::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;
        match state.state {
            State::Closed => {
                state.roll(self.config.window);
                state.calls += 1;
                state.failures += 1;
                let over_volume = state.calls >= self.config.volume_threshold;
                let failure_rate = state.failures * 100 / state.calls;
                if over_volume && failure_rate >= self.config.failure_rate_threshold as usize {
                    tracing::warn!(
                        breaker = self.name,
                        calls = state.calls,
                        failures = state.failures,
                        "circuit breaker CLOSED -> OPEN"
                    );
                    state.state = State::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            State::HalfOpen => {
                tracing::warn!(
                    breaker = self.name,
                    "circuit breaker HALF_OPEN -> OPEN (probe failed)"
                );
                state.state = State::Open;
                state.opened_at = Some(Instant::now());
                state.half_open_successes = 0;
            }
            State::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .volume_threshold(5)
            .failure_rate_threshold(50)
            .reset_timeout(Duration::from_millis(100))
            .success_threshold(2)
            .build()
    }

    #[tokio::test]
    async fn stays_closed_on_success() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..10 {
            let result = breaker.call(|| async { Ok::<_, String>(42) }).await;
            assert!(result.is_ok());
        }
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn opens_after_volume_and_failure_rate() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..5 {
            let _ = breaker.call(|| async { Err::<i32, _>("boom") }).await;
        }
        assert_eq!(breaker.state().await, State::Open);
    }

    #[tokio::test]
    async fn below_volume_threshold_never_opens() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..4 {
            let _ = breaker.call(|| async { Err::<i32, _>("boom") }).await;
        }
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn under_failure_rate_stays_closed() {
        let breaker = CircuitBreaker::new("test", fast_config());
        // 2 failures out of 6 calls = 33% < 50%
        for i in 0..6 {
            let _ = breaker
                .call(|| async move {
                    if i < 2 {
                        Err::<i32, _>("boom")
                    } else {
                        Ok(1)
                    }
                })
                .await;
        }
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn open_breaker_fails_fast_without_calling() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..5 {
            let _ = breaker.call(|| async { Err::<i32, _>("boom") }).await;
        }

        let called = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let called_clone = std::sync::Arc::clone(&called);
        let result = breaker
            .call(|| async move {
                called_clone.store(true, Ordering::SeqCst);
                Ok::<_, String>(42)
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Open)));
        assert!(!called.load(Ordering::SeqCst), "underlying I/O must not run");
    }

    #[tokio::test]
    async fn recovers_through_half_open() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..5 {
            let _ = breaker.call(|| async { Err::<i32, _>("boom") }).await;
        }
        assert_eq!(breaker.state().await, State::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        for _ in 0..2 {
            let _ = breaker.call(|| async { Ok::<_, String>(1) }).await;
        }
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..5 {
            let _ = breaker.call(|| async { Err::<i32, _>("boom") }).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let _ = breaker.call(|| async { Err::<i32, _>("still down") }).await;
        assert_eq!(breaker.state().await, State::Open);
    }

    #[tokio::test]
    async fn call_timeout_counts_as_failure() {
        let config = CircuitBreakerConfig::builder()
            .volume_threshold(1)
            .failure_rate_threshold(50)
            .call_timeout(Duration::from_millis(20))
            .build();
        let breaker = CircuitBreaker::new("test", config);

        let result = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(1)
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Timeout(_))));
        assert_eq!(breaker.state().await, State::Open);
    }

    #[tokio::test]
    async fn disabled_breaker_is_a_pass_through() {
        let config = CircuitBreakerConfig::builder()
            .volume_threshold(1)
            .enabled(false)
            .build();
        let breaker = CircuitBreaker::new("test", config);

        for _ in 0..10 {
            let _ = breaker.call(|| async { Err::<i32, _>("boom") }).await;
        }
        // Never opens, never rejects.
        let result = breaker.call(|| async { Ok::<_, String>(42) }).await;
        assert!(result.is_ok());
    }
}

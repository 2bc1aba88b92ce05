//! Dependency-aware readiness probing.
//!
//! Liveness is "the process is up" and needs no machinery. Readiness only
//! holds when every registered dependency check passes within the probe
//! timeout: the platform registers a database ping and a broker metadata
//! fetch for a known queue. A check that exceeds the timeout counts as
//! not-ready — never as an error.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A single dependency check.
///
/// Implementations should answer quickly; the aggregate applies its own
/// timeout on top regardless.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Component name, reported in the readiness payload and logs.
    fn name(&self) -> &str;

    /// Whether the dependency is currently usable.
    async fn check(&self) -> bool;
}

type CheckFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// Adapter turning an async closure into a [`ReadinessCheck`].
///
/// Services register their dependency probes without a dedicated type per
/// dependency:
///
/// ```rust,ignore
/// readiness.register(FnCheck::new("database", move || {
///     let pool = pool.clone();
///     async move { sqlx::query("SELECT 1").execute(&pool).await.is_ok() }
/// }));
/// ```
pub struct FnCheck {
    name: String,
    check: Box<dyn Fn() -> CheckFuture + Send + Sync>,
}

impl FnCheck {
    /// Wrap an async closure as a named check.
    pub fn new<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            name: name.into(),
            check: Box::new(move || Box::pin(check())),
        }
    }
}

#[async_trait]
impl ReadinessCheck for FnCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> bool {
        (self.check)().await
    }
}

/// Result of one readiness probe.
#[derive(Clone, Debug)]
pub struct ReadinessReport {
    /// True only if every component passed within the timeout.
    pub ready: bool,
    /// Per-component outcomes, in registration order.
    pub components: Vec<(String, bool)>,
}

/// Aggregate readiness prober.
pub struct Readiness {
    checks: Vec<Arc<dyn ReadinessCheck>>,
    timeout: Duration,
}

impl Readiness {
    /// Create a prober with the given per-check timeout (platform default
    /// ~1.5s).
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            checks: Vec::new(),
            timeout,
        }
    }

    /// Register a dependency check.
    #[must_use]
    pub fn register(mut self, check: impl ReadinessCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Probe every dependency, bounding each check by the timeout.
    pub async fn probe(&self) -> ReadinessReport {
        let mut components = Vec::with_capacity(self.checks.len());
        let mut ready = true;

        for check in &self.checks {
            let passed = match tokio::time::timeout(self.timeout, check.check()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        component = check.name(),
                        timeout_ms = self.timeout.as_millis(),
                        "readiness check timed out"
                    );
                    false
                }
            };
            if !passed {
                ready = false;
            }
            components.push((check.name().to_string(), passed));
        }

        ReadinessReport { ready, components }
    }
}

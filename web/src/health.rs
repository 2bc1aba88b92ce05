//! `/health` and `/ready` endpoints.
//!
//! Liveness (`/health`) answers 200 whenever the process is running — it
//! checks no dependencies. Readiness (`/ready`) probes the registered
//! dependency checks (database ping, broker queue inspection) and flips
//! to 503 while any of them fail, which is also the state during startup
//! and after losing a dependency mid-run.

use axum::{extract::State, http::StatusCode, Json};
use orderline_runtime::readiness::Readiness;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Liveness response body.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` while the process is up.
    pub status: &'static str,
}

/// Liveness endpoint: the process is running.
#[allow(clippy::unused_async)]
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Readiness response body.
#[derive(Serialize)]
pub struct ReadyResponse {
    /// `ready` or `not_ready`.
    pub status: &'static str,
    /// Per-dependency outcomes.
    pub components: BTreeMap<String, bool>,
}

/// Readiness endpoint: every dependency answered within the probe
/// timeout.
pub async fn ready(State(readiness): State<Arc<Readiness>>) -> (StatusCode, Json<ReadyResponse>) {
    let report = readiness.probe().await;
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if report.ready { "ready" } else { "not_ready" },
            components: report.components.into_iter().collect(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderline_runtime::readiness::FnCheck;

    #[tokio::test]
    async fn health_is_always_ok() {
        let (status, Json(body)) = health().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn ready_reflects_dependency_state() {
        let readiness = Arc::new(
            Readiness::new(std::time::Duration::from_millis(200))
                .register(FnCheck::new("database", || async { true }))
                .register(FnCheck::new("broker", || async { false })),
        );

        let (status, Json(body)) = ready(State(readiness)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "not_ready");
        assert_eq!(body.components.get("broker"), Some(&false));
        assert_eq!(body.components.get("database"), Some(&true));
    }

    #[tokio::test]
    async fn ready_when_all_pass() {
        let readiness = Arc::new(
            Readiness::new(std::time::Duration::from_millis(200))
                .register(FnCheck::new("database", || async { true })),
        );

        let (status, Json(body)) = ready(State(readiness)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ready");
    }
}

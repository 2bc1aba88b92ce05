//! Error types for web handlers.
//!
//! [`AppError`] wraps domain errors and implements Axum's `IntoResponse`,
//! so handlers can use `?` and still produce a stable JSON error body.
//!
//! The mapping follows the platform contract: invalid request bodies are
//! 400, envelope construction failures and unexpected errors are 500, and
//! transient infrastructure failures (open circuit breaker, unreachable
//! dependency) are 503.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use orderline_core::bus::EventBusError;
use orderline_core::registry::SchemaError;
use orderline_core::store::EventStoreError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: String,
    /// Internal error for logging; never exposed to the client.
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach a source error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "request failed"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "request failed"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("an internal error occurred").with_source(err)
    }
}

/// A produced envelope that fails validation must not be published; the
/// caller sees a 500.
impl From<SchemaError> for AppError {
    fn from(err: SchemaError) -> Self {
        Self::internal("event envelope validation failed").with_source(err.into())
    }
}

/// Transient store failures (breaker open, connection loss) are 503; the
/// rest are 500.
impl From<EventStoreError> for AppError {
    fn from(err: EventStoreError) -> Self {
        if err.is_transient() {
            Self::unavailable("storage temporarily unavailable").with_source(err.into())
        } else {
            Self::internal("storage error").with_source(err.into())
        }
    }
}

/// Transient broker failures are 503; the rest are 500.
impl From<EventBusError> for AppError {
    fn from(err: EventBusError) -> Self {
        if err.is_transient() {
            Self::unavailable("broker temporarily unavailable").with_source(err.into())
        } else {
            Self::internal("broker error").with_source(err.into())
        }
    }
}

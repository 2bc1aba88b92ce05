//! HTTP building blocks shared by Orderline services.
//!
//! - [`error::AppError`]: bridges domain errors to JSON error responses
//! - [`health`]: the `/health` and `/ready` handlers
//! - [`idempotency`]: the `Idempotency-Key` store behind order creation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod health;
pub mod idempotency;

pub use error::AppError;
pub use idempotency::{IdempotencyStore, InMemoryIdempotencyStore};

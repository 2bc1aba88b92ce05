//! Redpanda/Kafka messaging substrate for Orderline.
//!
//! This crate is the broker-facing half of the platform: it implements the
//! [`EventPublisher`](orderline_core::bus::EventPublisher) seam over
//! rdkafka, hosts the per-queue consumer runtime, and bootstraps the topic
//! topology at startup.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  publish   ┌──────────────────┐
//! │  Service   │ ─────────► │  orders.created.v1│───┐ group fan-out
//! └────────────┘            └──────────────────┘   │
//!                                                  ▼
//!                                         ┌────────────────┐
//!                                         │  QueueWorker   │ q = order.created.q
//!                                         └──────┬─────────┘
//!                          ack ◄── handled       │
//!                 q.retry  ◄── transient failure ┤  (x-attempt++, x-retry-at)
//!                 q.dlq    ◄── budget exhausted /└─ schema-invalid
//! ```
//!
//! Retried deliveries sit in the queue's retry topic until their
//! `x-retry-at` deadline, so delayed redelivery survives consumer
//! restarts. Ordering is per-partition FIFO keyed by `x-group-id` and is
//! best-effort only: a retried message re-enters after later messages.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admin;
pub mod consumer;
pub mod producer;

pub use admin::ensure_topics;
pub use consumer::{QueueWorker, QueueWorkerBuilder};
pub use producer::{EventProducer, EventProducerBuilder};

//! # Orderline Core
//!
//! Core types and traits for the Orderline event platform.
//!
//! This crate defines the contracts every service and infrastructure crate
//! builds on:
//!
//! - **Envelope**: the fixed-shape wrapper every event travels in
//!   ([`envelope::EventEnvelope`])
//! - **Payloads**: the typed, versioned event payloads with runtime
//!   validation ([`payload`])
//! - **Schema registry**: validation at both produce and consume sites
//!   ([`registry::SchemaRegistry`])
//! - **Topology**: topics, queue bindings and the replay routing table
//!   ([`topology`])
//! - **Bus / store / repository traits**: the seams infrastructure crates
//!   implement ([`bus::EventPublisher`], [`store::EventStore`],
//!   [`orders::OrderRepository`])
//!
//! ## Delivery contract
//!
//! Events are delivered **at least once**. Consumers deduplicate through the
//! event store's idempotent append (unique on `eventId`); handlers signal
//! the outcome of each delivery with [`consumer::Dispatch`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod consumer;
pub mod envelope;
pub mod orders;
pub mod payload;
pub mod registry;
pub mod store;
pub mod topology;

pub use bus::{EventBusError, EventPublisher, MessageHeaders};
pub use consumer::{Dispatch, EventHandler};
pub use envelope::EventEnvelope;
pub use registry::{SchemaError, SchemaRegistry};
pub use store::{Appended, EventFilter, EventStore, EventStoreError};

//! # Orderline Testing
//!
//! In-memory doubles for the Orderline persistence and bus seams, so
//! service logic is unit-testable without a broker or a database:
//!
//! - [`RecordingPublisher`]: captures published messages and can be told
//!   to fail, for exercising retry paths
//! - [`InMemoryEventStore`]: event store with the same `eventId`
//!   deduplication contract as the `PostgreSQL` implementation
//! - [`InMemoryOrderRepository`]: order read-model with idempotent create
//!
//! ## Example
//!
//! ```ignore
//! let store = Arc::new(InMemoryEventStore::new());
//! let publisher = Arc::new(RecordingPublisher::new());
//! let handler = ReservationHandler::new(store.clone(), publisher.clone(), ...);
//!
//! handler.handle(&envelope.to_bytes()?).await?;
//!
//! assert_eq!(publisher.published().len(), 1);
//! ```

#![forbid(unsafe_code)]

mod event_store;
mod orders;
mod publisher;

pub use event_store::InMemoryEventStore;
pub use orders::InMemoryOrderRepository;
pub use publisher::{PublishedMessage, RecordingPublisher};

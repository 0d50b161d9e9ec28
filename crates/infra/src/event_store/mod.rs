//! Append-only event store boundary.
//!
//! Stores and loads tenant-scoped event streams without making any storage
//! assumptions. Reservations are one stream per `(tenant_id, reservation_id)`.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

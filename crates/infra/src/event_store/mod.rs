//! Append-only event store boundary for the event-sourced workflow aggregates
//! (requests and routes).

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

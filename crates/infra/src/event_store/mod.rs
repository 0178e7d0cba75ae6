//! Append-only event store boundary.
//!
//! The engine talks to storage only through [`EventStore`]; adapters decide
//! how events and snapshot documents are laid out.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use query::{Condition, Filter, Op, SortOrder};
pub use r#trait::{EventStore, EventStoreError, SnapshotDocument, SnapshotRef};

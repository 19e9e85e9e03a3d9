//! PostgreSQL implementation of the event store.

mod event_store;

pub use event_store::PostgresEventStore;

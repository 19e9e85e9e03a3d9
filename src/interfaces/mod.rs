//! Abstract interfaces for eventsdb components.
//!
//! The engine only talks to durable storage through these traits.

pub mod event_store;

pub use event_store::{EventStore, Result, StorageError};

//! Event storage interface.

use async_trait::async_trait;

use crate::models::{Event, NewEvent};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Event not found: id={id}")]
    NotFound { id: i64 },

    #[error("Invalid stored timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Interface for the append-only event log.
///
/// Implementations:
/// - `SqliteEventStore`: SQLite storage
/// - `PostgresEventStore`: PostgreSQL storage
/// - `MemoryEventStore`: in-process storage for development and tests
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Create tables and indexes. Safe to call repeatedly.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Append an event and return the id the store assigned to it.
    ///
    /// The event must be visible to `get_by_subject_after` once this returns.
    async fn append(&self, event: &NewEvent) -> Result<i64>;

    /// Point lookup. Fails with `StorageError::NotFound` if absent.
    async fn get_by_id(&self, id: i64) -> Result<Event>;

    /// Up to `limit` events of `subject` with `id > after_id`, ascending by id.
    ///
    /// An empty result means there is no further history right now.
    async fn get_by_subject_after(
        &self,
        subject: &str,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<Event>>;

    /// Distinct subjects that have at least one event, sorted ascending.
    async fn list_subjects(&self) -> Result<Vec<String>>;
}

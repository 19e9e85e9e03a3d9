//! In-memory EventStore implementation.
//!
//! Nothing survives a restart. Used for local development and as the
//! backing store of unit and integration tests.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{Event, NewEvent};
use crate::storage::{EventStore, Result, StorageError};

/// Event store that keeps the log in a vector ordered by id.
#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &NewEvent) -> Result<i64> {
        let mut events = self.events.write().await;
        let id = events.last().map_or(1, |last| last.id + 1);
        events.push(event.clone().with_id(id));
        Ok(id)
    }

    async fn get_by_id(&self, id: i64) -> Result<Event> {
        let events = self.events.read().await;
        // Ids are dense and start at 1.
        id.checked_sub(1)
            .and_then(|idx| usize::try_from(idx).ok())
            .and_then(|idx| events.get(idx))
            .cloned()
            .ok_or(StorageError::NotFound { id })
    }

    async fn get_by_subject_after(
        &self,
        subject: &str,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<Event>> {
        let events = self.events.read().await;
        let start = events.partition_point(|e| e.id <= after_id);
        Ok(events[start..]
            .iter()
            .filter(|e| e.subject == subject)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_subjects(&self) -> Result<Vec<String>> {
        let events = self.events.read().await;
        let subjects: BTreeSet<&str> = events.iter().map(|e| e.subject.as_str()).collect();
        Ok(subjects.into_iter().map(str::to_string).collect())
    }
}

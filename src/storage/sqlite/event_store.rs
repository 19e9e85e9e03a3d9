//! SQLite EventStore implementation.
//!
//! Statements come from [`crate::storage::schema`]; this file renders them
//! for SQLite and runs them on the pool.

use async_trait::async_trait;
use sea_query::SqliteQueryBuilder;
use sqlx::{Row, SqlitePool};

use crate::models::{Event, NewEvent};
use crate::storage::schema::{
    decode_event, insert_event, select_distinct_subjects, select_event_by_id,
    select_subject_after, SQLITE_CREATE_EVENTS_TABLE,
};
use crate::storage::{EventStore, Result, StorageError};

/// SQLite implementation of EventStore.
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Create a new SQLite event store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn init(&self) -> Result<()> {
        sqlx::raw_sql(SQLITE_CREATE_EVENTS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append(&self, event: &NewEvent) -> Result<i64> {
        let query = insert_event(event).to_string(SqliteQueryBuilder);
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.try_get(0)?)
    }

    async fn get_by_id(&self, id: i64) -> Result<Event> {
        let query = select_event_by_id(id).to_string(SqliteQueryBuilder);
        match sqlx::query(&query).fetch_optional(&self.pool).await? {
            Some(row) => decode_event(&row),
            None => Err(StorageError::NotFound { id }),
        }
    }

    async fn get_by_subject_after(
        &self,
        subject: &str,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<Event>> {
        let query = select_subject_after(subject, after_id, limit).to_string(SqliteQueryBuilder);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(decode_event).collect()
    }

    async fn list_subjects(&self) -> Result<Vec<String>> {
        let query = select_distinct_subjects().to_string(SqliteQueryBuilder);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        let subjects = rows
            .iter()
            .map(|row| row.try_get("subject"))
            .collect::<std::result::Result<_, _>>()?;
        Ok(subjects)
    }
}

//! Database schema definitions using sea-query.
//!
//! Table and column identifiers, plus the statements every SQL backend runs.
//! Backends only render these with their own query builder and decode rows.

use sea_query::{Expr, Iden, InsertStatement, Order, Query, SelectStatement};
use sqlx::{ColumnIndex, Decode, Row, Type};

use crate::models::{format_time, parse_time, Event, NewEvent};
use crate::storage::{Result, StorageError};

/// Events table schema.
#[derive(Iden)]
pub enum Events {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "source"]
    Source,
    #[iden = "type"]
    Type,
    #[iden = "subject"]
    Subject,
    #[iden = "time"]
    Time,
    #[iden = "data"]
    Data,
}

/// All columns of a stored event, in row order.
pub const EVENT_COLUMNS: [Events; 6] = [
    Events::Id,
    Events::Source,
    Events::Type,
    Events::Subject,
    Events::Time,
    Events::Data,
];

/// SQL for creating the SQLite events table.
///
/// AUTOINCREMENT keeps ids from being reused after the highest row is deleted.
pub const SQLITE_CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    type TEXT NOT NULL,
    subject TEXT NOT NULL,
    time TEXT NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_subject_id ON events(subject, id);
"#;

/// SQL for creating the PostgreSQL events table.
pub const POSTGRES_CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id BIGSERIAL PRIMARY KEY,
    source TEXT NOT NULL,
    type TEXT NOT NULL,
    subject TEXT NOT NULL,
    time TEXT NOT NULL,
    data BYTEA NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_subject_id ON events(subject, id);
"#;

/// Insert one event, returning its assigned id.
pub fn insert_event(event: &NewEvent) -> InsertStatement {
    Query::insert()
        .into_table(Events::Table)
        .columns([
            Events::Source,
            Events::Type,
            Events::Subject,
            Events::Time,
            Events::Data,
        ])
        .values_panic([
            event.source.as_str().into(),
            event.event_type.as_str().into(),
            event.subject.as_str().into(),
            format_time(&event.time).into(),
            event.data.clone().into(),
        ])
        .returning_col(Events::Id)
        .to_owned()
}

pub fn select_event_by_id(id: i64) -> SelectStatement {
    Query::select()
        .columns(EVENT_COLUMNS)
        .from(Events::Table)
        .and_where(Expr::col(Events::Id).eq(id))
        .to_owned()
}

/// One page of a subject's events past `after_id`, oldest first.
pub fn select_subject_after(subject: &str, after_id: i64, limit: u32) -> SelectStatement {
    Query::select()
        .columns(EVENT_COLUMNS)
        .from(Events::Table)
        .and_where(Expr::col(Events::Subject).eq(subject))
        .and_where(Expr::col(Events::Id).gt(after_id))
        .order_by(Events::Id, Order::Asc)
        .limit(u64::from(limit))
        .to_owned()
}

pub fn select_distinct_subjects() -> SelectStatement {
    Query::select()
        .distinct()
        .column(Events::Subject)
        .from(Events::Table)
        .order_by(Events::Subject, Order::Asc)
        .to_owned()
}

/// Decode a row selected with [`EVENT_COLUMNS`].
pub fn decode_event<'r, R>(row: &'r R) -> Result<Event>
where
    R: Row,
    &'static str: ColumnIndex<R>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    let raw_time: String = row.try_get("time")?;
    let time = parse_time(&raw_time)
        .map_err(|e| StorageError::InvalidTimestamp(format!("{raw_time}: {e}")))?;

    Ok(Event {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        event_type: row.try_get("type")?,
        subject: row.try_get("subject")?,
        time,
        data: row.try_get("data")?,
    })
}

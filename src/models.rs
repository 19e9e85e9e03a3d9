//! Event records shared by the store, the engine and the front doors.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::proto;

/// An immutable, persisted event.
///
/// `id` is assigned by the store, strictly increasing and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub subject: String,
    pub time: DateTime<Utc>,
    /// Opaque payload; base64 in JSON.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Event {
    /// Timestamp in the RFC 3339 form used on every wire surface.
    pub fn formatted_time(&self) -> String {
        format_time(&self.time)
    }
}

/// An event before the store has assigned its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub source: String,
    pub event_type: String,
    pub subject: String,
    pub time: DateTime<Utc>,
    pub data: Vec<u8>,
}

impl NewEvent {
    /// Build a new event stamped with the current time.
    pub fn now(
        source: impl Into<String>,
        event_type: impl Into<String>,
        subject: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            source: source.into(),
            event_type: event_type.into(),
            subject: subject.into(),
            time: Utc::now(),
            data: data.into(),
        }
    }

    pub fn with_id(self, id: i64) -> Event {
        Event {
            id,
            source: self.source,
            event_type: self.event_type,
            subject: self.subject,
            time: self.time,
            data: self.data,
        }
    }
}

/// Body of `POST /events`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub subject: String,
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
}

impl From<CreateEventRequest> for NewEvent {
    fn from(req: CreateEventRequest) -> Self {
        NewEvent::now(req.source, req.event_type, req.subject, req.data)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreateEventResponse {
    pub id: i64,
}

/// RFC 3339 with nanosecond precision when present, `Z` suffix.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a stored RFC 3339 timestamp.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}

impl From<&Event> for proto::Event {
    fn from(event: &Event) -> Self {
        proto::Event {
            id: event.id,
            source: event.source.clone(),
            r#type: event.event_type.clone(),
            subject: event.subject.clone(),
            time: event.formatted_time(),
            data: event.data.clone(),
        }
    }
}

impl From<proto::CreateEventRequest> for NewEvent {
    fn from(req: proto::CreateEventRequest) -> Self {
        NewEvent::now(req.source, req.r#type, req.subject, req.data)
    }
}

/// Serde adapter encoding byte payloads as standard base64 strings.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

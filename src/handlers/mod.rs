//! Front doors over the event engine.
//!
//! - `grpc`: the `eventsdb.EventsDb` tonic service
//! - `http`: axum JSON endpoints and server-sent event streams
//! - `auth`: bearer token checks shared by both

pub mod auth;
pub mod grpc;
pub mod http;

pub use auth::TokenAuth;
pub use grpc::EventsDbService;

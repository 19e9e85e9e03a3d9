//! eventsdb - append-only event log with live subscriptions
//!
//! Events are appended under a subject and assigned a strictly increasing id.
//! Subscribers name a subject and a resume point, receive the stored history
//! after that point, then every new event for the subject as it is written,
//! with no gaps and no duplicates across the switch.

pub mod config;
pub mod engine;
pub mod handlers;
pub mod interfaces;
pub mod models;
pub mod proto;
pub mod storage;
pub mod utils;

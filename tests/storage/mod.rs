//! Shared storage integration tests.
//!
//! Tests the EventStore interface against every implementation.
//! Each implementation module imports these test functions and runs them.

pub mod event_store_tests;

//! Shared utilities: process bootstrap, retry policies and metric instruments.

pub mod bootstrap;
pub mod metrics;
pub mod retry;

//! Buffer sizes and subscriber limits for the distribution engine.

use serde::Deserialize;

/// Default capacity of the broadcaster's inbound queue.
pub const DEFAULT_EMITTER_BUFFER_SIZE: usize = 100;

/// Default capacity of each subscriber's live queue.
pub const DEFAULT_CLIENT_BUFFER_SIZE: usize = 100;

/// Default maximum number of concurrent subscribers across all subjects.
pub const DEFAULT_MAX_TOTAL_CLIENTS: usize = 10_000;

/// Default page size for historical catch-up reads.
pub const DEFAULT_STREAM_BATCH_SIZE: u32 = 10;

/// Limits applied by the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamLimits {
    /// Broadcaster inbound queue capacity.
    ///
    /// Producers wait when it is full; this is the write-path backpressure.
    pub emitter_buffer_size: usize,

    /// Per-subscriber live queue capacity.
    ///
    /// When a subscriber falls this far behind, its oldest queued events are
    /// overwritten and the session re-reads them from the store.
    pub client_buffer_size: usize,

    /// Maximum concurrently attached subscribers.
    pub max_total_clients: usize,

    /// Events fetched per catch-up page.
    pub stream_batch_size: u32,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            emitter_buffer_size: DEFAULT_EMITTER_BUFFER_SIZE,
            client_buffer_size: DEFAULT_CLIENT_BUFFER_SIZE,
            max_total_clients: DEFAULT_MAX_TOTAL_CLIENTS,
            stream_batch_size: DEFAULT_STREAM_BATCH_SIZE,
        }
    }
}

impl StreamLimits {
    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<(), String> {
        if self.emitter_buffer_size == 0 {
            return Err("limits.emitter_buffer_size must be greater than 0".to_string());
        }
        if self.client_buffer_size == 0 {
            return Err("limits.client_buffer_size must be greater than 0".to_string());
        }
        if self.max_total_clients == 0 {
            return Err("limits.max_total_clients must be greater than 0".to_string());
        }
        if self.stream_batch_size == 0 {
            return Err("limits.stream_batch_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

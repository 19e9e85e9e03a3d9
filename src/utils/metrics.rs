//! OTel-native metrics instruments.
//!
//! Centralized metric definitions using OpenTelemetry meters. Instruments are
//! lazily initialized against the global meter provider, which is a no-op
//! unless the `otel` feature installs an exporter.
//!
//! Naming follows OTel semantic conventions (dot-separated).
//! The OTel Collector / Prometheus exporter converts dots to underscores.

use std::sync::LazyLock;
use std::time::Instant;

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
use opentelemetry::{global, KeyValue};

static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("eventsdb"));

// ============================================================================
// Front-door operations
// ============================================================================

/// Total operations by name and outcome.
pub static OPERATION_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("eventsdb.operation.total")
        .with_description("Total event operations")
        .build()
});

/// Duration of operations (streams: until the stream is opened).
pub static OPERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("eventsdb.operation.duration")
        .with_description("Event operation duration")
        .with_unit("s")
        .build()
});

// ============================================================================
// Subscriptions
// ============================================================================

/// Currently attached subscribers. Moves 1:1 with registry attach/detach.
pub static ACTIVE_STREAMS: LazyLock<UpDownCounter<i64>> = LazyLock::new(|| {
    METER
        .i64_up_down_counter("eventsdb.stream.active")
        .with_description("Currently active event streams")
        .build()
});

/// Live events overwritten in a subscriber queue before being read.
pub static STREAM_LAGGED_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("eventsdb.stream.lagged.total")
        .with_description("Live events dropped from slow subscriber queues")
        .build()
});

// ============================================================================
// Helper
// ============================================================================

/// Create an operation label.
pub fn operation_attr(operation: &str) -> KeyValue {
    KeyValue::new("operation", operation.to_string())
}

/// Create a status label.
pub fn status_attr(status: &str) -> KeyValue {
    KeyValue::new("status", status.to_string())
}

/// Record one finished operation.
pub fn record_operation(operation: &str, status: &str, started: Instant) {
    OPERATION_DURATION.record(
        started.elapsed().as_secs_f64(),
        &[operation_attr(operation)],
    );
    OPERATION_TOTAL.add(1, &[operation_attr(operation), status_attr(status)]);
}

use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;
use serde::Serialize;

/// Per-topic queue counters returned by [`crate::QueueEngine::metrics`].
///
/// `queue_depth` and `processing_count` are point-in-time; `retries_count`
/// and `dlq_count` are cumulative and survive queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueMetrics {
    pub queue_depth: u64,
    pub processing_count: u64,
    pub retries_count: u64,
    pub dlq_count: u64,
}

/// OTel instruments for the engine, mirroring the readable per-topic
/// counters. Created once at scheduler init; if no meter provider is
/// configured the instruments are no-op.
pub(crate) struct Metrics {
    messages_enqueued: Counter<u64>,
    messages_delivered: Counter<u64>,
    messages_retried: Counter<u64>,
    messages_dead_lettered: Counter<u64>,
    queue_depth: Gauge<u64>,
    messages_in_flight: Gauge<u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub(crate) fn new() -> Self {
        let meter = opentelemetry::global::meter("fluxo");
        Self::from_meter(&meter)
    }

    /// Create metrics from a specific meter (used in tests with an in-memory
    /// exporter).
    pub(crate) fn from_meter(meter: &Meter) -> Self {
        Self {
            messages_enqueued: meter
                .u64_counter("fluxo.messages.enqueued")
                .with_description("Messages appended to topic queues")
                .build(),
            messages_delivered: meter
                .u64_counter("fluxo.messages.delivered")
                .with_description("Messages whose handler completed successfully")
                .build(),
            messages_retried: meter
                .u64_counter("fluxo.messages.retried")
                .with_description("Failed attempts rescheduled for retry")
                .build(),
            messages_dead_lettered: meter
                .u64_counter("fluxo.messages.dead_lettered")
                .with_description("Messages discarded after exhausting max retries")
                .build(),
            queue_depth: meter
                .u64_gauge("fluxo.queue.depth")
                .with_description("Messages currently stored per topic")
                .build(),
            messages_in_flight: meter
                .u64_gauge("fluxo.messages.in_flight")
                .with_description("Handlers currently running per topic")
                .build(),
        }
    }

    pub(crate) fn record_enqueued(&self, topic: &str, count: u64) {
        self.messages_enqueued
            .add(count, &[KeyValue::new("topic", topic.to_string())]);
    }

    pub(crate) fn record_delivered(&self, topic: &str) {
        self.messages_delivered
            .add(1, &[KeyValue::new("topic", topic.to_string())]);
    }

    pub(crate) fn record_retried(&self, topic: &str) {
        self.messages_retried
            .add(1, &[KeyValue::new("topic", topic.to_string())]);
    }

    pub(crate) fn record_dead_lettered(&self, topic: &str) {
        self.messages_dead_lettered
            .add(1, &[KeyValue::new("topic", topic.to_string())]);
    }

    pub(crate) fn set_queue_depth(&self, topic: &str, depth: u64) {
        self.queue_depth
            .record(depth, &[KeyValue::new("topic", topic.to_string())]);
    }

    pub(crate) fn set_in_flight(&self, topic: &str, count: u64) {
        self.messages_in_flight
            .record(count, &[KeyValue::new("topic", topic.to_string())]);
    }
}

//! Metric name constants and recording helpers

use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};

// Relay metric names
pub const RELAY_CHUNKS_DELIVERED: &str = "relay.chunks.delivered";
pub const RELAY_CREDITS_CHARGED: &str = "relay.credits.charged";
pub const RELAY_STREAMS_ABORTED: &str = "relay.streams.aborted";
pub const RELAY_STREAM_DURATION: &str = "relay.stream.duration";

/// Instrumentation scope for relay instruments
const RELAY_METER: &str = "tutor-relay";

/// Record a duration measurement on a histogram
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[KeyValue]) {
    let duration = start.elapsed().as_secs_f64();
    histogram.record(duration, attributes);
}

/// Instruments recorded by the stream relay
///
/// Built from the global meter provider; every call is a no-op until a
/// provider has been installed by [`crate::init`].
#[derive(Debug, Clone)]
pub struct RelayMetrics {
    chunks_delivered: Counter<u64>,
    credits_charged: Counter<u64>,
    streams_aborted: Counter<u64>,
    stream_duration: Histogram<f64>,
}

impl RelayMetrics {
    pub fn global() -> Self {
        let meter = opentelemetry::global::meter(RELAY_METER);

        Self {
            chunks_delivered: meter
                .u64_counter(RELAY_CHUNKS_DELIVERED)
                .with_description("Chunks handed to clients")
                .build(),
            credits_charged: meter
                .u64_counter(RELAY_CREDITS_CHARGED)
                .with_description("Credits deducted for delivered responses")
                .build(),
            streams_aborted: meter
                .u64_counter(RELAY_STREAMS_ABORTED)
                .with_description("Responses that ended in the aborted state")
                .build(),
            stream_duration: meter
                .f64_histogram(RELAY_STREAM_DURATION)
                .with_description("Wall time of one relayed response")
                .with_unit("s")
                .build(),
        }
    }

    pub fn chunk_delivered(&self, mode: &'static str) {
        self.chunks_delivered.add(1, &[KeyValue::new("mode", mode)]);
    }

    pub fn credits_charged(&self, mode: &'static str, credits: u32) {
        self.credits_charged
            .add(u64::from(credits), &[KeyValue::new("mode", mode)]);
    }

    /// Record the end of a response
    pub fn stream_finished(&self, mode: &'static str, start: Instant, aborted: bool) {
        let attributes = [KeyValue::new("mode", mode), KeyValue::new("aborted", aborted)];
        if aborted {
            self.streams_aborted.add(1, &attributes[..1]);
        }
        record_duration(&self.stream_duration, start, &attributes);
    }
}

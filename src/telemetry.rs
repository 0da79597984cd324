//! Pipeline telemetry.
//!
//! The orchestrator and poller report counters/timings through this trait so
//! that tests can assert on a recording double instead of standing up a
//! metrics backend. The production implementation emits through the
//! `metrics` facade, the same crate the mesh health monitor exposes counters
//! and gauges through.

use std::time::Duration;

/// Emits operational counters and timings for one pipeline run.
pub trait Telemetry: Send + Sync {
    fn file_discovered(&self, source_name: &str);
    fn event_enqueued(&self, source_name: &str);
    fn event_processed(&self, destination_count: usize, duration: Duration);
    fn event_failed(&self, error_code: &str);
    fn event_dead_lettered(&self, error_code: &str);
    fn queue_depth(&self, depth: u64);
}

/// Production telemetry backed by the `metrics` crate. Exporters (Prometheus,
/// statsd, ...) are installed by the composition root, not by this type.
pub struct MetricsTelemetry;

impl Telemetry for MetricsTelemetry {
    fn file_discovered(&self, source_name: &str) {
        metrics::counter!("filehorizon_files_discovered_total", "source" => source_name.to_string())
            .increment(1);
    }

    fn event_enqueued(&self, source_name: &str) {
        metrics::counter!("filehorizon_events_enqueued_total", "source" => source_name.to_string())
            .increment(1);
    }

    fn event_processed(&self, destination_count: usize, duration: Duration) {
        metrics::counter!("filehorizon_events_processed_total").increment(1);
        metrics::histogram!("filehorizon_event_duration_seconds").record(duration.as_secs_f64());
        metrics::gauge!("filehorizon_last_event_destination_count").set(destination_count as f64);
    }

    fn event_failed(&self, error_code: &str) {
        metrics::counter!("filehorizon_events_failed_total", "code" => error_code.to_string())
            .increment(1);
    }

    fn event_dead_lettered(&self, error_code: &str) {
        metrics::counter!("filehorizon_events_dead_lettered_total", "code" => error_code.to_string())
            .increment(1);
    }

    fn queue_depth(&self, depth: u64) {
        metrics::gauge!("filehorizon_queue_depth").set(depth as f64);
    }
}

/// No-op implementation for unit tests that don't care about telemetry.
#[derive(Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn file_discovered(&self, _source_name: &str) {}
    fn event_enqueued(&self, _source_name: &str) {}
    fn event_processed(&self, _destination_count: usize, _duration: Duration) {}
    fn event_failed(&self, _error_code: &str) {}
    fn event_dead_lettered(&self, _error_code: &str) {}
    fn queue_depth(&self, _depth: u64) {}
}

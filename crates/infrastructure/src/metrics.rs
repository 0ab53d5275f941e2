use std::time::Instant;

/// Thin wrapper over the `metrics` facade; exporter wiring is left to the
/// embedding process.
#[derive(Debug, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    pub fn record_store_operation(&self, operation: &'static str, started: Instant) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("store_operation_duration_ms", "operation" => operation)
            .record(elapsed_ms);
    }

    pub fn record_store_error(&self, operation: &'static str) {
        metrics::counter!("store_operation_errors_total", "operation" => operation).increment(1);
    }

    pub fn record_event(&self, name: &'static str) {
        metrics::counter!("lifecycle_events_total", "event" => name).increment(1);
    }
}

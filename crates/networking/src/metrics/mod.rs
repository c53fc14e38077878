// Path: crates/networking/src/metrics/mod.rs
use meridian_telemetry::sinks::{correlation_metrics, CorrelationMetricsSink};
use once_cell::sync::OnceCell;

/// Overrides the process-wide sink for correlation-table metrics only.
pub static SINK: OnceCell<&'static dyn CorrelationMetricsSink> = OnceCell::new();

pub fn metrics() -> &'static dyn CorrelationMetricsSink {
    SINK.get().copied().unwrap_or_else(correlation_metrics)
}

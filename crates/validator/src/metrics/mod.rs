// Path: crates/validator/src/metrics/mod.rs
//! Static accessors for validator-specific metrics sinks.
//!
//! The reconciler and fetcher record through these accessors. A sink set here
//! takes precedence over the process-wide one installed by `meridian-telemetry`.

use meridian_telemetry::sinks::{error_metrics, sync_metrics, ErrorMetricsSink, SyncMetricsSink};
use once_cell::sync::OnceCell;

/// A lazily-initialized static reference to the reconciler's metrics sink.
pub static SYNC_SINK: OnceCell<&'static dyn SyncMetricsSink> = OnceCell::new();
/// A lazily-initialized static reference to the reconciler's error sink.
pub static ERROR_SINK: OnceCell<&'static dyn ErrorMetricsSink> = OnceCell::new();

/// Returns the configured reconciliation metrics sink.
pub fn reconciler_metrics() -> &'static dyn SyncMetricsSink {
    SYNC_SINK.get().copied().unwrap_or_else(sync_metrics)
}

/// Returns the configured error metrics sink.
pub fn reconciler_errors() -> &'static dyn ErrorMetricsSink {
    ERROR_SINK.get().copied().unwrap_or_else(error_metrics)
}

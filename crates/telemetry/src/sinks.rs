// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns the configured cycle-scheduler sink, or a no-op sink.
pub fn consensus_metrics() -> &'static dyn ConsensusMetricsSink {
    match SINK.get().copied() {
        Some(sink) => sink.as_consensus(),
        None => &NOP_SINK,
    }
}

/// Returns the configured correlation-table sink, or a no-op sink.
pub fn correlation_metrics() -> &'static dyn CorrelationMetricsSink {
    match SINK.get().copied() {
        Some(sink) => sink.as_correlation(),
        None => &NOP_SINK,
    }
}

/// Returns the configured synchronisation sink, or a no-op sink.
pub fn sync_metrics() -> &'static dyn SyncMetricsSink {
    match SINK.get().copied() {
        Some(sink) => sink.as_sync(),
        None => &NOP_SINK,
    }
}

/// Returns the configured error metrics sink, or a no-op sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    match SINK.get().copied() {
        Some(sink) => sink.as_error(),
        None => &NOP_SINK,
    }
}

// --- Trait Definitions ---

/// A sink for metrics emitted by the cycle scheduler.
pub trait ConsensusMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of phase windows emitted, labeled by phase and status.
    fn inc_phases_emitted(&self, phase: &'static str, status: &'static str);
    /// Increments the counter of phase windows skipped after a forward clock jump.
    fn inc_phases_skipped(&self, count: u64);
    /// Observes how late a phase was emitted relative to its scheduled start.
    fn observe_timer_lag(&self, lag_secs: f64);
    /// Sets the gauge for the current cycle number.
    fn set_current_cycle(&self, cycle: u64);
}
impl ConsensusMetricsSink for NopSink {
    fn inc_phases_emitted(&self, _phase: &'static str, _status: &'static str) {}
    fn inc_phases_skipped(&self, _count: u64) {}
    fn observe_timer_lag(&self, _lag_secs: f64) {}
    fn set_current_cycle(&self, _cycle: u64) {}
}

/// A sink for metrics emitted by the request/response correlation table.
pub trait CorrelationMetricsSink: Send + Sync + std::fmt::Debug {
    /// Sets the gauge for the number of live pending correlations.
    fn set_pending_correlations(&self, count: usize);
    /// Increments the counter of responses matched to a pending request.
    fn inc_correlations_matched(&self);
    /// Increments the counter of evicted correlations, labeled by reason.
    fn inc_correlations_evicted(&self, reason: &'static str);
    /// Increments the counter of responses that matched nothing.
    fn inc_unsolicited_responses(&self);
}
impl CorrelationMetricsSink for NopSink {
    fn set_pending_correlations(&self, _count: usize) {}
    fn inc_correlations_matched(&self) {}
    fn inc_correlations_evicted(&self, _reason: &'static str) {}
    fn inc_unsolicited_responses(&self) {}
}

/// A sink for metrics emitted by chain walks and ledger reconciliation.
pub trait SyncMetricsSink: Send + Sync + std::fmt::Debug {
    /// Observes the number of digests yielded by a chain walk.
    fn observe_walk_length(&self, len: usize);
    /// Increments a counter of chain walk terminations, labeled by outcome.
    fn inc_walk_outcome(&self, outcome: &'static str);
    /// Increments the counter of deltas fetched from peers.
    fn inc_deltas_fetched(&self);
    /// Increments the counter of deltas applied to local state.
    fn inc_deltas_applied(&self);
    /// Sets a gauge vector to indicate the reconciler's current state.
    fn set_reconciler_state(&self, state: &'static str);
    /// Observes the wall time of one reconciliation attempt.
    fn observe_reconcile_duration(&self, duration_secs: f64);
}
impl SyncMetricsSink for NopSink {
    fn observe_walk_length(&self, _len: usize) {}
    fn inc_walk_outcome(&self, _outcome: &'static str) {}
    fn inc_deltas_fetched(&self) {}
    fn inc_deltas_applied(&self) {}
    fn set_reconciler_state(&self, _state: &'static str) {}
    fn observe_reconcile_duration(&self, _duration_secs: f64) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its kind and code.
    fn inc_error(&self, kind: &'static str, code: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _code: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a single
/// point of implementation for metrics backends like Prometheus.
pub trait MetricsSink:
    ConsensusMetricsSink + CorrelationMetricsSink + SyncMetricsSink + ErrorMetricsSink
{
    /// Views this sink as its cycle-scheduler facet.
    fn as_consensus(&self) -> &dyn ConsensusMetricsSink;
    /// Views this sink as its correlation-table facet.
    fn as_correlation(&self) -> &dyn CorrelationMetricsSink;
    /// Views this sink as its synchronisation facet.
    fn as_sync(&self) -> &dyn SyncMetricsSink;
    /// Views this sink as its error facet.
    fn as_error(&self) -> &dyn ErrorMetricsSink;
}

// Blanket implementation so any type implementing every facet is a `MetricsSink`.
impl<T> MetricsSink for T
where
    T: ConsensusMetricsSink + CorrelationMetricsSink + SyncMetricsSink + ErrorMetricsSink,
{
    fn as_consensus(&self) -> &dyn ConsensusMetricsSink {
        self
    }
    fn as_correlation(&self) -> &dyn CorrelationMetricsSink {
        self
    }
    fn as_sync(&self) -> &dyn SyncMetricsSink {
        self
    }
    fn as_error(&self) -> &dyn ErrorMetricsSink {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_fall_back_to_nop() {
        // Nothing installs a sink in this test binary.
        consensus_metrics().inc_phases_emitted("Voting", "Producing");
        correlation_metrics().inc_correlations_evicted("expired");
        sync_metrics().set_reconciler_state("Synced");
        error_metrics().inc_error("cycle", "CYCLE_CLOSED");
        assert!(format!("{:?}", consensus_metrics()).contains("NopSink"));
    }
}

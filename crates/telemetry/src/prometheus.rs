// Path: crates/telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge_vec, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec,
    IntGauge,
};

/// Every collector this crate registers. Created once by [`install`].
struct Metrics {
    cycle_phases_emitted_total: IntCounterVec,
    cycle_phases_skipped_total: IntCounter,
    cycle_timer_lag_seconds: Histogram,
    cycle_current: IntGauge,
    correlation_pending: IntGauge,
    correlation_matched_total: IntCounter,
    correlation_evicted_total: IntCounterVec,
    correlation_unsolicited_total: IntCounter,
    sync_walk_length: Histogram,
    sync_walk_outcome_total: IntCounterVec,
    sync_deltas_fetched_total: IntCounter,
    sync_deltas_applied_total: IntCounter,
    sync_reconciler_state: GaugeVec,
    sync_reconcile_duration_seconds: Histogram,
    errors_total: IntCounterVec,
}

static METRICS: OnceCell<Metrics> = OnceCell::new();

/// The reconciler states exported on the state gauge vector.
const RECONCILER_STATES: [&str; 6] = ["Idle", "Reconciling", "Synced", "Stalled", "Diverged", "Failed"];

impl Metrics {
    fn register() -> Result<Self, prometheus::Error> {
        Ok(Self {
            cycle_phases_emitted_total: register_int_counter_vec!(
                "meridian_cycle_phases_emitted_total",
                "Total phase windows emitted by the cycle scheduler.",
                &["phase", "status"]
            )?,
            cycle_phases_skipped_total: register_int_counter!(
                "meridian_cycle_phases_skipped_total",
                "Total phase windows skipped after forward clock jumps."
            )?,
            cycle_timer_lag_seconds: register_histogram!(
                "meridian_cycle_timer_lag_seconds",
                "Delay between a phase's scheduled start and its emission.",
                exponential_buckets(0.001, 2.0, 14)?
            )?,
            cycle_current: register_int_gauge!(
                "meridian_cycle_current",
                "Number of whole cycles elapsed since the schedule epoch."
            )?,
            correlation_pending: register_int_gauge!(
                "meridian_correlation_pending",
                "Current number of requests awaiting a response."
            )?,
            correlation_matched_total: register_int_counter!(
                "meridian_correlation_matched_total",
                "Total responses matched to a pending request."
            )?,
            correlation_evicted_total: register_int_counter_vec!(
                "meridian_correlation_evicted_total",
                "Total pending requests evicted without a response.",
                &["reason"]
            )?,
            correlation_unsolicited_total: register_int_counter!(
                "meridian_correlation_unsolicited_total",
                "Total responses that matched no pending request."
            )?,
            sync_walk_length: register_histogram!(
                "meridian_sync_walk_length",
                "Number of digests yielded per chain walk.",
                exponential_buckets(1.0, 2.0, 16)?
            )?,
            sync_walk_outcome_total: register_int_counter_vec!(
                "meridian_sync_walk_outcome_total",
                "Chain walk terminations by outcome.",
                &["outcome"]
            )?,
            sync_deltas_fetched_total: register_int_counter!(
                "meridian_sync_deltas_fetched_total",
                "Total deltas obtained from peers."
            )?,
            sync_deltas_applied_total: register_int_counter!(
                "meridian_sync_deltas_applied_total",
                "Total deltas applied to local state."
            )?,
            sync_reconciler_state: register_gauge_vec!(
                "meridian_sync_reconciler_state",
                "Current reconciler state (1 if active, 0 otherwise).",
                &["state"]
            )?,
            sync_reconcile_duration_seconds: register_histogram!(
                "meridian_sync_reconcile_duration_seconds",
                "Wall time of one reconciliation attempt.",
                exponential_buckets(0.001, 2.0, 16)?
            )?,
            errors_total: register_int_counter_vec!(
                "meridian_errors_total",
                "Total number of errors, categorized by kind and code.",
                &["kind", "code"]
            )?,
        })
    }
}

/// The Prometheus-backed sink. Calls made before [`install`] are dropped.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

static PROMETHEUS_SINK: PrometheusSink = PrometheusSink;

fn with_metrics(f: impl FnOnce(&Metrics)) {
    if let Some(m) = METRICS.get() {
        f(m);
    }
}

impl ConsensusMetricsSink for PrometheusSink {
    fn inc_phases_emitted(&self, phase: &'static str, status: &'static str) {
        with_metrics(|m| {
            m.cycle_phases_emitted_total
                .with_label_values(&[phase, status])
                .inc()
        });
    }
    fn inc_phases_skipped(&self, count: u64) {
        with_metrics(|m| m.cycle_phases_skipped_total.inc_by(count));
    }
    fn observe_timer_lag(&self, lag_secs: f64) {
        with_metrics(|m| m.cycle_timer_lag_seconds.observe(lag_secs));
    }
    fn set_current_cycle(&self, cycle: u64) {
        with_metrics(|m| m.cycle_current.set(i64::try_from(cycle).unwrap_or(i64::MAX)));
    }
}

impl CorrelationMetricsSink for PrometheusSink {
    fn set_pending_correlations(&self, count: usize) {
        with_metrics(|m| {
            m.correlation_pending
                .set(i64::try_from(count).unwrap_or(i64::MAX))
        });
    }
    fn inc_correlations_matched(&self) {
        with_metrics(|m| m.correlation_matched_total.inc());
    }
    fn inc_correlations_evicted(&self, reason: &'static str) {
        with_metrics(|m| {
            m.correlation_evicted_total
                .with_label_values(&[reason])
                .inc()
        });
    }
    fn inc_unsolicited_responses(&self) {
        with_metrics(|m| m.correlation_unsolicited_total.inc());
    }
}

impl SyncMetricsSink for PrometheusSink {
    fn observe_walk_length(&self, len: usize) {
        with_metrics(|m| m.sync_walk_length.observe(len as f64));
    }
    fn inc_walk_outcome(&self, outcome: &'static str) {
        with_metrics(|m| {
            m.sync_walk_outcome_total
                .with_label_values(&[outcome])
                .inc()
        });
    }
    fn inc_deltas_fetched(&self) {
        with_metrics(|m| m.sync_deltas_fetched_total.inc());
    }
    fn inc_deltas_applied(&self) {
        with_metrics(|m| m.sync_deltas_applied_total.inc());
    }
    fn set_reconciler_state(&self, state: &'static str) {
        with_metrics(|m| {
            for candidate in RECONCILER_STATES {
                m.sync_reconciler_state
                    .with_label_values(&[candidate])
                    .set(if candidate == state { 1.0 } else { 0.0 });
            }
        });
    }
    fn observe_reconcile_duration(&self, duration_secs: f64) {
        with_metrics(|m| m.sync_reconcile_duration_seconds.observe(duration_secs));
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, code: &'static str) {
        with_metrics(|m| m.errors_total.with_label_values(&[kind, code]).inc());
    }
}

/// Registers every collector with the default Prometheus registry and returns
/// the sink. Calling it again returns the same sink without re-registering.
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    METRICS.get_or_try_init(Metrics::register)?;
    Ok(&PROMETHEUS_SINK)
}

/// Like [`install`], and also makes the sink the process-wide default
/// returned by the accessors in [`crate::sinks`].
pub fn install_global() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    let sink = install()?;
    // A sink that is already set stays in place.
    let _ = SINK.set(sink);
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_idempotent_and_records() {
        let sink = install().unwrap();
        let again = install().unwrap();
        sink.as_correlation().inc_correlations_evicted("expired");
        again.as_correlation().inc_correlations_evicted("expired");
        sink.as_sync().set_reconciler_state("Stalled");

        let m = METRICS.get().unwrap();
        assert_eq!(
            m.correlation_evicted_total
                .with_label_values(&["expired"])
                .get(),
            2
        );
        assert_eq!(
            m.sync_reconciler_state
                .with_label_values(&["Stalled"])
                .get(),
            1.0
        );
        assert_eq!(
            m.sync_reconciler_state.with_label_values(&["Synced"]).get(),
            0.0
        );
    }
}

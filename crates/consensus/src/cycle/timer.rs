// Path: crates/consensus/src/cycle/timer.rs
use meridian_api::clock::Clock;
use meridian_api::delta::LatestDeltaProvider;
use meridian_telemetry::consensus_metrics;
use meridian_types::app::{CycleSchedule, Phase, PhaseName, PhaseStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// The state owned by the timer task.
pub(super) struct PhaseTimer {
    pub(super) schedule: CycleSchedule,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) latest: Option<Arc<dyn LatestDeltaProvider>>,
    pub(super) phases: broadcast::Sender<Phase>,
    pub(super) current: Arc<watch::Sender<Option<Phase>>>,
}

impl PhaseTimer {
    pub(super) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let max_sleep_ms = u64::try_from(
            self.schedule
                .configuration()
                .max_timer_sleep()
                .as_millis(),
        )
        .unwrap_or(u64::MAX);
        let started_ms = self.clock.now_ms();
        let Some(mut next) = self.schedule.first_boundary_at_or_after(started_ms) else {
            tracing::error!(target: "cycle", now_ms = started_ms, "No phase boundary could be computed; timer not started");
            return;
        };
        tracing::info!(
            target: "cycle",
            epoch_ms = self.schedule.epoch_ms(),
            cycle_ms = self.schedule.configuration().cycle_ms(),
            first = %next,
            "Cycle scheduler started"
        );

        let mut last_ordinal: Option<u64> = None;
        let mut last_seen_ms = started_ms;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let now = self.clock.now_ms();
            if now < last_seen_ms {
                tracing::warn!(
                    target: "cycle",
                    moved_back_ms = last_seen_ms - now,
                    waiting_for = %next,
                    "Wall clock moved backwards; holding until the next boundary"
                );
            }
            last_seen_ms = now;

            if now < next.utc_start_ms {
                let wait_ms = (next.utc_start_ms - now).min(max_sleep_ms);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
                continue;
            }

            if now >= next.utc_end_ms {
                // The clock jumped forward over whole windows. Resume at the
                // window that is active now instead of replaying the ones missed.
                let Some(current) = self.schedule.phase_at(now) else {
                    break;
                };
                let skipped = current.ordinal().saturating_sub(next.ordinal());
                tracing::warn!(
                    target: "cycle",
                    skipped,
                    from = %next,
                    to = %current,
                    "Wall clock jumped forward; skipping phase windows"
                );
                consensus_metrics().inc_phases_skipped(skipped);
                next = current;
            }

            self.emit(&next, now, &mut last_ordinal);
            match self.schedule.following(&next) {
                Some(following) => next = following,
                None => break,
            }
        }
        tracing::debug!(target: "cycle", "Cycle timer stopped");
    }

    fn emit(&self, window: &Phase, now_ms: u64, last_ordinal: &mut Option<u64>) {
        let mut phase = window.clone();
        phase.previous_delta = self.latest.as_ref().and_then(|p| p.latest_delta_digest());

        let ordinal = phase.ordinal();
        if let Some(last) = *last_ordinal {
            if ordinal <= last {
                tracing::error!(
                    target: "cycle",
                    ordinal,
                    last,
                    phase = %phase,
                    "Refusing to emit a phase out of order"
                );
                debug_assert!(ordinal > last, "phase {phase} emitted out of order");
                return;
            }
        }
        *last_ordinal = Some(ordinal);

        let lag_ms = now_ms.saturating_sub(phase.utc_start_ms);
        let metrics = consensus_metrics();
        metrics.inc_phases_emitted(phase.name.as_str(), phase.status.as_str());
        metrics.observe_timer_lag(lag_ms as f64 / 1_000.0);

        if phase.name == PhaseName::Construction && phase.status == PhaseStatus::Producing {
            metrics.set_current_cycle(phase.cycle);
            tracing::debug!(
                target: "cycle",
                cycle = phase.cycle,
                next_cycle_ms = phase
                    .utc_start_ms
                    .saturating_add(self.schedule.configuration().cycle_ms()),
                "Cycle started"
            );
        }
        tracing::info!(
            target: "cycle",
            phase = %phase.name,
            status = %phase.status,
            cycle = phase.cycle,
            start_ms = phase.utc_start_ms,
            end_ms = phase.utc_end_ms,
            previous_delta = ?phase.previous_delta,
            lag_ms,
            "Phase changed"
        );

        self.current.send_replace(Some(phase.clone()));
        // Having no subscribers is fine. Slow subscribers lag instead of blocking.
        let _ = self.phases.send(phase);
    }
}

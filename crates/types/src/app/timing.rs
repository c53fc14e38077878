// Path: crates/types/src/app/timing.rs
//! Deterministic cycle timing.
//!
//! The active phase is a pure function of wall-clock time, the cycle
//! configuration and the epoch. Every node evaluating these functions with the
//! same inputs gets the same answer, which is what keeps independent schedulers
//! in lockstep without exchanging messages.

use crate::app::{Phase, PhaseName, PhaseStatus};
use crate::config::{CycleConfiguration, SlotOffset};

/// A cycle configuration anchored to a concrete epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSchedule {
    config: CycleConfiguration,
    epoch_ms: u64,
}

impl CycleSchedule {
    /// Anchors `config` at `epoch_ms` (milliseconds since the Unix epoch).
    pub fn new(config: CycleConfiguration, epoch_ms: u64) -> Self {
        Self { config, epoch_ms }
    }

    /// The underlying configuration.
    pub fn configuration(&self) -> &CycleConfiguration {
        &self.config
    }

    /// The anchor instant in milliseconds since the Unix epoch.
    pub fn epoch_ms(&self) -> u64 {
        self.epoch_ms
    }

    /// The window active at `now_ms`, or `None` before the epoch.
    ///
    /// The returned phase has no `previous_delta`; that is filled in by whoever
    /// emits it.
    pub fn phase_at(&self, now_ms: u64) -> Option<Phase> {
        let elapsed = now_ms.checked_sub(self.epoch_ms)?;
        let cycle_ms = self.config.cycle_ms();
        let cycle = elapsed / cycle_ms;
        let within = elapsed % cycle_ms;
        let cycle_start = self.epoch_ms.saturating_add(cycle.saturating_mul(cycle_ms));

        let slot = self
            .config
            .slots()
            .iter()
            .find(|s| s.start_ms <= within && within < s.end_ms)?;
        Some(to_phase(slot, cycle, cycle_start))
    }

    /// The first window whose start is at or after `now_ms`.
    ///
    /// A scheduler started mid-window waits for this boundary rather than
    /// emitting the window it joined part way through.
    pub fn first_boundary_at_or_after(&self, now_ms: u64) -> Option<Phase> {
        if now_ms < self.epoch_ms {
            return self.phase_at(self.epoch_ms);
        }
        let current = self.phase_at(now_ms)?;
        if current.utc_start_ms == now_ms {
            Some(current)
        } else {
            self.phase_at(current.utc_end_ms)
        }
    }

    /// The window immediately following `phase`.
    pub fn following(&self, phase: &Phase) -> Option<Phase> {
        self.phase_at(phase.utc_end_ms)
    }

    /// Milliseconds from `now_ms` until the next Construction/Producing boundary.
    pub fn time_until_next_cycle(&self, now_ms: u64) -> u64 {
        match now_ms.checked_sub(self.epoch_ms) {
            None => self.epoch_ms - now_ms,
            Some(elapsed) => {
                let cycle_ms = self.config.cycle_ms();
                let within = elapsed % cycle_ms;
                if within == 0 {
                    0
                } else {
                    cycle_ms - within
                }
            }
        }
    }

    /// The (phase, status) active at `now_ms`, or `None` before the epoch.
    pub fn slot_at(&self, now_ms: u64) -> Option<(PhaseName, PhaseStatus)> {
        self.phase_at(now_ms).map(|p| (p.name, p.status))
    }
}

fn to_phase(slot: &SlotOffset, cycle: u64, cycle_start: u64) -> Phase {
    Phase {
        name: slot.name,
        status: slot.status,
        utc_start_ms: cycle_start.saturating_add(slot.start_ms),
        utc_end_ms: cycle_start.saturating_add(slot.end_ms),
        cycle,
        previous_delta: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CycleConfig, CycleEpoch};
    use std::time::Duration;

    fn thirty_two_second_cycle(epoch_ms: u64) -> CycleSchedule {
        let cfg = CycleConfiguration::uniform(Duration::from_secs(8), 0.5, CycleEpoch::UnixEpoch)
            .unwrap();
        CycleSchedule::new(cfg, epoch_ms)
    }

    #[test]
    fn test_full_cycle_from_zero() {
        let schedule = thirty_two_second_cycle(0);
        let expected = [
            (PhaseName::Construction, PhaseStatus::Producing, 0),
            (PhaseName::Construction, PhaseStatus::Collecting, 4_000),
            (PhaseName::Campaigning, PhaseStatus::Producing, 8_000),
            (PhaseName::Campaigning, PhaseStatus::Collecting, 12_000),
            (PhaseName::Voting, PhaseStatus::Producing, 16_000),
            (PhaseName::Voting, PhaseStatus::Collecting, 20_000),
            (PhaseName::Synchronisation, PhaseStatus::Producing, 24_000),
            (PhaseName::Synchronisation, PhaseStatus::Collecting, 28_000),
            (PhaseName::Construction, PhaseStatus::Producing, 32_000),
        ];

        let mut phase = schedule.phase_at(0).unwrap();
        for (name, status, start) in expected {
            assert_eq!((phase.name, phase.status, phase.utc_start_ms), (name, status, start));
            assert_eq!(phase.duration_ms(), 4_000);
            phase = schedule.following(&phase).unwrap();
        }
        assert_eq!(phase.cycle, 1);
    }

    #[test]
    fn test_phase_at_is_pure_function_of_time() {
        let schedule = thirty_two_second_cycle(1_000);
        // 1_000 + 32_000 * 5 + 17_500 is inside Voting/Producing of cycle 5.
        let p = schedule.phase_at(1_000 + 32_000 * 5 + 17_500).unwrap();
        assert_eq!((p.name, p.status, p.cycle), (PhaseName::Voting, PhaseStatus::Producing, 5));
        assert_eq!(p.utc_start_ms, 1_000 + 32_000 * 5 + 16_000);
        assert_eq!(schedule.phase_at(999), None);
    }

    #[test]
    fn test_first_boundary_at_or_after() {
        let schedule = thirty_two_second_cycle(0);
        let aligned = schedule.first_boundary_at_or_after(8_000).unwrap();
        assert_eq!(aligned.utc_start_ms, 8_000);

        let mid = schedule.first_boundary_at_or_after(9_500).unwrap();
        assert_eq!((mid.name, mid.status), (PhaseName::Campaigning, PhaseStatus::Collecting));
        assert_eq!(mid.utc_start_ms, 12_000);

        let wrap = schedule.first_boundary_at_or_after(31_999).unwrap();
        assert_eq!((wrap.name, wrap.cycle), (PhaseName::Construction, 1));

        let late_epoch = thirty_two_second_cycle(50_000);
        assert_eq!(late_epoch.first_boundary_at_or_after(10).unwrap().utc_start_ms, 50_000);
    }

    #[test]
    fn test_time_until_next_cycle() {
        let schedule = thirty_two_second_cycle(0);
        assert_eq!(schedule.time_until_next_cycle(0), 0);
        assert_eq!(schedule.time_until_next_cycle(30_000), 2_000);
        assert_eq!(schedule.time_until_next_cycle(32_001), 31_999);
    }

    #[test]
    fn test_status_never_moves_backwards_for_any_split() {
        for fraction in [0.1, 0.33, 0.5, 0.9] {
            let cfg = CycleConfig {
                construction_ms: 700,
                campaigning_ms: 1_300,
                voting_ms: 2_100,
                synchronisation_ms: 900,
                producing_fraction: fraction,
                ..CycleConfig::default()
            }
            .validate()
            .unwrap();
            let schedule = CycleSchedule::new(cfg, 0);
            let mut phase = schedule.phase_at(0).unwrap();
            for _ in 0..40 {
                let next = schedule.following(&phase).unwrap();
                assert_eq!(next.ordinal(), phase.ordinal() + 1);
                assert_eq!(next.utc_start_ms, phase.utc_end_ms);
                if next.name == phase.name {
                    assert_eq!(phase.status, PhaseStatus::Producing);
                    assert_eq!(next.status, PhaseStatus::Collecting);
                } else {
                    assert_eq!(next.name, phase.name.next());
                    assert_eq!(next.status, PhaseStatus::Producing);
                }
                phase = next;
            }
        }
    }
}

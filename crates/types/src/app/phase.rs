// Path: crates/types/src/app/phase.rs
//! The phases of a consensus cycle.

use crate::app::Digest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four stages of a consensus cycle, in cycle order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseName {
    /// Nodes build their candidate deltas.
    Construction,
    /// Nodes exchange candidates.
    Campaigning,
    /// Nodes vote on the favourite candidate.
    Voting,
    /// Nodes converge on and confirm the winning delta.
    Synchronisation,
}

impl PhaseName {
    /// All phases in the order they occur within a cycle.
    pub const ALL: [PhaseName; 4] = [
        PhaseName::Construction,
        PhaseName::Campaigning,
        PhaseName::Voting,
        PhaseName::Synchronisation,
    ];

    /// Zero-based position within the cycle.
    pub fn index(self) -> usize {
        match self {
            PhaseName::Construction => 0,
            PhaseName::Campaigning => 1,
            PhaseName::Voting => 2,
            PhaseName::Synchronisation => 3,
        }
    }

    /// A stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseName::Construction => "Construction",
            PhaseName::Campaigning => "Campaigning",
            PhaseName::Voting => "Voting",
            PhaseName::Synchronisation => "Synchronisation",
        }
    }

    /// The phase that follows this one, wrapping around at the end of the cycle.
    pub fn next(self) -> PhaseName {
        match self {
            PhaseName::Construction => PhaseName::Campaigning,
            PhaseName::Campaigning => PhaseName::Voting,
            PhaseName::Voting => PhaseName::Synchronisation,
            PhaseName::Synchronisation => PhaseName::Construction,
        }
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-status of a phase. Every phase starts `Producing` and ends `Collecting`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseStatus {
    /// The node emits its own contribution for the phase.
    Producing,
    /// The node gathers contributions from its peers.
    Collecting,
}

impl PhaseStatus {
    /// A stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Producing => "Producing",
            PhaseStatus::Collecting => "Collecting",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of one phase window, as emitted by the cycle scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// Which stage of the cycle this is.
    pub name: PhaseName,
    /// Whether this is the producing or the collecting half of the stage.
    pub status: PhaseStatus,
    /// Start of the window, in milliseconds since the Unix epoch.
    pub utc_start_ms: u64,
    /// End of the window (exclusive), in milliseconds since the Unix epoch.
    pub utc_end_ms: u64,
    /// Number of whole cycles elapsed since the schedule epoch.
    pub cycle: u64,
    /// The latest confirmed delta known when the window opened.
    pub previous_delta: Option<Digest>,
}

impl Phase {
    /// Number of sub-status slots in one cycle.
    pub const SLOTS_PER_CYCLE: u64 = 8;

    /// A strictly increasing position for this window across all cycles.
    ///
    /// Two phases emitted by one scheduler always satisfy `a.ordinal() < b.ordinal()`
    /// when `a` was emitted first.
    pub fn ordinal(&self) -> u64 {
        let slot = slot_index(self.name, self.status);
        self.cycle
            .saturating_mul(Self::SLOTS_PER_CYCLE)
            .saturating_add(slot)
    }

    /// Length of the window in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.utc_end_ms.saturating_sub(self.utc_start_ms)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@cycle{} [{}..{})",
            self.name, self.status, self.cycle, self.utc_start_ms, self.utc_end_ms
        )
    }
}

/// Position of a (phase, status) pair within a cycle, 0..8.
pub fn slot_index(name: PhaseName, status: PhaseStatus) -> u64 {
    let half = match status {
        PhaseStatus::Producing => 0,
        PhaseStatus::Collecting => 1,
    };
    (name.index() as u64) * 2 + half
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_wraps() {
        let mut name = PhaseName::Construction;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(name);
            name = name.next();
        }
        assert_eq!(
            seen,
            vec![
                PhaseName::Construction,
                PhaseName::Campaigning,
                PhaseName::Voting,
                PhaseName::Synchronisation,
                PhaseName::Construction,
            ]
        );
        for (i, p) in PhaseName::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }

    #[test]
    fn test_ordinal_is_monotonic_across_cycles() {
        let mk = |cycle, name, status| Phase {
            name,
            status,
            utc_start_ms: 0,
            utc_end_ms: 0,
            cycle,
            previous_delta: None,
        };
        let last_of_first = mk(0, PhaseName::Synchronisation, PhaseStatus::Collecting);
        let first_of_second = mk(1, PhaseName::Construction, PhaseStatus::Producing);
        assert_eq!(last_of_first.ordinal(), 7);
        assert_eq!(first_of_second.ordinal(), 8);
        assert!(
            mk(3, PhaseName::Voting, PhaseStatus::Producing).ordinal()
                < mk(3, PhaseName::Voting, PhaseStatus::Collecting).ordinal()
        );
    }
}

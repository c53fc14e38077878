// Path: crates/types/src/config/cycle.rs
//! Configuration of the consensus cycle.

use crate::app::{PhaseName, PhaseStatus};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The instant a cycle schedule counts from.
///
/// Every node that must agree on the current phase has to use the same epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CycleEpoch {
    /// Midnight 1 January 1970 UTC.
    #[default]
    UnixEpoch,
    /// A fixed, externally agreed instant in milliseconds since the Unix epoch.
    AtMillis(u64),
    /// The wall-clock time at which the scheduler was created. Only suitable
    /// for single-node deployments and tests.
    ProcessStart,
}

/// Raw, deserializable cycle settings. Turned into a [`CycleConfiguration`] by
/// validation before use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleConfig {
    /// Duration of the Construction phase in milliseconds.
    #[serde(default = "default_phase_ms")]
    pub construction_ms: u64,
    /// Duration of the Campaigning phase in milliseconds.
    #[serde(default = "default_phase_ms")]
    pub campaigning_ms: u64,
    /// Duration of the Voting phase in milliseconds.
    #[serde(default = "default_phase_ms")]
    pub voting_ms: u64,
    /// Duration of the Synchronisation phase in milliseconds.
    #[serde(default = "default_phase_ms")]
    pub synchronisation_ms: u64,
    /// Share of each phase spent `Producing`. Must lie strictly between 0 and 1.
    #[serde(default = "default_producing_fraction")]
    pub producing_fraction: f64,
    /// The instant the schedule counts from.
    #[serde(default)]
    pub epoch: CycleEpoch,
    /// Per-subscriber buffer of the phase broadcast channel.
    #[serde(default = "default_phase_channel_capacity")]
    pub phase_channel_capacity: usize,
    /// Longest the timer sleeps before re-reading the clock, in milliseconds.
    #[serde(default = "default_max_timer_sleep_ms")]
    pub max_timer_sleep_ms: u64,
}

fn default_phase_ms() -> u64 {
    8_000
}
fn default_producing_fraction() -> f64 {
    0.5
}
fn default_phase_channel_capacity() -> usize {
    64
}
fn default_max_timer_sleep_ms() -> u64 {
    1_000
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            construction_ms: default_phase_ms(),
            campaigning_ms: default_phase_ms(),
            voting_ms: default_phase_ms(),
            synchronisation_ms: default_phase_ms(),
            producing_fraction: default_producing_fraction(),
            epoch: CycleEpoch::default(),
            phase_channel_capacity: default_phase_channel_capacity(),
            max_timer_sleep_ms: default_max_timer_sleep_ms(),
        }
    }
}

impl CycleConfig {
    /// Validates the settings. Equivalent to `CycleConfiguration::try_from(self)`.
    pub fn validate(&self) -> Result<CycleConfiguration, ConfigError> {
        CycleConfiguration::try_from(self.clone())
    }
}

/// One (phase, status) window expressed as offsets from the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotOffset {
    /// The phase this window belongs to.
    pub name: PhaseName,
    /// The sub-status of the window.
    pub status: PhaseStatus,
    /// Offset of the window start from the cycle start, in milliseconds.
    pub start_ms: u64,
    /// Offset of the window end (exclusive) from the cycle start, in milliseconds.
    pub end_ms: u64,
}

/// A validated, immutable cycle configuration.
///
/// Construction fails fast on zero durations or a producing fraction outside
/// (0, 1), so a value of this type always describes a usable schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleConfiguration {
    durations_ms: [u64; 4],
    producing_fraction: f64,
    epoch: CycleEpoch,
    slots: Vec<SlotOffset>,
    cycle_ms: u64,
    phase_channel_capacity: usize,
    max_timer_sleep_ms: u64,
}

impl CycleConfiguration {
    /// Builds a configuration where every phase has the same duration.
    pub fn uniform(
        phase: Duration,
        producing_fraction: f64,
        epoch: CycleEpoch,
    ) -> Result<Self, ConfigError> {
        let ms = u64::try_from(phase.as_millis()).map_err(|_| ConfigError::InvalidValue {
            field: "phase_duration",
            reason: "does not fit in u64 milliseconds".into(),
        })?;
        Self::try_from(CycleConfig {
            construction_ms: ms,
            campaigning_ms: ms,
            voting_ms: ms,
            synchronisation_ms: ms,
            producing_fraction,
            epoch,
            ..CycleConfig::default()
        })
    }

    /// Duration of the given phase.
    pub fn phase_duration(&self, name: PhaseName) -> Duration {
        Duration::from_millis(self.phase_ms(name))
    }

    fn phase_ms(&self, name: PhaseName) -> u64 {
        self.durations_ms
            .get(name.index())
            .copied()
            .unwrap_or_default()
    }

    /// Share of each phase spent producing.
    pub fn producing_fraction(&self) -> f64 {
        self.producing_fraction
    }

    /// Sum of the four phase durations.
    pub fn cycle_duration(&self) -> Duration {
        Duration::from_millis(self.cycle_ms)
    }

    /// Sum of the four phase durations, in milliseconds.
    pub fn cycle_ms(&self) -> u64 {
        self.cycle_ms
    }

    /// The configured epoch.
    pub fn epoch(&self) -> CycleEpoch {
        self.epoch
    }

    /// The eight (phase, status) windows of one cycle, in order.
    pub fn slots(&self) -> &[SlotOffset] {
        &self.slots
    }

    /// Per-subscriber buffer of the phase broadcast channel.
    pub fn phase_channel_capacity(&self) -> usize {
        self.phase_channel_capacity
    }

    /// Longest the scheduler's timer sleeps before re-reading the clock.
    pub fn max_timer_sleep(&self) -> Duration {
        Duration::from_millis(self.max_timer_sleep_ms)
    }
}

impl TryFrom<CycleConfig> for CycleConfiguration {
    type Error = ConfigError;

    fn try_from(raw: CycleConfig) -> Result<Self, Self::Error> {
        let fraction = raw.producing_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::InvalidProducingFraction(fraction));
        }
        if raw.phase_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "phase_channel_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        if raw.max_timer_sleep_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_timer_sleep_ms",
                reason: "must be greater than zero".into(),
            });
        }

        let durations_ms = [
            raw.construction_ms,
            raw.campaigning_ms,
            raw.voting_ms,
            raw.synchronisation_ms,
        ];

        let mut slots = Vec::with_capacity(8);
        let mut offset: u64 = 0;
        for (name, duration) in PhaseName::ALL.into_iter().zip(durations_ms) {
            if duration == 0 {
                return Err(ConfigError::ZeroPhaseDuration(name));
            }
            // Rounded so that every node derives the same split from the same inputs.
            let producing = (duration as f64 * fraction).round() as u64;
            if producing == 0 || producing >= duration {
                return Err(ConfigError::DegenerateSplit {
                    phase: name,
                    duration_ms: duration,
                });
            }
            let phase_end = offset
                .checked_add(duration)
                .ok_or(ConfigError::InvalidValue {
                    field: "phase durations",
                    reason: "cycle length overflows u64".into(),
                })?;
            slots.push(SlotOffset {
                name,
                status: PhaseStatus::Producing,
                start_ms: offset,
                end_ms: offset + producing,
            });
            slots.push(SlotOffset {
                name,
                status: PhaseStatus::Collecting,
                start_ms: offset + producing,
                end_ms: phase_end,
            });
            offset = phase_end;
        }

        Ok(Self {
            durations_ms,
            producing_fraction: fraction,
            epoch: raw.epoch,
            slots,
            cycle_ms: offset,
            phase_channel_capacity: raw.phase_channel_capacity,
            max_timer_sleep_ms: raw.max_timer_sleep_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_thirty_two_second_cycle() {
        let cfg = CycleConfig::default().validate().unwrap();
        assert_eq!(cfg.cycle_duration(), Duration::from_secs(32));
        assert_eq!(cfg.slots().len(), 8);

        let starts: Vec<u64> = cfg.slots().iter().map(|s| s.start_ms).collect();
        assert_eq!(
            starts,
            vec![0, 4_000, 8_000, 12_000, 16_000, 20_000, 24_000, 28_000]
        );
        assert_eq!(cfg.slots().last().map(|s| s.end_ms), Some(32_000));
    }

    #[test]
    fn test_rejects_zero_duration() {
        let raw = CycleConfig {
            voting_ms: 0,
            ..CycleConfig::default()
        };
        let err = raw.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ZeroPhaseDuration(PhaseName::Voting)));
    }

    #[test]
    fn test_rejects_fraction_outside_open_interval() {
        for fraction in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            let raw = CycleConfig {
                producing_fraction: fraction,
                ..CycleConfig::default()
            };
            assert!(
                matches!(raw.validate(), Err(ConfigError::InvalidProducingFraction(_))),
                "fraction {fraction} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_split_that_rounds_away() {
        let raw = CycleConfig {
            construction_ms: 1,
            producing_fraction: 0.3,
            ..CycleConfig::default()
        };
        assert!(matches!(
            raw.validate(),
            Err(ConfigError::DegenerateSplit {
                phase: PhaseName::Construction,
                ..
            })
        ));
    }

    #[test]
    fn test_uneven_phases_and_split() {
        let raw = CycleConfig {
            construction_ms: 1_000,
            campaigning_ms: 2_000,
            voting_ms: 3_000,
            synchronisation_ms: 4_000,
            producing_fraction: 0.25,
            ..CycleConfig::default()
        };
        let cfg = raw.validate().unwrap();
        assert_eq!(cfg.cycle_ms(), 10_000);
        let voting_collect = cfg
            .slots()
            .iter()
            .find(|s| s.name == PhaseName::Voting && s.status == PhaseStatus::Collecting)
            .copied()
            .unwrap();
        assert_eq!(voting_collect.start_ms, 3_000 + 750);
        assert_eq!(voting_collect.end_ms, 6_000);
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let raw: CycleConfig = toml::from_str(
            r#"
            voting_ms = 6000
            epoch = { at_millis = 1700000000000 }
            "#,
        )
        .unwrap();
        assert_eq!(raw.voting_ms, 6_000);
        assert_eq!(raw.construction_ms, 8_000);
        assert_eq!(raw.epoch, CycleEpoch::AtMillis(1_700_000_000_000));
        assert_eq!(raw.validate().unwrap().cycle_ms(), 30_000);
    }
}

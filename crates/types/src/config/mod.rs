// Path: crates/types/src/config/mod.rs

//! Shared configuration structures for the Meridian core components.
//!
//! Every structure deserializes from TOML or JSON with defaults for omitted
//! fields. Values are checked once, at construction, and components never
//! re-validate them at runtime.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Cycle scheduler configuration.
pub mod cycle;
pub use cycle::*;

/// Settings for the request/response correlation table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrelationConfig {
    /// How long a request may remain unanswered before it is evicted.
    #[serde(default = "default_correlation_ttl_ms")]
    pub ttl_ms: u64,
    /// Maximum number of live entries. The oldest entry is evicted to make room.
    #[serde(default = "default_correlation_capacity")]
    pub capacity: usize,
    /// Per-subscriber buffer of the eviction and reputation broadcast channels.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_correlation_ttl_ms() -> u64 {
    10_000
}
fn default_correlation_capacity() -> usize {
    4_096
}
fn default_event_channel_capacity() -> usize {
    1_024
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_correlation_ttl_ms(),
            capacity: default_correlation_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl CorrelationConfig {
    /// The entry time-to-live as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Checks that every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "correlation.ttl_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "correlation.capacity",
                reason: "must be greater than zero".into(),
            });
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "correlation.event_channel_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// Settings for the ledger reconciler and its network fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Upper bound on the number of links a single chain walk follows.
    #[serde(default = "default_max_walk_depth")]
    pub max_walk_depth: usize,
    /// How many missing deltas one reconciliation may fetch before giving up.
    #[serde(default = "default_max_fetch_rounds")]
    pub max_fetch_rounds: usize,
    /// Delay between attempts while reconciliation is stalled.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// How long to wait for one peer to answer a delta request before asking
    /// the next. The correlation TTL still applies if it is shorter.
    #[serde(default = "default_cache_lookup_timeout_ms")]
    pub cache_lookup_timeout_ms: u64,
    /// Number of distinct peers asked for a missing delta before it counts as unavailable.
    #[serde(default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: usize,
    /// Per-subscriber buffer of the applied-delta broadcast channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_max_walk_depth() -> usize {
    100_000
}
fn default_max_fetch_rounds() -> usize {
    1_024
}
fn default_retry_interval_ms() -> u64 {
    2_000
}
fn default_cache_lookup_timeout_ms() -> u64 {
    5_000
}
fn default_max_fetch_attempts() -> usize {
    3
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_walk_depth: default_max_walk_depth(),
            max_fetch_rounds: default_max_fetch_rounds(),
            retry_interval_ms: default_retry_interval_ms(),
            cache_lookup_timeout_ms: default_cache_lookup_timeout_ms(),
            max_fetch_attempts: default_max_fetch_attempts(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl ReconcilerConfig {
    /// Delay between attempts while stalled.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// How long to wait for one peer to answer a delta request.
    pub fn cache_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_lookup_timeout_ms)
    }

    /// Checks that every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, bool); 5] = [
            ("reconciler.max_walk_depth", self.max_walk_depth > 0),
            ("reconciler.retry_interval_ms", self.retry_interval_ms > 0),
            (
                "reconciler.cache_lookup_timeout_ms",
                self.cache_lookup_timeout_ms > 0,
            ),
            ("reconciler.max_fetch_attempts", self.max_fetch_attempts > 0),
            (
                "reconciler.event_channel_capacity",
                self.event_channel_capacity > 0,
            ),
        ];
        for (field, ok) in checks {
            if !ok {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }
}

/// The complete configuration surface of the core.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CoreConfig {
    /// Cycle scheduler settings.
    #[serde(default)]
    pub cycle: CycleConfig,
    /// Correlation table settings.
    #[serde(default)]
    pub correlation: CorrelationConfig,
    /// Ledger reconciler settings.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

impl CoreConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file. Files ending in `.json` are parsed as JSON,
    /// everything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cycle.validate()?;
        self.correlation.validate()?;
        self.reconciler.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let cfg = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, CoreConfig::default());
        assert_eq!(cfg.correlation.ttl(), Duration::from_secs(10));
    }

    #[test]
    fn test_sections_override_defaults() {
        let cfg = CoreConfig::from_toml_str(
            r#"
            [cycle]
            construction_ms = 2000
            producing_fraction = 0.25

            [correlation]
            ttl_ms = 1500

            [reconciler]
            max_fetch_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cycle.construction_ms, 2_000);
        assert_eq!(cfg.correlation.ttl_ms, 1_500);
        assert_eq!(cfg.correlation.capacity, 4_096);
        assert_eq!(cfg.reconciler.max_fetch_attempts, 5);
    }

    #[test]
    fn test_invalid_sections_fail_fast() {
        let err = CoreConfig::from_toml_str("[cycle]\nproducing_fraction = 1.0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProducingFraction(_)));

        let err = CoreConfig::from_toml_str("[correlation]\nttl_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = CoreConfig::from_toml_str("[cycle]\nvoting_ms = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_json_and_missing_file() {
        let cfg = CoreConfig::from_json_str(r#"{"correlation": {"capacity": 8}}"#).unwrap();
        assert_eq!(cfg.correlation.capacity, 8);

        let err = CoreConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

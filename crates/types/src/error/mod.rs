// Path: crates/types/src/error/mod.rs
//! Core error types for the Meridian ledger core.
//!
//! Expected conditions (a cache miss, an unmatched response, an expired request)
//! are not errors and never appear here. They are reported through return values
//! and event streams.

use crate::app::{CorrelationId, Digest, PhaseName};
use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A phase was configured with a zero duration.
    #[error("Phase {0} has a zero duration")]
    ZeroPhaseDuration(PhaseName),
    /// The producing fraction is not strictly between 0 and 1.
    #[error("Producing fraction must lie strictly between 0 and 1, got {0}")]
    InvalidProducingFraction(f64),
    /// The producing/collecting split of a phase rounds to an empty window.
    #[error("Phase {phase} of {duration_ms}ms cannot be split into non-empty producing and collecting windows")]
    DegenerateSplit {
        /// The affected phase.
        phase: PhaseName,
        /// Its configured duration.
        duration_ms: u64,
    },
    /// A numeric field is out of range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(String),
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::ZeroPhaseDuration(_) => "CONFIG_ZERO_PHASE_DURATION",
            Self::InvalidProducingFraction(_) => "CONFIG_INVALID_PRODUCING_FRACTION",
            Self::DegenerateSplit { .. } => "CONFIG_DEGENERATE_SPLIT",
            Self::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            Self::Parse(_) => "CONFIG_PARSE_ERROR",
            Self::Io(_) => "CONFIG_IO_ERROR",
        }
    }
}

/// Errors from parsing a [`Digest`] out of its hex form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestParseError {
    /// The input is not valid hex.
    #[error("Invalid digest hex: {0}")]
    InvalidHex(String),
    /// The input decodes to the wrong number of bytes.
    #[error("Digest must be {expected} bytes, got {got}")]
    WrongLength {
        /// The digest length.
        expected: usize,
        /// The decoded length.
        got: usize,
    },
}

impl ErrorCode for DigestParseError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidHex(_) => "DIGEST_INVALID_HEX",
            Self::WrongLength { .. } => "DIGEST_WRONG_LENGTH",
        }
    }
}

/// Errors from the cycle scheduler lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    /// `start` was called outside a Tokio runtime.
    #[error("The cycle scheduler must be started from within a Tokio runtime")]
    NoRuntime,
    /// The scheduler has been closed and cannot be restarted.
    #[error("The cycle scheduler has been closed")]
    Closed,
    /// The timer task terminated abnormally.
    #[error("The cycle timer task failed: {0}")]
    TaskFailed(String),
}

impl ErrorCode for CycleError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoRuntime => "CYCLE_NO_RUNTIME",
            Self::Closed => "CYCLE_CLOSED",
            Self::TaskFailed(_) => "CYCLE_TASK_FAILED",
        }
    }
}

/// Errors from the correlation table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// A live entry already exists for this identifier.
    #[error("Correlation {0} is already pending")]
    Duplicate(CorrelationId),
    /// The table has been closed.
    #[error("The correlation table has been closed")]
    Closed,
    /// No Tokio runtime is available to drive expiry timers.
    #[error("The correlation table requires a Tokio runtime")]
    NoRuntime,
}

impl ErrorCode for CorrelationError {
    fn code(&self) -> &'static str {
        match self {
            Self::Duplicate(_) => "CORRELATION_DUPLICATE",
            Self::Closed => "CORRELATION_CLOSED",
            Self::NoRuntime => "CORRELATION_NO_RUNTIME",
        }
    }
}

/// Errors from fetching a missing delta over the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// No peers are available to ask.
    #[error("No peers available to fetch delta {0}")]
    NoPeers(Digest),
    /// Every peer asked either failed or did not answer in time.
    #[error("Delta {0} could not be obtained from any peer")]
    Unavailable(Digest),
    /// A peer returned a delta whose content does not hash to the requested digest.
    #[error("Peer returned delta {got} for requested digest {expected}")]
    DigestMismatch {
        /// The digest that was requested.
        expected: Digest,
        /// The digest of what came back.
        got: Digest,
    },
    /// The transport could not send the request.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The correlation table refused the request.
    #[error("Correlation error: {0}")]
    Correlation(#[from] CorrelationError),
}

impl ErrorCode for FetchError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoPeers(_) => "FETCH_NO_PEERS",
            Self::Unavailable(_) => "FETCH_UNAVAILABLE",
            Self::DigestMismatch { .. } => "FETCH_DIGEST_MISMATCH",
            Self::Transport(_) => "FETCH_TRANSPORT_ERROR",
            Self::Correlation(_) => "FETCH_CORRELATION_ERROR",
        }
    }
}

/// Errors reported by the state-application layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// The delta was rejected by state validation.
    #[error("Delta {digest} rejected: {reason}")]
    Rejected {
        /// The rejected delta.
        digest: Digest,
        /// Why it was rejected.
        reason: String,
    },
    /// The storage backend failed.
    #[error("State backend error: {0}")]
    Backend(String),
}

impl ErrorCode for ApplyError {
    fn code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "APPLY_REJECTED",
            Self::Backend(_) => "APPLY_BACKEND_ERROR",
        }
    }
}

/// Outcomes of a reconciliation attempt that leave the ledger behind the head.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// The chain is broken at `missing` and the delta could not be obtained.
    #[error("Reconciliation stalled: delta {missing} is unavailable")]
    Stalled {
        /// The first digest that could not be resolved.
        missing: Digest,
    },
    /// The head does not descend from the last applied delta.
    #[error("Head {head} does not descend from last applied delta {last_applied}")]
    Diverged {
        /// The announced head.
        head: Digest,
        /// The local last applied delta.
        last_applied: Digest,
    },
    /// The chain walk did not terminate cleanly (cycle or depth limit).
    #[error("Chain walk from {head} is malformed: {reason}")]
    MalformedChain {
        /// The announced head.
        head: Digest,
        /// What went wrong.
        reason: String,
    },
    /// Applying a delta failed.
    #[error("Failed to apply delta: {0}")]
    Apply(#[from] ApplyError),
    /// The reconciliation was superseded by a newer head or shutdown.
    #[error("Reconciliation cancelled")]
    Cancelled,
    /// No Tokio runtime is available to run the reconciler.
    #[error("The ledger reconciler requires a Tokio runtime")]
    NoRuntime,
}

impl ErrorCode for ReconcileError {
    fn code(&self) -> &'static str {
        match self {
            Self::Stalled { .. } => "RECONCILE_STALLED",
            Self::Diverged { .. } => "RECONCILE_DIVERGED",
            Self::MalformedChain { .. } => "RECONCILE_MALFORMED_CHAIN",
            Self::Apply(_) => "RECONCILE_APPLY_FAILED",
            Self::Cancelled => "RECONCILE_CANCELLED",
            Self::NoRuntime => "RECONCILE_NO_RUNTIME",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable_and_messages_render() {
        let err = ConfigError::ZeroPhaseDuration(PhaseName::Voting);
        assert_eq!(err.code(), "CONFIG_ZERO_PHASE_DURATION");
        assert_eq!(err.to_string(), "Phase Voting has a zero duration");

        let err = ReconcileError::Stalled {
            missing: Digest::ZERO,
        };
        assert_eq!(err.code(), "RECONCILE_STALLED");
        assert!(err.to_string().contains(&"0".repeat(64)));

        let err: FetchError = CorrelationError::Closed.into();
        assert_eq!(err.code(), "FETCH_CORRELATION_ERROR");
    }
}

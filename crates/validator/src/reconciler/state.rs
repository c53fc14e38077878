// Path: crates/validator/src/reconciler/state.rs
use meridian_types::app::Digest;

/// The newest delta applied to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedDelta {
    /// Digest of the applied delta.
    pub digest: Digest,
    /// Its height in the chain.
    pub sequence_number: u64,
}

/// Summary of a reconciliation that reached its head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The head now applied.
    pub head: Digest,
    /// Deltas applied on the way.
    pub applied: usize,
    /// Deltas fetched from peers on the way.
    pub fetched: usize,
}

/// Where the reconciler stands relative to the newest confirmed head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerState {
    /// No head has been seen yet.
    Idle,
    /// Walking or applying towards `head`.
    Reconciling {
        /// The head being reconciled.
        head: Digest,
    },
    /// Local state is at `head`.
    Synced {
        /// The head applied.
        head: Digest,
    },
    /// Waiting for `missing` to become available.
    Stalled {
        /// The delta no peer has provided yet.
        missing: Digest,
    },
    /// `head` is not a descendant of the last applied delta.
    Diverged {
        /// The conflicting head.
        head: Digest,
    },
    /// Applying `digest` failed, or the chain leading to it is malformed.
    Failed {
        /// The delta or head concerned.
        digest: Digest,
        /// The error reported.
        reason: String,
    },
}

impl ReconcilerState {
    /// A stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Reconciling { .. } => "Reconciling",
            Self::Synced { .. } => "Synced",
            Self::Stalled { .. } => "Stalled",
            Self::Diverged { .. } => "Diverged",
            Self::Failed { .. } => "Failed",
        }
    }

    /// True once local state matches the head last reconciled.
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }
}

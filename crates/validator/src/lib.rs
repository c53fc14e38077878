// Path: crates/validator/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]
#![deny(missing_docs)]

//! # Meridian Validator
//!
//! Keeps local state in step with the confirmed chain. The
//! [`LedgerReconciler`] walks from the last applied delta to each newly
//! confirmed head and applies what it finds, oldest first, fetching deltas the
//! cache lacks through a [`NetworkDeltaFetcher`].

/// Fetching missing deltas from peers.
pub mod fetcher;
pub mod metrics;
/// Applying the confirmed chain to local state.
pub mod reconciler;

pub use fetcher::{DeltaFetcher, NetworkDeltaFetcher};
pub use reconciler::{AppliedDelta, LedgerReconciler, ReconcileReport, ReconcilerState};

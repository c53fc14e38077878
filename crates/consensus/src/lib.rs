// Path: crates/consensus/src/lib.rs
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
//! Consensus timing for the Meridian ledger core.
//!
//! The [`CycleScheduler`] turns the pure timing rules in
//! `meridian_types::app::timing` into a live stream of [`Phase`] events. Nodes
//! never exchange messages to agree on the current phase; they only share a
//! configuration and an epoch.
//!
//! [`Phase`]: meridian_types::app::Phase

pub mod cycle;

pub use cycle::{CycleScheduler, PhaseObserver};

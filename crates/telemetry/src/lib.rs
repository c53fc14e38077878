// Path: crates/telemetry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Meridian Telemetry
//!
//! Logging setup and metrics plumbing shared by every Meridian crate. Components
//! record through the sink accessors below and never see the backend; a process
//! that wants Prometheus output calls [`prometheus::install_global`] once.

pub mod init;
pub mod prometheus;
/// Per-subsystem metrics sink traits and their process-wide accessors.
pub mod sinks;
pub mod time;

pub use sinks::{consensus_metrics, correlation_metrics, error_metrics, sync_metrics};

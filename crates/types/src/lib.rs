// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]
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

//! # Meridian Types
//!
//! This crate is the foundational library for the Meridian ledger core, containing
//! the shared data structures, error types, and configuration objects.
//!
//! ## Architectural Role
//!
//! As the base crate, `meridian-types` has minimal dependencies and is itself a
//! dependency for every other crate in the workspace. This structure prevents
//! circular dependencies and provides a stable, canonical definition for shared
//! types like `Delta`, `Digest`, `Phase`, and the error enums.

/// Core value types: deltas, digests, phases, correlation records and cycle timing.
pub mod app;
/// The canonical, deterministic binary codec for consensus-critical data.
pub mod codec;
/// Shared configuration structures (`CycleConfig`, `CorrelationConfig`, `ReconcilerConfig`).
pub mod config;
/// A unified set of all error types used across the workspace.
pub mod error;

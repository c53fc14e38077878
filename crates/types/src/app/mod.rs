// Path: crates/types/src/app/mod.rs
//! Core value types shared by the scheduler, the synchroniser and the reconciler.

/// Request/response correlation records and reputation signals.
pub mod correlation;
/// Content-addressed deltas and their digests.
pub mod delta;
/// Consensus cycle phases.
pub mod phase;
/// Deterministic cycle timing.
pub mod timing;

pub use correlation::*;
pub use delta::*;
pub use phase::*;
pub use timing::*;

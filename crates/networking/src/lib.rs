// Path: crates/networking/src/lib.rs
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

//! # Meridian Networking
//!
//! The plumbing a node uses to talk to peers that may never answer, and to
//! catch up on the chain: the [`CorrelationTable`] pairs outbound requests with
//! their responses and evicts the ones that time out, and the
//! [`ChainSynchroniser`] walks digest-linked deltas backwards through the local
//! cache.

pub mod correlation;
pub mod metrics;
pub mod sync;

// Re-export the public interface for consumers of the crate.
pub use correlation::CorrelationTable;
pub use sync::{ChainSynchroniser, ChainWalk, WalkOutcome};

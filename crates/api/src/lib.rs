// Path: crates/api/src/lib.rs

//! # Meridian API Crate Lints
//!
//! This crate enforces a strict set of lints to ensure high-quality,
//! panic-free, and well-documented code. Panics are disallowed in non-test
//! code to promote robust error handling.
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
//! # Meridian API
//!
//! The contracts between the ledger core and its collaborators: the wall
//! clock, the delta cache, the state-application layer and the transport.
//! Components depend on these traits, never on concrete implementations.

/// The injected wall-clock abstraction.
pub mod clock;
/// The content-addressed delta cache contract and an in-memory implementation.
pub mod delta;
/// The state-application contract.
pub mod state;
/// The outbound side of the peer transport used to fetch missing deltas.
pub mod transport;

/// A curated set of the most commonly used traits and types.
pub mod prelude {
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::delta::{DeltaCache, LatestDeltaProvider, MemoryDeltaCache};
    pub use crate::state::DeltaApplier;
    pub use crate::transport::DeltaTransport;
}

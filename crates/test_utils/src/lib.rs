// Path: crates/test_utils/src/lib.rs
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

//! # Meridian Test Utilities
//!
//! Utilities for testing the Meridian ledger core components.

pub mod assertions;
pub mod clock;
pub mod fixtures;
pub mod mocks;
pub mod randomness;

// Path: crates/api/src/clock.rs
//! Wall-clock access for components whose behaviour depends on real time.

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock time.
///
/// Components take an `Arc<dyn Clock>` instead of reading the system clock so
/// tests can drive time deterministically.
pub trait Clock: Send + Sync + Debug {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// The host's real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            // A host clock set before 1970 is treated as the epoch itself.
            .unwrap_or(0)
    }
}

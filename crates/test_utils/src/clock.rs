//! Controllable clocks.

use meridian_api::clock::Clock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Wall-clock time derived from Tokio's clock.
///
/// Under `#[tokio::test(start_paused = true)]` the Tokio clock is virtual, so
/// timers and this clock advance together without real sleeping. `jump`
/// shifts the reported wall time without moving Tokio's clock, which is how a
/// host clock correction looks to the scheduler.
#[derive(Debug, Clone)]
pub struct TokioClock {
    inner: Arc<TokioClockInner>,
}

#[derive(Debug)]
struct TokioClockInner {
    anchor_ms: u64,
    started: Instant,
    skew_ms: AtomicI64,
}

impl TokioClock {
    /// A clock reading `anchor_ms` right now.
    pub fn starting_at(anchor_ms: u64) -> Self {
        Self {
            inner: Arc::new(TokioClockInner {
                anchor_ms,
                started: Instant::now(),
                skew_ms: AtomicI64::new(0),
            }),
        }
    }

    /// Shifts the reported wall time by `delta_ms`, forwards or backwards.
    pub fn jump(&self, delta_ms: i64) {
        self.inner.skew_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        let elapsed = self.inner.started.elapsed().as_millis() as i128;
        let skew = self.inner.skew_ms.load(Ordering::SeqCst) as i128;
        let now = self.inner.anchor_ms as i128 + elapsed + skew;
        now.clamp(0, u64::MAX as i128) as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// A clock reading `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(now_ms)),
        }
    }

    /// Sets the reading.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Moves the reading forward.
    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_virtual_time_and_jumps() {
        let clock = TokioClock::starting_at(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(clock.now_ms(), 3_500);
        clock.jump(-3_000);
        assert_eq!(clock.now_ms(), 500);
        clock.jump(-10_000);
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(5);
        clock.advance(10);
        assert_eq!(clock.now_ms(), 15);
        clock.set(2);
        assert_eq!(clock.now_ms(), 2);
    }
}

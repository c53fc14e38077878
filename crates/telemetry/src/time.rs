// Path: crates/telemetry/src/time.rs
use std::time::Instant;

/// Reports the elapsed seconds of its scope to a callback when dropped.
///
/// ```ignore
/// let _timer = Timer::new(|secs| sync_metrics().observe_reconcile_duration(secs));
/// ```
pub struct Timer<F: FnOnce(f64)> {
    start: Instant,
    report: Option<F>,
}

impl<F: FnOnce(f64)> Timer<F> {
    pub fn new(report: F) -> Self {
        Self {
            start: Instant::now(),
            report: Some(report),
        }
    }

    /// Drops the timer without reporting.
    pub fn discard(mut self) {
        self.report = None;
    }
}

impl<F: FnOnce(f64)> Drop for Timer<F> {
    fn drop(&mut self) {
        if let Some(report) = self.report.take() {
            report(self.start.elapsed().as_secs_f64());
        }
    }
}

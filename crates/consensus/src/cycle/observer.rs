// Path: crates/consensus/src/cycle/observer.rs
use async_trait::async_trait;
use futures::FutureExt;
use meridian_types::app::Phase;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

/// A consumer of phase changes driven by [`super::CycleScheduler::attach`].
#[async_trait]
pub trait PhaseObserver: Send + Sync + 'static {
    /// A short name used in logs.
    fn name(&self) -> &str {
        "phase-observer"
    }

    /// Handles one phase. Errors are logged and do not stop delivery.
    async fn on_phase(&self, phase: &Phase) -> anyhow::Result<()>;
}

pub(super) async fn run_observer(
    observer: Arc<dyn PhaseObserver>,
    mut phases: broadcast::Receiver<Phase>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = phases.recv() => match received {
                Ok(phase) => {
                    let result = AssertUnwindSafe(observer.on_phase(&phase)).catch_unwind().await;
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(target: "cycle", observer = observer.name(), phase = %phase, error = %e, "Phase observer failed");
                        }
                        Err(_) => {
                            tracing::error!(target: "cycle", observer = observer.name(), phase = %phase, "Phase observer panicked. Continuing.");
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "cycle", observer = observer.name(), skipped, "Phase observer lagged behind the scheduler");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

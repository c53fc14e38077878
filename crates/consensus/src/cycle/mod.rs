// Path: crates/consensus/src/cycle/mod.rs

//! The cycle scheduler.
//!
//! A single timer task per scheduler computes every boundary from
//! `(now - epoch) mod cycle_duration`, sleeps until it, and publishes a fresh
//! [`Phase`] on a broadcast channel. Sleeps are capped so a corrected host
//! clock is noticed quickly, and the delay is always recomputed from the clock
//! rather than accumulated.

mod observer;
mod timer;

pub use observer::PhaseObserver;

use meridian_api::clock::Clock;
use meridian_api::delta::LatestDeltaProvider;
use meridian_types::app::{CycleSchedule, Phase};
use meridian_types::config::{CycleConfiguration, CycleEpoch};
use meridian_types::error::CycleError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use self::timer::PhaseTimer;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Emits consensus phase changes on a fixed, wall-clock anchored cadence.
pub struct CycleScheduler {
    schedule: CycleSchedule,
    clock: Arc<dyn Clock>,
    latest: Option<Arc<dyn LatestDeltaProvider>>,
    phase_sender: Mutex<Option<broadcast::Sender<Phase>>>,
    current: Arc<watch::Sender<Option<Phase>>>,
    shutdown_sender: watch::Sender<bool>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    state: AtomicU8,
}

impl std::fmt::Debug for CycleScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleScheduler")
            .field("epoch_ms", &self.schedule.epoch_ms())
            .field("cycle_ms", &self.schedule.configuration().cycle_ms())
            .field("state", &self.state.load(Ordering::SeqCst))
            .finish()
    }
}

impl CycleScheduler {
    /// Creates a scheduler. Nothing runs until [`CycleScheduler::start`].
    ///
    /// A [`CycleEpoch::ProcessStart`] epoch is resolved against `clock` here.
    pub fn new(config: CycleConfiguration, clock: Arc<dyn Clock>) -> Self {
        let epoch_ms = match config.epoch() {
            CycleEpoch::UnixEpoch => 0,
            CycleEpoch::AtMillis(ms) => ms,
            CycleEpoch::ProcessStart => clock.now_ms(),
        };
        let (phase_sender, _) = broadcast::channel(config.phase_channel_capacity());
        let (current, _) = watch::channel(None);
        let (shutdown_sender, _) = watch::channel(false);
        Self {
            schedule: CycleSchedule::new(config, epoch_ms),
            clock,
            latest: None,
            phase_sender: Mutex::new(Some(phase_sender)),
            current: Arc::new(current),
            shutdown_sender,
            task_handles: Mutex::new(Vec::new()),
            state: AtomicU8::new(STATE_IDLE),
        }
    }

    /// Stamps each emitted phase with the digest reported by `provider`.
    pub fn with_latest_delta(mut self, provider: Arc<dyn LatestDeltaProvider>) -> Self {
        self.latest = Some(provider);
        self
    }

    /// The configuration this scheduler runs.
    pub fn configuration(&self) -> &CycleConfiguration {
        self.schedule.configuration()
    }

    /// The anchored schedule, for pure queries such as "what is active at t".
    pub fn schedule(&self) -> &CycleSchedule {
        &self.schedule
    }

    /// Starts the timer task on the current Tokio runtime.
    ///
    /// Calling `start` on a running scheduler logs a warning and does nothing.
    /// A closed scheduler cannot be restarted.
    pub fn start(&self) -> Result<(), CycleError> {
        let handle = Handle::try_current().map_err(|_| CycleError::NoRuntime)?;
        match self.state.compare_exchange(
            STATE_IDLE,
            STATE_RUNNING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {}
            Err(STATE_RUNNING) => {
                tracing::warn!(target: "cycle", "start() called on a running cycle scheduler; ignoring");
                return Ok(());
            }
            Err(_) => return Err(CycleError::Closed),
        }

        let phases = self
            .phase_sender
            .lock()
            .clone()
            .ok_or(CycleError::Closed)?;
        let timer = PhaseTimer {
            schedule: self.schedule.clone(),
            clock: self.clock.clone(),
            latest: self.latest.clone(),
            phases,
            current: self.current.clone(),
        };
        let task = handle.spawn(timer.run(self.shutdown_sender.subscribe()));
        self.task_handles.lock().push(task);
        Ok(())
    }

    /// Stops the timer and completes the phase stream.
    ///
    /// Subscribers receive any phases still buffered for them, then
    /// `RecvError::Closed`. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), CycleError> {
        let previous = self.state.swap(STATE_CLOSED, Ordering::SeqCst);
        self.shutdown_sender.send_replace(true);
        self.phase_sender.lock().take();

        let handles: Vec<JoinHandle<()>> = self.task_handles.lock().drain(..).collect();
        for handle in handles {
            handle
                .await
                .map_err(|e| CycleError::TaskFailed(e.to_string()))?;
        }
        if previous != STATE_CLOSED {
            tracing::info!(target: "cycle", "Cycle scheduler closed");
        }
        Ok(())
    }

    /// Subscribes to phase changes.
    ///
    /// Each subscriber has its own buffer of `phase_channel_capacity` phases. A
    /// subscriber that falls further behind observes `RecvError::Lagged` and
    /// never slows the timer down. After `close`, the returned receiver is
    /// already complete.
    pub fn subscribe(&self) -> broadcast::Receiver<Phase> {
        match self.phase_sender.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        }
    }

    /// The most recently emitted phase, if any.
    pub fn current_phase(&self) -> Option<Phase> {
        self.current.borrow().clone()
    }

    /// A receiver that always holds the most recently emitted phase.
    pub fn watch_phase(&self) -> watch::Receiver<Option<Phase>> {
        self.current.subscribe()
    }

    /// Milliseconds until the next Construction/Producing boundary.
    pub fn time_until_next_cycle_ms(&self) -> u64 {
        self.schedule.time_until_next_cycle(self.clock.now_ms())
    }

    /// Runs `observer` for every phase on its own task.
    ///
    /// An observer that returns an error or panics is logged and keeps
    /// receiving later phases; it never affects the timer or other observers.
    pub fn attach(&self, observer: Arc<dyn PhaseObserver>) -> Result<(), CycleError> {
        let handle = Handle::try_current().map_err(|_| CycleError::NoRuntime)?;
        if self.state.load(Ordering::SeqCst) == STATE_CLOSED {
            return Err(CycleError::Closed);
        }
        let receiver = self.subscribe();
        let task = handle.spawn(observer::run_observer(
            observer,
            receiver,
            self.shutdown_sender.subscribe(),
        ));
        self.task_handles.lock().push(task);
        Ok(())
    }
}

impl Drop for CycleScheduler {
    fn drop(&mut self) {
        self.shutdown_sender.send_replace(true);
    }
}

// Path: crates/validator/src/reconciler/mod.rs

//! Brings local state up to each newly confirmed head.
//!
//! A reconciliation walks from the new head back to the last applied delta.
//! Deltas missing from the cache are fetched, verified and cached, and the walk
//! resumes from the digest that was missing. Only a walk that reaches the last
//! applied delta is applied, oldest first, and "last applied" moves forward one
//! successful application at a time. A newer head cancels the walk in progress.

mod state;

pub use state::{AppliedDelta, ReconcileReport, ReconcilerState};

use crate::fetcher::DeltaFetcher;
use crate::metrics::{reconciler_errors, reconciler_metrics};
use meridian_api::delta::{DeltaCache, LatestDeltaProvider};
use meridian_api::state::DeltaApplier;
use meridian_networking::{ChainSynchroniser, WalkOutcome};
use meridian_telemetry::time::Timer;
use meridian_types::app::{Delta, Digest};
use meridian_types::config::ReconcilerConfig;
use meridian_types::error::{ConfigError, ErrorCode, ReconcileError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct ReconcilerCore {
    config: ReconcilerConfig,
    synchroniser: ChainSynchroniser,
    cache: Arc<dyn DeltaCache>,
    applier: Arc<dyn DeltaApplier>,
    fetcher: Option<Arc<dyn DeltaFetcher>>,
    last_applied: RwLock<AppliedDelta>,
    state: watch::Sender<ReconcilerState>,
    applied: RwLock<Option<broadcast::Sender<AppliedDelta>>>,
    /// Serialises reconciliations; "last applied" has a single writer.
    running: tokio::sync::Mutex<()>,
}

/// The newest submitted head and the token that cancels work towards it.
type SubmittedHead = Option<(Digest, CancellationToken)>;

/// Applies the confirmed chain to local state.
pub struct LedgerReconciler {
    core: Arc<ReconcilerCore>,
    heads: watch::Sender<SubmittedHead>,
    shutdown: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for LedgerReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerReconciler")
            .field("last_applied", &*self.core.last_applied.read())
            .field("state", &*self.core.state.borrow())
            .finish()
    }
}

impl LedgerReconciler {
    /// Creates a reconciler whose state already reflects `last_applied`.
    ///
    /// Without a `fetcher`, deltas missing from the cache leave the reconciler
    /// stalled until they are cached by other means.
    pub fn new(
        config: ReconcilerConfig,
        cache: Arc<dyn DeltaCache>,
        applier: Arc<dyn DeltaApplier>,
        fetcher: Option<Arc<dyn DeltaFetcher>>,
        last_applied: AppliedDelta,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (state, _) = watch::channel(ReconcilerState::Idle);
        let (applied, _) = broadcast::channel(config.event_channel_capacity);
        let (heads, _) = watch::channel(None);
        let shutdown = CancellationToken::new();
        let core = ReconcilerCore {
            synchroniser: ChainSynchroniser::new(cache.clone(), config.max_walk_depth),
            config,
            cache,
            applier,
            fetcher,
            last_applied: RwLock::new(last_applied),
            state,
            applied: RwLock::new(Some(applied)),
            running: tokio::sync::Mutex::new(()),
        };
        Ok(Self {
            core: Arc::new(core),
            heads,
            shutdown,
            task_handles: Mutex::new(Vec::new()),
        })
    }

    /// Starts the background task that reconciles submitted heads.
    ///
    /// While stalled, or after a failed application, the task retries every
    /// `retry_interval` until a newer head arrives or it succeeds.
    pub fn start(&self) -> Result<(), ReconcileError> {
        let runtime = Handle::try_current().map_err(|_| ReconcileError::NoRuntime)?;
        if self.shutdown.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        let mut handles = self.task_handles.lock();
        if !handles.is_empty() {
            tracing::warn!(target: "reconciler", "start() called on a running reconciler; ignoring");
            return Ok(());
        }
        let task = runtime.spawn(run_worker(
            self.core.clone(),
            self.heads.subscribe(),
            self.shutdown.clone(),
        ));
        handles.push(task);
        Ok(())
    }

    /// Hands a newly confirmed head to the background task.
    ///
    /// Heads coalesce: only the newest one submitted is reconciled, and a walk
    /// towards an older head is cancelled.
    pub fn submit_head(&self, head: Digest) {
        tracing::debug!(target: "reconciler", %head, "New confirmed head");
        // Each head carries its own token; replacing a head cancels exactly
        // the work towards it.
        let token = self.shutdown.child_token();
        if let Some((_, superseded)) = self.heads.send_replace(Some((head, token))) {
            superseded.cancel();
        }
    }

    /// Reconciles towards `head` on the calling task.
    pub async fn reconcile(&self, head: Digest) -> Result<ReconcileReport, ReconcileError> {
        let token = self.shutdown.child_token();
        self.core.reconcile(head, &token).await
    }

    /// Like [`Self::reconcile`], stopping early when `cancel` fires.
    pub async fn reconcile_with(
        &self,
        head: Digest,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.core.reconcile(head, cancel).await
    }

    /// The newest delta applied to local state.
    pub fn last_applied(&self) -> AppliedDelta {
        *self.core.last_applied.read()
    }

    /// The current state.
    pub fn state(&self) -> ReconcilerState {
        self.core.state.borrow().clone()
    }

    /// A receiver that always holds the current state.
    pub fn watch_state(&self) -> watch::Receiver<ReconcilerState> {
        self.core.state.subscribe()
    }

    /// Subscribes to announcements of each delta applied, in order.
    pub fn applied_events(&self) -> broadcast::Receiver<AppliedDelta> {
        match self.core.applied.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        }
    }

    /// Cancels any reconciliation in progress, stops the background task and
    /// completes the applied-delta stream.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = self.task_handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(target: "reconciler", error = %e, "Reconciler task failed");
            }
        }
        self.core.applied.write().take();
    }
}

impl LatestDeltaProvider for LedgerReconciler {
    fn latest_delta_digest(&self) -> Option<Digest> {
        Some(self.core.last_applied.read().digest)
    }
}

impl Drop for LedgerReconciler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_worker(
    core: Arc<ReconcilerCore>,
    mut heads: watch::Receiver<SubmittedHead>,
    shutdown: CancellationToken,
) {
    let retry_interval = core.config.retry_interval();
    // A head submitted before `start` is picked up straight away.
    let mut target = heads.borrow_and_update().clone();
    loop {
        let Some((head, token)) = target.clone() else {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                res = heads.changed() => {
                    if res.is_err() {
                        break;
                    }
                    target = heads.borrow_and_update().clone();
                }
            }
            continue;
        };

        let retry = match core.reconcile(head, &token).await {
            Ok(_) => false,
            Err(ReconcileError::Stalled { .. }) | Err(ReconcileError::Apply(_)) => true,
            Err(_) => false,
        };
        if !retry {
            target = None;
            continue;
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            res = heads.changed() => {
                if res.is_err() {
                    break;
                }
                target = heads.borrow_and_update().clone();
            }
            _ = tokio::time::sleep(retry_interval) => {
                tracing::debug!(target: "reconciler", %head, "Retrying reconciliation");
            }
        }
    }
    tracing::debug!(target: "reconciler", "Reconciler task stopped");
}

impl ReconcilerCore {
    fn set_state(&self, state: ReconcilerState) {
        reconciler_metrics().set_reconciler_state(state.as_str());
        self.state.send_replace(state);
    }

    /// Publishes where local state stands after an interrupted run: synced to
    /// whatever was applied before the interruption, or back to `previous`.
    fn settle_cancelled(&self, start: AppliedDelta, previous: ReconcilerState) {
        let current = *self.last_applied.read();
        let state = if current != start {
            ReconcilerState::Synced {
                head: current.digest,
            }
        } else {
            previous
        };
        tracing::debug!(target: "reconciler", state = state.as_str(), "Reconciliation cancelled");
        self.set_state(state);
    }

    fn fail(&self, err: ReconcileError) -> ReconcileError {
        reconciler_errors().inc_error("reconcile", err.code());
        err
    }

    async fn reconcile(
        &self,
        head: Digest,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ReconcileError> {
        let _running = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReconcileError::Cancelled),
            guard = self.running.lock() => guard,
        };
        let _timer = Timer::new(|secs| reconciler_metrics().observe_reconcile_duration(secs));

        let start = *self.last_applied.read();
        if head == start.digest {
            self.set_state(ReconcilerState::Synced { head });
            return Ok(ReconcileReport {
                head,
                applied: 0,
                fetched: 0,
            });
        }
        let previous = self.state.borrow().clone();
        self.set_state(ReconcilerState::Reconciling { head });
        tracing::info!(target: "reconciler", %head, from = %start.digest, from_height = start.sequence_number, "Reconciling to new head");

        let outcome = match self.discover(head, start, cancel).await {
            Ok((discovered, fetched)) => self
                .apply_discovered(head, &discovered, cancel)
                .await
                .map(|applied| (applied, fetched)),
            Err(e) => Err(e),
        };
        let (applied, fetched) = match outcome {
            Ok(counts) => counts,
            Err(ReconcileError::Cancelled) => {
                self.settle_cancelled(start, previous);
                return Err(ReconcileError::Cancelled);
            }
            Err(e) => return Err(e),
        };

        self.set_state(ReconcilerState::Synced { head });
        tracing::info!(target: "reconciler", %head, applied, fetched, "Ledger synced");
        Ok(ReconcileReport {
            head,
            applied,
            fetched,
        })
    }

    /// Walks from `head` to `start`, fetching what the cache lacks. Returns the
    /// digests youngest first, `start` last, plus the number fetched.
    async fn discover(
        &self,
        head: Digest,
        start: AppliedDelta,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Digest>, usize), ReconcileError> {
        let mut discovered: Vec<Digest> = Vec::new();
        let mut fetched = 0usize;
        let mut from = head;
        loop {
            let mut walk = self.synchroniser.walk(from, start.digest, cancel);
            discovered.extend(walk.by_ref());
            let oldest_sequence = walk.oldest_sequence();
            let outcome = walk.outcome().unwrap_or(WalkOutcome::Cancelled);

            // Anything at or below the applied height that is not the applied
            // delta itself lies on another branch.
            if oldest_sequence.is_some_and(|seq| seq <= start.sequence_number) {
                return Err(self.diverged(head, start));
            }

            match outcome {
                WalkOutcome::Reached => return Ok((discovered, fetched)),
                WalkOutcome::Cancelled => return Err(ReconcileError::Cancelled),
                WalkOutcome::CycleDetected { .. } | WalkOutcome::DepthExceeded => {
                    return Err(self.malformed(head, outcome));
                }
                WalkOutcome::Broken { missing } => {
                    if missing == Digest::ZERO {
                        // Walked past genesis without meeting the applied delta.
                        return Err(self.diverged(head, start));
                    }
                    // The parent of a delta at `start.sequence_number + 1` can
                    // only be the applied delta.
                    if oldest_sequence.is_some_and(|seq| seq <= start.sequence_number.saturating_add(1)) {
                        return Err(self.diverged(head, start));
                    }
                    if discovered.len() >= self.config.max_walk_depth {
                        return Err(self.malformed(head, WalkOutcome::DepthExceeded));
                    }
                    if fetched >= self.config.max_fetch_rounds {
                        return Err(self.stalled(missing));
                    }
                    self.obtain(missing, cancel).await?;
                    fetched += 1;
                    from = missing;
                }
            }
        }
    }

    /// Applies everything younger than the last applied delta, oldest first.
    async fn apply_discovered(
        &self,
        head: Digest,
        discovered: &[Digest],
        cancel: &CancellationToken,
    ) -> Result<usize, ReconcileError> {
        let mut applied = 0usize;
        for digest in discovered.iter().rev() {
            let current = *self.last_applied.read();
            if *digest == current.digest {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled);
            }
            let delta = match self.cache.try_get_confirmed(digest) {
                Some(delta) => delta,
                // Evicted from the cache since the walk.
                None => self.obtain(*digest, cancel).await?,
            };
            if delta.previous_digest != current.digest {
                tracing::error!(
                    target: "reconciler",
                    %digest,
                    previous = %delta.previous_digest,
                    last_applied = %current.digest,
                    "Refusing to apply a delta out of order"
                );
                return Err(self.malformed_with(head, "delta does not extend the last applied delta"));
            }

            if let Err(e) = self.applier.apply(&delta).await {
                tracing::error!(target: "reconciler", %digest, error = %e, "Failed to apply delta");
                self.set_state(ReconcilerState::Failed {
                    digest: *digest,
                    reason: e.to_string(),
                });
                return Err(self.fail(ReconcileError::Apply(e)));
            }

            let record = AppliedDelta {
                digest: *digest,
                sequence_number: delta.sequence_number,
            };
            *self.last_applied.write() = record;
            applied += 1;
            reconciler_metrics().inc_deltas_applied();
            tracing::debug!(target: "reconciler", %digest, sequence_number = delta.sequence_number, "Applied delta");
            if let Some(sender) = self.applied.read().as_ref() {
                let _ = sender.send(record);
            }
        }
        Ok(applied)
    }

    /// Fetches, verifies and caches `digest`.
    async fn obtain(&self, digest: Digest, cancel: &CancellationToken) -> Result<Delta, ReconcileError> {
        let Some(fetcher) = self.fetcher.as_ref() else {
            return Err(self.stalled(digest));
        };
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReconcileError::Cancelled),
            result = fetcher.fetch(digest) => result,
        };
        match result {
            Ok(delta) if delta.digest() == digest => {
                self.cache.add_confirmed(delta.clone());
                Ok(delta)
            }
            Ok(delta) => {
                tracing::warn!(target: "reconciler", expected = %digest, got = %delta.digest(), "Fetcher returned the wrong delta");
                Err(self.stalled(digest))
            }
            Err(e) => {
                tracing::warn!(target: "reconciler", %digest, error = %e, "Could not fetch missing delta");
                Err(self.stalled(digest))
            }
        }
    }

    fn stalled(&self, missing: Digest) -> ReconcileError {
        tracing::warn!(target: "reconciler", %missing, "Reconciliation stalled");
        self.set_state(ReconcilerState::Stalled { missing });
        self.fail(ReconcileError::Stalled { missing })
    }

    fn diverged(&self, head: Digest, start: AppliedDelta) -> ReconcileError {
        tracing::error!(target: "reconciler", %head, last_applied = %start.digest, "Head does not descend from the last applied delta");
        self.set_state(ReconcilerState::Diverged { head });
        self.fail(ReconcileError::Diverged {
            head,
            last_applied: start.digest,
        })
    }

    fn malformed(&self, head: Digest, outcome: WalkOutcome) -> ReconcileError {
        self.malformed_with(head, outcome.as_str())
    }

    fn malformed_with(&self, head: Digest, reason: &str) -> ReconcileError {
        self.set_state(ReconcilerState::Failed {
            digest: head,
            reason: reason.to_string(),
        });
        self.fail(ReconcileError::MalformedChain {
            head,
            reason: reason.to_string(),
        })
    }
}

// Path: crates/networking/src/correlation/mod.rs

//! Tracks outbound requests until their response arrives or their time runs out.
//!
//! Every entry moves through a tri-state (`Pending` to either `Matched` or
//! `Evicted`) with a single compare-and-swap. Whoever wins the swap removes the
//! entry and reports the outcome, so a response racing its own expiry is either
//! matched or evicted, never both, and an eviction is reported at most once.
//! Locking is per map shard; unrelated entries never contend on a table lock.

use crate::metrics::metrics;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use libp2p::PeerId;
use meridian_api::clock::Clock;
use meridian_types::app::{
    CorrelationId, EvictionEvent, EvictionReason, PendingCorrelation, ReputationEvent,
    ReputationKind,
};
use meridian_types::config::CorrelationConfig;
use meridian_types::error::{ConfigError, CorrelationError};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

const PENDING: u8 = 0;
const MATCHED: u8 = 1;
const EVICTED: u8 = 2;

struct Slot<C> {
    correlation: PendingCorrelation<C>,
    state: AtomicU8,
    /// Insertion order, used to pick the oldest entry under capacity pressure.
    seq: u64,
    expiry: Mutex<Option<AbortHandle>>,
}

impl<C> Slot<C> {
    fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    /// Moves the slot out of `Pending`. Only one caller ever sees `true`.
    fn settle(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cancel_expiry(&self) {
        if let Some(handle) = self.expiry.lock().take() {
            handle.abort();
        }
    }
}

struct Inner<C> {
    entries: DashMap<CorrelationId, Arc<Slot<C>>>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    evictions: RwLock<Option<broadcast::Sender<EvictionEvent<C>>>>,
    reputation: RwLock<Option<broadcast::Sender<ReputationEvent>>>,
    next_seq: AtomicU64,
    closed: AtomicBool,
}

/// The table of requests awaiting a response, keyed by correlation id.
///
/// Cloning is cheap and every clone shares the same table.
pub struct CorrelationTable<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for CorrelationTable<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C> std::fmt::Debug for CorrelationTable<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("pending", &self.inner.entries.len())
            .field("ttl", &self.inner.ttl)
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl<C> CorrelationTable<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Creates an empty table.
    pub fn new(config: &CorrelationConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let (evictions, _) = broadcast::channel(config.event_channel_capacity);
        let (reputation, _) = broadcast::channel(config.event_channel_capacity);
        Ok(Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                ttl: config.ttl(),
                capacity: config.capacity,
                clock,
                evictions: RwLock::new(Some(evictions)),
                reputation: RwLock::new(Some(reputation)),
                next_seq: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The lifetime of an unanswered entry.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Number of entries still waiting for a response.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// True if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// True if `id` is registered and still pending.
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.inner
            .entries
            .get(id)
            .map(|slot| slot.is_pending())
            .unwrap_or(false)
    }

    /// Registers an outbound request and starts its expiry timer.
    ///
    /// Must be called before the request is sent, so a fast response always
    /// finds its entry. If the table is full, the oldest pending entry is
    /// evicted with [`EvictionReason::Capacity`] to make room.
    pub fn add_pending(&self, correlation: PendingCorrelation<C>) -> Result<(), CorrelationError> {
        let runtime = Handle::try_current().map_err(|_| CorrelationError::NoRuntime)?;
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CorrelationError::Closed);
        }
        if self.inner.entries.len() >= self.inner.capacity {
            self.inner.evict_oldest();
        }

        let id = correlation.correlation_id;
        let slot = Arc::new(Slot {
            correlation,
            state: AtomicU8::new(PENDING),
            seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
            expiry: Mutex::new(None),
        });
        match self.inner.entries.entry(id) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_pending() {
                    return Err(CorrelationError::Duplicate(id));
                }
                // The previous holder of this id is settled and about to be
                // removed by whoever settled it; that removal checks identity.
                occupied.insert(slot.clone());
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(slot.clone());
            }
        }

        let weak: Weak<Inner<C>> = Arc::downgrade(&self.inner);
        let deadline = tokio::time::Instant::now() + self.inner.ttl;
        let timed = slot.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.evict(&timed, EvictionReason::Expired);
            }
        });
        *slot.expiry.lock() = Some(task.abort_handle());

        tracing::trace!(
            target: "correlation",
            correlation_id = %id,
            recipient = %slot.correlation.recipient,
            "Registered pending correlation"
        );
        metrics().set_pending_correlations(self.inner.entries.len());
        Ok(())
    }

    /// Matches a response to its pending request, consuming the entry.
    ///
    /// Returns `false` for late, duplicate or unknown responses; none of these
    /// are errors.
    pub fn try_match(&self, id: &CorrelationId) -> bool {
        self.take(id).is_some()
    }

    /// Like [`Self::try_match`], but only accepts the response from the peer the
    /// request was sent to.
    ///
    /// A response that matches nothing, or comes from another peer, is reported
    /// as [`ReputationKind::UnsolicitedResponse`] against `responder`. A
    /// response from the wrong peer leaves the entry pending.
    pub fn try_match_from(&self, id: &CorrelationId, responder: &PeerId) -> bool {
        let slot = self.inner.entries.get(id).map(|s| s.value().clone());
        match slot {
            Some(slot) if slot.correlation.recipient != *responder => {
                tracing::debug!(
                    target: "correlation",
                    correlation_id = %id,
                    expected = %slot.correlation.recipient,
                    responder = %responder,
                    "Response came from a peer the request was not sent to"
                );
                self.inner.unsolicited(responder);
                false
            }
            Some(_) => {
                let matched = self.take(id).is_some();
                if !matched {
                    // Lost the race against expiry; `take` already counted it.
                    self.inner.publish_reputation(ReputationEvent {
                        peer: *responder,
                        kind: ReputationKind::UnsolicitedResponse,
                    });
                }
                matched
            }
            None => {
                tracing::debug!(target: "correlation", correlation_id = %id, responder = %responder, "Unsolicited response");
                self.inner.unsolicited(responder);
                false
            }
        }
    }

    /// Matches a response and hands back the original request.
    pub fn take(&self, id: &CorrelationId) -> Option<PendingCorrelation<C>> {
        let Some(slot) = self.inner.entries.get(id).map(|s| s.value().clone()) else {
            metrics().inc_unsolicited_responses();
            tracing::debug!(target: "correlation", correlation_id = %id, "No pending request for response");
            return None;
        };
        if !slot.settle(MATCHED) {
            metrics().inc_unsolicited_responses();
            tracing::debug!(target: "correlation", correlation_id = %id, "Response arrived after its request was settled");
            return None;
        }
        self.inner
            .entries
            .remove_if(id, |_, current| Arc::ptr_eq(current, &slot));
        slot.cancel_expiry();

        let m = metrics();
        m.inc_correlations_matched();
        m.set_pending_correlations(self.inner.entries.len());
        self.inner.publish_reputation(ReputationEvent {
            peer: slot.correlation.recipient,
            kind: ReputationKind::ResponseReceived,
        });
        Some(slot.correlation.clone())
    }

    /// Removes a pending entry without announcing it, for a request that was
    /// never sent. Returns `false` if the entry had already been settled.
    pub fn withdraw(&self, id: &CorrelationId) -> bool {
        let Some(slot) = self.inner.entries.get(id).map(|s| s.value().clone()) else {
            return false;
        };
        if !slot.settle(EVICTED) {
            return false;
        }
        self.inner
            .entries
            .remove_if(id, |_, current| Arc::ptr_eq(current, &slot));
        slot.cancel_expiry();
        metrics().set_pending_correlations(self.inner.entries.len());
        true
    }

    /// Evicts a pending entry whose requester has stopped waiting for it.
    ///
    /// The eviction is announced like an expiry, so the recipient is still
    /// reported. Returns `false` if the entry had already been settled.
    pub fn abandon(&self, id: &CorrelationId) -> bool {
        let Some(slot) = self.inner.entries.get(id).map(|s| s.value().clone()) else {
            return false;
        };
        self.inner.evict(&slot, EvictionReason::Abandoned)
    }

    /// Subscribes to eviction events.
    ///
    /// Each evicted entry is announced exactly once, with its original content
    /// and recipient. After [`Self::close`] the stream completes.
    pub fn eviction_events(&self) -> broadcast::Receiver<EvictionEvent<C>> {
        match self.inner.evictions.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => closed_receiver(),
        }
    }

    /// Subscribes to peer reputation signals derived from correlation outcomes.
    pub fn reputation_events(&self) -> broadcast::Receiver<ReputationEvent> {
        match self.inner.reputation.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => closed_receiver(),
        }
    }

    /// Drops every pending entry without announcing it and completes both
    /// event streams. Further registrations fail with
    /// [`CorrelationError::Closed`].
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let ids: Vec<CorrelationId> = self.inner.entries.iter().map(|e| *e.key()).collect();
        let mut dropped = 0usize;
        for id in ids {
            if let Some((_, slot)) = self.inner.entries.remove(&id) {
                if slot.settle(EVICTED) {
                    dropped += 1;
                }
                slot.cancel_expiry();
            }
        }
        self.inner.evictions.write().take();
        self.inner.reputation.write().take();
        metrics().set_pending_correlations(0);
        tracing::debug!(target: "correlation", dropped, "Correlation table closed");
    }
}

impl<C> Inner<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Settles `slot` as evicted and announces it, unless something else
    /// settled it first.
    fn evict(&self, slot: &Arc<Slot<C>>, reason: EvictionReason) -> bool {
        if !slot.settle(EVICTED) {
            return false;
        }
        let id = slot.correlation.correlation_id;
        self.entries
            .remove_if(&id, |_, current| Arc::ptr_eq(current, slot));
        if reason != EvictionReason::Expired {
            slot.cancel_expiry();
        }

        let m = metrics();
        m.inc_correlations_evicted(reason.as_str());
        m.set_pending_correlations(self.entries.len());
        tracing::debug!(
            target: "correlation",
            correlation_id = %id,
            recipient = %slot.correlation.recipient,
            reason = reason.as_str(),
            "Evicted pending correlation"
        );

        let event = EvictionEvent {
            correlation: slot.correlation.clone(),
            reason,
            evicted_at_ms: self.clock.now_ms(),
        };
        if let Some(sender) = self.evictions.read().as_ref() {
            // No subscribers is not an error.
            let _ = sender.send(event);
        }
        self.publish_reputation(ReputationEvent {
            peer: slot.correlation.recipient,
            kind: ReputationKind::NoResponseReceived,
        });
        true
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .filter(|e| e.value().is_pending())
            .min_by_key(|e| e.value().seq)
            .map(|e| e.value().clone());
        if let Some(slot) = oldest {
            tracing::warn!(
                target: "correlation",
                capacity = self.capacity,
                correlation_id = %slot.correlation.correlation_id,
                "Correlation table full; evicting the oldest entry"
            );
            self.evict(&slot, EvictionReason::Capacity);
        }
    }

    fn unsolicited(&self, responder: &PeerId) {
        metrics().inc_unsolicited_responses();
        self.publish_reputation(ReputationEvent {
            peer: *responder,
            kind: ReputationKind::UnsolicitedResponse,
        });
    }

    fn publish_reputation(&self, event: ReputationEvent) {
        if let Some(sender) = self.reputation.read().as_ref() {
            let _ = sender.send(event);
        }
    }
}

fn closed_receiver<T: Clone>() -> broadcast::Receiver<T> {
    let (sender, receiver) = broadcast::channel(1);
    drop(sender);
    receiver
}

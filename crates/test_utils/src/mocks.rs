//! In-memory stand-ins for the state-application layer and the transport.

use async_trait::async_trait;
use libp2p::PeerId;
use meridian_api::delta::LatestDeltaProvider;
use meridian_api::state::DeltaApplier;
use meridian_api::transport::DeltaTransport;
use meridian_types::app::{Delta, DeltaRequest, Digest};
use meridian_types::error::{ApplyError, FetchError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Records applied deltas in order and fails on request.
///
/// Application is idempotent: a delta applied twice is recorded once.
#[derive(Debug, Default)]
pub struct RecordingApplier {
    applied: Mutex<Vec<Digest>>,
    failing: Mutex<HashSet<Digest>>,
    delay: Mutex<Duration>,
}

impl RecordingApplier {
    /// A fresh applier behind an `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every application of `digest` fail until [`Self::heal`] is called.
    pub fn fail_on(&self, digest: Digest) {
        self.failing.lock().insert(digest);
    }

    /// Stops failing `digest`.
    pub fn heal(&self, digest: &Digest) {
        self.failing.lock().remove(digest);
    }

    /// Makes every application take `delay` before it completes.
    pub fn delay_each(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Digests applied so far, in application order.
    pub fn applied(&self) -> Vec<Digest> {
        self.applied.lock().clone()
    }
}

#[async_trait]
impl DeltaApplier for RecordingApplier {
    async fn apply(&self, delta: &Delta) -> Result<(), ApplyError> {
        let digest = delta.digest();
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&digest) {
            return Err(ApplyError::Rejected {
                digest,
                reason: "scripted failure".into(),
            });
        }
        let mut applied = self.applied.lock();
        if !applied.contains(&digest) {
            applied.push(digest);
        }
        Ok(())
    }
}

/// A transport that hands every outbound request to the test through a channel.
///
/// The test decides whether, when and how each request is answered.
#[derive(Debug)]
pub struct ScriptedTransport {
    peers: Mutex<Vec<PeerId>>,
    failing: Mutex<HashSet<PeerId>>,
    outbox: mpsc::UnboundedSender<(PeerId, DeltaRequest)>,
}

impl ScriptedTransport {
    /// A transport advertising `peers`, plus the receiving end of its outbox.
    pub fn new(peers: Vec<PeerId>) -> (Arc<Self>, mpsc::UnboundedReceiver<(PeerId, DeltaRequest)>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            peers: Mutex::new(peers),
            failing: Mutex::new(HashSet::new()),
            outbox,
        });
        (transport, rx)
    }

    /// Makes sends to `peer` fail with a transport error.
    pub fn fail_sends_to(&self, peer: PeerId) {
        self.failing.lock().insert(peer);
    }

    /// Replaces the advertised peers.
    pub fn set_peers(&self, peers: Vec<PeerId>) {
        *self.peers.lock() = peers;
    }
}

#[async_trait]
impl DeltaTransport for ScriptedTransport {
    fn candidate_peers(&self) -> Vec<PeerId> {
        self.peers.lock().clone()
    }

    async fn send_delta_request(&self, peer: PeerId, request: DeltaRequest) -> Result<(), FetchError> {
        if self.failing.lock().contains(&peer) {
            return Err(FetchError::Transport(format!("scripted send failure to {peer}")));
        }
        self.outbox
            .send((peer, request))
            .map_err(|_| FetchError::Transport("outbox closed".into()))
    }
}

/// A [`LatestDeltaProvider`] whose answer the test sets directly.
#[derive(Debug, Default)]
pub struct FixedLatest(Mutex<Option<Digest>>);

impl FixedLatest {
    /// A provider reporting `digest`.
    pub fn new(digest: Option<Digest>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(digest)))
    }

    /// Changes the reported digest.
    pub fn set(&self, digest: Option<Digest>) {
        *self.0.lock() = digest;
    }
}

impl LatestDeltaProvider for FixedLatest {
    fn latest_delta_digest(&self) -> Option<Digest> {
        *self.0.lock()
    }
}

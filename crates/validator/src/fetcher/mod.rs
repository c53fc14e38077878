// Path: crates/validator/src/fetcher/mod.rs
use crate::metrics::{reconciler_errors, reconciler_metrics};
use async_trait::async_trait;
use dashmap::DashMap;
use libp2p::PeerId;
use meridian_api::clock::Clock;
use meridian_api::transport::DeltaTransport;
use meridian_networking::CorrelationTable;
use meridian_types::app::{
    CorrelationId, Delta, DeltaRequest, DeltaResponse, Digest, PendingCorrelation,
};
use meridian_types::config::ReconcilerConfig;
use meridian_types::error::{CorrelationError, ErrorCode, FetchError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Obtains a delta the local cache does not hold.
#[async_trait]
pub trait DeltaFetcher: Send + Sync {
    /// Returns the delta whose digest is `digest`.
    ///
    /// Implementations must only return a delta that hashes to `digest`.
    async fn fetch(&self, digest: Digest) -> Result<Delta, FetchError>;
}

type Waiters = DashMap<CorrelationId, oneshot::Sender<Option<Delta>>>;

/// Fetches deltas from peers, one request at a time, through the
/// [`CorrelationTable`].
///
/// Every request is registered before it is sent. The caller waits for the
/// matching response, the request's eviction, or `cache_lookup_timeout`,
/// whichever comes first, and then moves on to the next candidate peer.
pub struct NetworkDeltaFetcher {
    table: CorrelationTable<Digest>,
    transport: Arc<dyn DeltaTransport>,
    clock: Arc<dyn Clock>,
    waiters: Arc<Waiters>,
    attempt_timeout: Duration,
    max_attempts: usize,
    shutdown_sender: watch::Sender<bool>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for NetworkDeltaFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkDeltaFetcher")
            .field("in_flight", &self.waiters.len())
            .field("attempt_timeout", &self.attempt_timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl NetworkDeltaFetcher {
    /// Creates a fetcher and starts listening for evictions on `table`.
    pub fn new(
        table: CorrelationTable<Digest>,
        transport: Arc<dyn DeltaTransport>,
        clock: Arc<dyn Clock>,
        config: &ReconcilerConfig,
    ) -> Result<Self, CorrelationError> {
        let runtime = Handle::try_current().map_err(|_| CorrelationError::NoRuntime)?;
        let waiters: Arc<Waiters> = Arc::new(DashMap::new());
        let (shutdown_sender, shutdown) = watch::channel(false);
        let listener = runtime.spawn(release_evicted(
            table.clone(),
            waiters.clone(),
            shutdown,
        ));
        Ok(Self {
            table,
            transport,
            clock,
            waiters,
            attempt_timeout: config.cache_lookup_timeout(),
            max_attempts: config.max_fetch_attempts,
            shutdown_sender,
            task_handles: Mutex::new(vec![listener]),
        })
    }

    /// The table requests are registered in.
    pub fn table(&self) -> &CorrelationTable<Digest> {
        &self.table
    }

    /// Routes an inbound response to the request waiting for it.
    ///
    /// Returns `false` if the response matched nothing or came from a peer the
    /// request was not sent to.
    pub fn on_response(&self, from: &PeerId, response: DeltaResponse) -> bool {
        let id = response.correlation_id;
        if !self.table.try_match_from(&id, from) {
            tracing::debug!(target: "sync", correlation_id = %id, peer = %from, "Ignoring unmatched delta response");
            return false;
        }
        if let Some((_, waiter)) = self.waiters.remove(&id) {
            // The requester may have given up already.
            let _ = waiter.send(response.delta);
        }
        true
    }

    /// Stops the eviction listener.
    pub async fn close(&self) {
        self.shutdown_sender.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self.task_handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(target: "sync", error = %e, "Delta fetcher task failed");
            }
        }
        self.waiters.clear();
    }

    async fn ask(&self, peer: PeerId, digest: Digest) -> Result<Option<Delta>, FetchError> {
        let correlation_id = CorrelationId::random();
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(correlation_id, tx);
        if let Err(e) = self.table.add_pending(PendingCorrelation {
            correlation_id,
            sent_at_ms: self.clock.now_ms(),
            recipient: peer,
            content: digest,
        }) {
            self.waiters.remove(&correlation_id);
            return Err(e.into());
        }

        let request = DeltaRequest {
            correlation_id,
            digest,
        };
        if let Err(e) = self.transport.send_delta_request(peer, request).await {
            self.waiters.remove(&correlation_id);
            self.table.withdraw(&correlation_id);
            return Err(e);
        }

        match tokio::time::timeout(self.attempt_timeout, rx).await {
            Ok(Ok(delta)) => Ok(delta),
            // Evicted: the listener dropped the sender.
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                // Settle the entry now so a late answer is not credited to the peer.
                self.waiters.remove(&correlation_id);
                self.table.abandon(&correlation_id);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl DeltaFetcher for NetworkDeltaFetcher {
    async fn fetch(&self, digest: Digest) -> Result<Delta, FetchError> {
        let peers = self.transport.candidate_peers();
        if peers.is_empty() {
            let err = FetchError::NoPeers(digest);
            reconciler_errors().inc_error("fetch", err.code());
            return Err(err);
        }

        let mut last_error = None;
        for peer in peers.into_iter().take(self.max_attempts) {
            match self.ask(peer, digest).await {
                Ok(Some(delta)) => {
                    let got = delta.digest();
                    if got != digest {
                        tracing::warn!(target: "sync", %peer, expected = %digest, %got, "Peer returned a delta with the wrong digest");
                        last_error = Some(FetchError::DigestMismatch {
                            expected: digest,
                            got,
                        });
                        continue;
                    }
                    reconciler_metrics().inc_deltas_fetched();
                    tracing::debug!(target: "sync", %peer, %digest, "Fetched missing delta");
                    return Ok(delta);
                }
                Ok(None) => {
                    tracing::debug!(target: "sync", %peer, %digest, "Peer did not provide delta");
                }
                Err(FetchError::Correlation(CorrelationError::Closed)) => {
                    return Err(FetchError::Correlation(CorrelationError::Closed));
                }
                Err(e) => {
                    tracing::debug!(target: "sync", %peer, %digest, error = %e, "Delta request failed");
                    last_error = Some(e);
                }
            }
        }

        let err = last_error.unwrap_or(FetchError::Unavailable(digest));
        reconciler_errors().inc_error("fetch", err.code());
        Err(err)
    }
}

impl Drop for NetworkDeltaFetcher {
    fn drop(&mut self) {
        self.shutdown_sender.send_replace(true);
    }
}

/// Wakes requesters whose request was evicted from the table.
async fn release_evicted(
    table: CorrelationTable<Digest>,
    waiters: Arc<Waiters>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut evictions = table.eviction_events();
    drop(table);
    loop {
        tokio::select! {
            biased;
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = evictions.recv() => match event {
                Ok(event) => {
                    // Dropping the sender resolves the waiting request with "no answer".
                    waiters.remove(&event.correlation.correlation_id);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "sync", skipped, "Delta fetcher missed eviction events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests;

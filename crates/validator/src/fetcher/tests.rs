// Path: crates/validator/src/fetcher/tests.rs
use super::*;
use meridian_test_utils::clock::TokioClock;
use meridian_test_utils::fixtures::ChainFixture;
use meridian_test_utils::mocks::ScriptedTransport;
use meridian_test_utils::randomness::TestRng;
use meridian_test_utils::{assert_err, assert_in_range, assert_ok};
use meridian_types::app::{EvictionReason, ReputationKind};
use meridian_types::config::CorrelationConfig;
use tokio::sync::mpsc;

const T0: u64 = 1_700_000_000_000;

struct Harness {
    fetcher: Arc<NetworkDeltaFetcher>,
    transport: Arc<ScriptedTransport>,
    outbox: Option<mpsc::UnboundedReceiver<(PeerId, DeltaRequest)>>,
    peers: Vec<PeerId>,
}

fn harness(peer_count: usize, ttl_ms: u64, config: ReconcilerConfig) -> Harness {
    let mut rng = TestRng::default();
    let peers: Vec<PeerId> = (0..peer_count).map(|_| rng.peer_id()).collect();
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::starting_at(T0));
    let table = CorrelationTable::new(
        &CorrelationConfig {
            ttl_ms,
            ..CorrelationConfig::default()
        },
        clock.clone(),
    )
    .unwrap();
    let (transport, outbox) = ScriptedTransport::new(peers.clone());
    let fetcher = NetworkDeltaFetcher::new(table, transport.clone(), clock, &config).unwrap();
    Harness {
        fetcher: Arc::new(fetcher),
        transport,
        outbox: Some(outbox),
        peers,
    }
}

/// Answers requests as `answer` decides; `None` means stay silent. Returns the
/// peers asked so far, in order.
fn respond<F>(h: &mut Harness, answer: F) -> Arc<Mutex<Vec<PeerId>>>
where
    F: Fn(PeerId, &DeltaRequest) -> Option<Option<Delta>> + Send + 'static,
{
    let fetcher = h.fetcher.clone();
    let mut outbox = h.outbox.take().unwrap();
    let asked = Arc::new(Mutex::new(Vec::new()));
    let log = asked.clone();
    tokio::spawn(async move {
        while let Some((peer, request)) = outbox.recv().await {
            log.lock().push(peer);
            if let Some(delta) = answer(peer, &request) {
                let response = DeltaResponse {
                    correlation_id: request.correlation_id,
                    delta,
                };
                fetcher.on_response(&peer, response);
            }
        }
    });
    asked
}

#[tokio::test(start_paused = true)]
async fn test_fetch_returns_verified_delta() {
    let chain = ChainFixture::linear(5);
    let mut h = harness(2, 1_000, ReconcilerConfig::default());
    let wanted = chain.at(3).cloned().unwrap();
    let reply = wanted.clone();
    let _responder = respond(&mut h, move |_, _| Some(Some(reply.clone())));

    let delta = assert_ok!(h.fetcher.fetch(chain.digest(3)).await);
    assert_eq!(delta, wanted);
    assert!(h.fetcher.table().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wrong_delta_is_rejected_and_next_peer_asked() {
    let chain = ChainFixture::linear(5);
    let mut h = harness(2, 1_000, ReconcilerConfig::default());
    let liar = h.peers[0];
    let (bad, good) = (chain.at(2).cloned().unwrap(), chain.at(3).cloned().unwrap());
    let _responder = respond(&mut h, move |peer, _| {
        if peer == liar {
            Some(Some(bad.clone()))
        } else {
            Some(Some(good.clone()))
        }
    });

    let delta = assert_ok!(h.fetcher.fetch(chain.digest(3)).await);
    assert_eq!(delta.digest(), chain.digest(3));
}

#[tokio::test(start_paused = true)]
async fn test_only_wrong_deltas_report_mismatch() {
    let chain = ChainFixture::linear(5);
    let mut h = harness(2, 1_000, ReconcilerConfig::default());
    let bad = chain.at(2).cloned().unwrap();
    let _responder = respond(&mut h, move |_, _| Some(Some(bad.clone())));

    let err = assert_err!(h.fetcher.fetch(chain.digest(3)).await);
    assert_eq!(
        err,
        FetchError::DigestMismatch {
            expected: chain.digest(3),
            got: chain.digest(2)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_silent_peers_are_released_by_eviction() {
    let mut h = harness(3, 1_000, ReconcilerConfig::default());
    let digest = TestRng::new(1).digest();
    let asked = respond(&mut h, |_, _| None);

    let started = tokio::time::Instant::now();
    let err = assert_err!(h.fetcher.fetch(digest).await);
    assert_eq!(err, FetchError::Unavailable(digest));
    // Each attempt ends at the correlation TTL, well before the lookup timeout.
    assert_in_range!(started.elapsed().as_millis(), 3_000, 3_010);
    assert_eq!(*asked.lock(), h.peers);
    h.fetcher.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_lookup_timeout_bounds_each_attempt() {
    let config = ReconcilerConfig {
        cache_lookup_timeout_ms: 200,
        max_fetch_attempts: 2,
        ..ReconcilerConfig::default()
    };
    let mut h = harness(5, 10_000, config);
    let digest = TestRng::new(2).digest();
    let asked = respond(&mut h, |_, _| None);

    let started = tokio::time::Instant::now();
    assert_eq!(assert_err!(h.fetcher.fetch(digest).await), FetchError::Unavailable(digest));
    assert_eq!(asked.lock().len(), 2);
    assert_in_range!(started.elapsed().as_millis(), 400, 410);
    // Timed-out requests are settled at once rather than left to their TTL.
    assert!(h.fetcher.table().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_answer_after_lookup_timeout_is_not_credited() {
    let chain = ChainFixture::linear(2);
    let config = ReconcilerConfig {
        cache_lookup_timeout_ms: 200,
        max_fetch_attempts: 1,
        ..ReconcilerConfig::default()
    };
    let mut h = harness(1, 10_000, config);
    let mut evictions = h.fetcher.table().eviction_events();
    let mut reputation = h.fetcher.table().reputation_events();
    let mut outbox = h.outbox.take().unwrap();
    let fetcher = h.fetcher.clone();
    let late = chain.at(2).cloned().unwrap();
    let answered = tokio::spawn(async move {
        let (peer, request) = outbox.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let response = DeltaResponse {
            correlation_id: request.correlation_id,
            delta: Some(late),
        };
        fetcher.on_response(&peer, response)
    });

    let digest = chain.digest(2);
    assert_eq!(assert_err!(h.fetcher.fetch(digest).await), FetchError::Unavailable(digest));
    assert!(h.fetcher.table().is_empty());
    let event = assert_ok!(evictions.try_recv());
    assert_eq!(event.reason, EvictionReason::Abandoned);
    assert_eq!(event.correlation.recipient, h.peers[0]);

    assert!(!assert_ok!(answered.await));
    let kinds: Vec<ReputationKind> = std::iter::from_fn(|| reputation.try_recv().ok())
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![ReputationKind::NoResponseReceived, ReputationKind::UnsolicitedResponse]
    );

    // The TTL passing later announces nothing more.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(evictions.try_recv().is_err());
    h.fetcher.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_peers() {
    let h = harness(0, 1_000, ReconcilerConfig::default());
    let digest = TestRng::new(3).digest();
    assert_eq!(assert_err!(h.fetcher.fetch(digest).await), FetchError::NoPeers(digest));
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_and_empty_answer_move_to_next_peer() {
    let chain = ChainFixture::linear(3);
    let mut h = harness(3, 1_000, ReconcilerConfig::default());
    h.transport.fail_sends_to(h.peers[0]);
    let empty = h.peers[1];
    let good = chain.at(1).cloned().unwrap();
    let _responder = respond(&mut h, move |peer, _| {
        if peer == empty {
            Some(None)
        } else {
            Some(Some(good.clone()))
        }
    });

    let started = tokio::time::Instant::now();
    let delta = assert_ok!(h.fetcher.fetch(chain.digest(1)).await);
    assert_eq!(delta.digest(), chain.digest(1));
    assert_eq!(started.elapsed().as_millis(), 0);
    assert!(h.fetcher.table().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_response_is_ignored() {
    let h = harness(1, 1_000, ReconcilerConfig::default());
    let mut rng = TestRng::new(4);
    let response = DeltaResponse {
        correlation_id: rng.correlation_id(),
        delta: None,
    };
    assert!(!h.fetcher.on_response(&h.peers[0], response));
}

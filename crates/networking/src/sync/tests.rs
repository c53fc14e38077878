// Path: crates/networking/src/sync/tests.rs
use super::*;
use meridian_test_utils::fixtures::ChainFixture;
use meridian_test_utils::randomness::TestRng;
use meridian_types::app::Delta;
use parking_lot::Mutex;
use std::collections::HashMap;

fn synchroniser(cache: impl DeltaCache + 'static) -> ChainSynchroniser {
    ChainSynchroniser::new(Arc::new(cache), 10_000)
}

/// A cache that stores deltas under arbitrary keys, so links can be made to loop.
#[derive(Default)]
struct KeyedCache {
    entries: Mutex<HashMap<Digest, Delta>>,
    lookups: Mutex<usize>,
}

impl KeyedCache {
    fn link(&self, key: Digest, previous: Digest) {
        let delta = Delta {
            previous_digest: previous,
            sequence_number: 1,
            payload: key.as_bytes().to_vec(),
        };
        self.entries.lock().insert(key, delta);
    }
}

impl DeltaCache for KeyedCache {
    fn try_get_confirmed(&self, digest: &Digest) -> Option<Delta> {
        *self.lookups.lock() += 1;
        self.entries.lock().get(digest).cloned()
    }

    fn add_confirmed(&self, delta: Delta) -> Digest {
        let digest = delta.digest();
        self.entries.lock().insert(digest, delta);
        digest
    }
}

#[test]
fn test_walk_to_itself_yields_exactly_one_digest() {
    let mut rng = TestRng::default();
    let a = rng.digest();
    // Nothing is cached: reaching the target needs no lookup.
    let sync = synchroniser(KeyedCache::default());
    let (digests, outcome) = sync.walk(a, a, &CancellationToken::new()).run();
    assert_eq!(digests, vec![a]);
    assert_eq!(outcome, WalkOutcome::Reached);
}

#[test]
fn test_fully_cached_chain_yields_every_digest_youngest_first() {
    let chain = ChainFixture::linear(12);
    let sync = synchroniser(chain.full_cache());
    let (digests, outcome) = sync
        .walk(chain.head(), chain.digest(0), &CancellationToken::new())
        .run();
    assert_eq!(digests.len(), 13);
    assert_eq!(digests, chain.digests_youngest_first());
    assert!(outcome.is_complete());
}

#[test]
fn test_walk_to_intermediate_target_is_inclusive() {
    let chain = ChainFixture::linear(10);
    let sync = synchroniser(chain.full_cache());
    let (digests, outcome) = sync
        .walk(chain.head(), chain.digest(7), &CancellationToken::new())
        .run();
    assert_eq!(digests, vec![chain.digest(10), chain.digest(9), chain.digest(8), chain.digest(7)]);
    assert_eq!(outcome, WalkOutcome::Reached);
}

#[test]
fn test_missing_link_yields_only_younger_digests() {
    let chain = ChainFixture::linear(10);
    for k in 0..5usize {
        // Position k from the head is height 10 - k.
        let missing_height = 10 - k;
        let sync = synchroniser(chain.cache_without(&[missing_height]));
        let (digests, outcome) = sync
            .walk(chain.head(), chain.digest(0), &CancellationToken::new())
            .run();
        assert_eq!(digests.len(), k);
        assert_eq!(digests, chain.digests_youngest_first()[..k].to_vec());
        assert_eq!(outcome, WalkOutcome::Broken { missing: chain.digest(missing_height) });
    }
}

#[test]
fn test_walk_is_lazy_and_honours_cancellation() {
    let chain = ChainFixture::linear(6);
    let sync = synchroniser(chain.full_cache());
    let cancel = CancellationToken::new();
    let mut walk = sync.walk(chain.head(), chain.digest(0), &cancel);

    assert_eq!(walk.next(), Some(chain.digest(6)));
    assert_eq!(walk.next(), Some(chain.digest(5)));
    assert_eq!(walk.outcome(), None);

    cancel.cancel();
    assert_eq!(walk.next(), None);
    assert_eq!(walk.outcome(), Some(WalkOutcome::Cancelled));
    assert_eq!(walk.yielded(), 2);
    // Finished walks stay finished.
    assert_eq!(walk.next(), None);
}

#[test]
fn test_cyclic_links_terminate() {
    let mut rng = TestRng::default();
    let (a, b, c, target) = (rng.digest(), rng.digest(), rng.digest(), rng.digest());
    let cache = KeyedCache::default();
    cache.link(a, b);
    cache.link(b, c);
    cache.link(c, a);
    let cache = Arc::new(cache);
    let sync = ChainSynchroniser::new(cache.clone(), 10_000);

    let (digests, outcome) = sync.walk(a, target, &CancellationToken::new()).run();
    assert_eq!(digests, vec![a, b, c]);
    assert_eq!(outcome, WalkOutcome::CycleDetected { at: a });
    assert_eq!(*cache.lookups.lock(), 3);
}

#[test]
fn test_depth_limit_bounds_the_walk() {
    let chain = ChainFixture::linear(20);
    let sync = ChainSynchroniser::new(Arc::new(chain.full_cache()), 5);
    let (digests, outcome) = sync
        .walk(chain.head(), chain.digest(0), &CancellationToken::new())
        .run();
    assert_eq!(digests.len(), 5);
    assert_eq!(outcome, WalkOutcome::DepthExceeded);
    assert_eq!(outcome.as_str(), "depth_exceeded");
}

#[test]
fn test_concurrent_walks_share_one_cache() {
    let chain = ChainFixture::linear(50);
    let sync = synchroniser(chain.full_cache());
    let expected = chain.digests_youngest_first();

    std::thread::scope(|s| {
        for _ in 0..4 {
            let sync = sync.clone();
            let expected = &expected;
            let (head, genesis) = (chain.head(), chain.digest(0));
            s.spawn(move || {
                let (digests, outcome) = sync.walk(head, genesis, &CancellationToken::new()).run();
                assert_eq!(&digests, expected);
                assert!(outcome.is_complete());
            });
        }
    });
}

#[test]
fn test_oldest_sequence_tracks_resolved_deltas() {
    let chain = ChainFixture::linear(10);
    let sync = synchroniser(chain.full_cache());
    let mut walk = sync.walk(chain.head(), chain.digest(7), &CancellationToken::new());
    assert_eq!(walk.oldest_sequence(), None);
    assert_eq!(walk.by_ref().count(), 4);
    // Heights 10, 9 and 8 were looked up; the target was not.
    assert_eq!(walk.oldest_sequence(), Some(chain.at(8).unwrap().sequence_number));
}

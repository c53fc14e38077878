// Path: crates/api/src/delta/memory.rs

//! A bounded in-memory delta cache.

use super::DeltaCache;
use lru::LruCache;
use meridian_types::app::{Delta, Digest};
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// An LRU-bounded [`DeltaCache`] with a pinned genesis delta.
///
/// The genesis delta is held outside the LRU and can never be evicted, so a
/// walk that reaches the bottom of the chain always resolves.
pub struct MemoryDeltaCache {
    genesis: Delta,
    genesis_digest: Digest,
    entries: Mutex<LruCache<Digest, Delta>>,
}

impl std::fmt::Debug for MemoryDeltaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDeltaCache")
            .field("genesis", &self.genesis_digest)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl MemoryDeltaCache {
    /// Creates a cache holding `genesis` plus up to `capacity` further deltas.
    pub fn new(genesis: Delta, capacity: NonZeroUsize) -> Self {
        let genesis_digest = genesis.digest();
        Self {
            genesis,
            genesis_digest,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Like [`MemoryDeltaCache::new`], treating a zero capacity as one.
    pub fn with_capacity(genesis: Delta, capacity: usize) -> Self {
        Self::new(genesis, NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
    }

    /// Digest of the pinned genesis delta.
    pub fn genesis_digest(&self) -> Digest {
        self.genesis_digest
    }

    /// Number of cached deltas, genesis included.
    pub fn len(&self) -> usize {
        self.entries.lock().len() + 1
    }

    /// Always false; the genesis delta is always present.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl DeltaCache for MemoryDeltaCache {
    fn try_get_confirmed(&self, digest: &Digest) -> Option<Delta> {
        if *digest == self.genesis_digest {
            return Some(self.genesis.clone());
        }
        self.entries.lock().get(digest).cloned()
    }

    fn add_confirmed(&self, delta: Delta) -> Digest {
        let digest = delta.digest();
        if digest == self.genesis_digest {
            return digest;
        }
        let evicted = self.entries.lock().push(digest, delta);
        if let Some((old, _)) = evicted {
            if old != digest {
                log::debug!("[DeltaCache] Evicted delta {} to make room for {}", old, digest);
            }
        }
        digest
    }

    fn contains(&self, digest: &Digest) -> bool {
        *digest == self.genesis_digest || self.entries.lock().contains(digest)
    }
}

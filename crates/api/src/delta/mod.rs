// Path: crates/api/src/delta/mod.rs
//! The content-addressed store of confirmed deltas.

use meridian_types::app::{Delta, Digest};

mod memory;
pub use memory::MemoryDeltaCache;

/// A store mapping digests to confirmed deltas.
///
/// Implementations must be safe for concurrent readers; several chain walks may
/// run against one cache at the same time. A miss is not an error, it means the
/// delta has to be fetched from the network.
pub trait DeltaCache: Send + Sync {
    /// Returns the confirmed delta for `digest`, if present.
    fn try_get_confirmed(&self, digest: &Digest) -> Option<Delta>;

    /// Stores a confirmed delta under its own digest and returns that digest.
    fn add_confirmed(&self, delta: Delta) -> Digest;

    /// True if `digest` is present.
    fn contains(&self, digest: &Digest) -> bool {
        self.try_get_confirmed(digest).is_some()
    }
}

impl<T: DeltaCache + ?Sized> DeltaCache for std::sync::Arc<T> {
    fn try_get_confirmed(&self, digest: &Digest) -> Option<Delta> {
        (**self).try_get_confirmed(digest)
    }

    fn add_confirmed(&self, delta: Delta) -> Digest {
        (**self).add_confirmed(delta)
    }

    fn contains(&self, digest: &Digest) -> bool {
        (**self).contains(digest)
    }
}

/// Reports the latest delta this node has confirmed.
pub trait LatestDeltaProvider: Send + Sync {
    /// Digest of the most recent confirmed delta, or `None` before genesis is known.
    fn latest_delta_digest(&self) -> Option<Digest>;
}

// Path: crates/networking/src/sync/mod.rs

//! Backward traversal of the digest-linked delta chain held in the local cache.

use meridian_api::delta::DeltaCache;
use meridian_telemetry::sync_metrics;
use meridian_types::app::Digest;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a chain walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// The target digest was reached and yielded.
    Reached,
    /// `missing` is not in the cache. Everything younger was yielded.
    Broken {
        /// The first digest the cache could not resolve.
        missing: Digest,
    },
    /// The cancellation token fired between two cache lookups.
    Cancelled,
    /// `at` was reached a second time through `previous_digest` links.
    CycleDetected {
        /// The digest seen twice.
        at: Digest,
    },
    /// The walk yielded the configured maximum number of digests without
    /// reaching the target.
    DepthExceeded,
}

impl WalkOutcome {
    /// A stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            WalkOutcome::Reached => "reached",
            WalkOutcome::Broken { .. } => "broken",
            WalkOutcome::Cancelled => "cancelled",
            WalkOutcome::CycleDetected { .. } => "cycle",
            WalkOutcome::DepthExceeded => "depth_exceeded",
        }
    }

    /// True only for [`WalkOutcome::Reached`].
    pub fn is_complete(&self) -> bool {
        matches!(self, WalkOutcome::Reached)
    }
}

/// Walks the chain between two digests through a [`DeltaCache`].
#[derive(Clone)]
pub struct ChainSynchroniser {
    cache: Arc<dyn DeltaCache>,
    max_depth: usize,
}

impl std::fmt::Debug for ChainSynchroniser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSynchroniser")
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl ChainSynchroniser {
    /// A synchroniser yielding at most `max_depth` digests per walk.
    pub fn new(cache: Arc<dyn DeltaCache>, max_depth: usize) -> Self {
        Self {
            cache,
            max_depth: max_depth.max(1),
        }
    }

    /// The cache this synchroniser reads.
    pub fn cache(&self) -> &Arc<dyn DeltaCache> {
        &self.cache
    }

    /// Starts a lazy walk from `from` back towards `to`.
    ///
    /// The walk yields `from` first and follows each cached delta's
    /// `previous_digest`. It stops after yielding `to`, when the cache misses
    /// (the missing digest is not yielded), or when `cancel` fires. None of
    /// these are errors; [`ChainWalk::outcome`] tells them apart.
    pub fn walk(&self, from: Digest, to: Digest, cancel: &CancellationToken) -> ChainWalk {
        tracing::trace!(target: "sync", %from, %to, "Starting chain walk");
        ChainWalk {
            cache: self.cache.clone(),
            cancel: cancel.clone(),
            next: from,
            to,
            seen: HashSet::new(),
            max_depth: self.max_depth,
            yielded: 0,
            oldest_sequence: None,
            outcome: None,
        }
    }
}

/// A lazy, youngest-first sequence of digests. See [`ChainSynchroniser::walk`].
pub struct ChainWalk {
    cache: Arc<dyn DeltaCache>,
    cancel: CancellationToken,
    next: Digest,
    to: Digest,
    seen: HashSet<Digest>,
    max_depth: usize,
    yielded: usize,
    oldest_sequence: Option<u64>,
    outcome: Option<WalkOutcome>,
}

impl ChainWalk {
    /// How the walk ended, or `None` while it can still yield.
    pub fn outcome(&self) -> Option<WalkOutcome> {
        self.outcome
    }

    /// Number of digests yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Sequence number of the oldest delta resolved through the cache so far.
    ///
    /// The target itself is yielded without a lookup, so it never contributes.
    pub fn oldest_sequence(&self) -> Option<u64> {
        self.oldest_sequence
    }

    /// Drives the walk to its end.
    pub fn run(mut self) -> (Vec<Digest>, WalkOutcome) {
        let digests: Vec<Digest> = self.by_ref().collect();
        let outcome = self.outcome.unwrap_or(WalkOutcome::Cancelled);
        (digests, outcome)
    }

    fn finish(&mut self, outcome: WalkOutcome) {
        let metrics = sync_metrics();
        metrics.observe_walk_length(self.yielded);
        metrics.inc_walk_outcome(outcome.as_str());
        match outcome {
            WalkOutcome::Reached => {
                tracing::debug!(target: "sync", yielded = self.yielded, to = %self.to, "Chain walk reached its target")
            }
            WalkOutcome::Broken { missing } => {
                tracing::debug!(target: "sync", yielded = self.yielded, %missing, "Chain walk stopped at a cache miss")
            }
            WalkOutcome::Cancelled => {
                tracing::debug!(target: "sync", yielded = self.yielded, "Chain walk cancelled")
            }
            WalkOutcome::CycleDetected { at } => {
                tracing::error!(target: "sync", yielded = self.yielded, %at, "Cycle in previous_digest links")
            }
            WalkOutcome::DepthExceeded => {
                tracing::warn!(target: "sync", yielded = self.yielded, max_depth = self.max_depth, to = %self.to, "Chain walk exceeded its depth limit")
            }
        }
        self.outcome = Some(outcome);
    }
}

impl Iterator for ChainWalk {
    type Item = Digest;

    fn next(&mut self) -> Option<Digest> {
        if self.outcome.is_some() {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finish(WalkOutcome::Cancelled);
            return None;
        }
        let current = self.next;
        if current == self.to {
            self.yielded += 1;
            self.finish(WalkOutcome::Reached);
            return Some(current);
        }
        if self.yielded >= self.max_depth {
            self.finish(WalkOutcome::DepthExceeded);
            return None;
        }
        if !self.seen.insert(current) {
            self.finish(WalkOutcome::CycleDetected { at: current });
            return None;
        }
        match self.cache.try_get_confirmed(&current) {
            Some(delta) => {
                self.next = delta.previous_digest;
                self.oldest_sequence = Some(delta.sequence_number);
                self.yielded += 1;
                Some(current)
            }
            None => {
                self.finish(WalkOutcome::Broken { missing: current });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;

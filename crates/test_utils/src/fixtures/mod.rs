//! Delta chain fixtures

use meridian_api::delta::{DeltaCache, MemoryDeltaCache};
use meridian_types::app::{Delta, Digest};

/// A linear chain of linked deltas, genesis first.
#[derive(Debug, Clone)]
pub struct ChainFixture {
    genesis: Delta,
    deltas: Vec<Delta>,
}

impl ChainFixture {
    /// A chain of `links` deltas on top of a genesis delta, `links + 1` deltas in total.
    pub fn linear(links: usize) -> Self {
        let mut deltas = Vec::with_capacity(links + 1);
        let genesis = Delta::genesis(b"meridian-genesis".to_vec());
        let mut tip = genesis.clone();
        deltas.push(tip.clone());
        for i in 0..links {
            tip = tip.child(format!("delta-{}", i + 1).into_bytes());
            deltas.push(tip.clone());
        }
        Self { genesis, deltas }
    }

    /// Extends the chain by `links` deltas.
    pub fn extend(&mut self, links: usize) {
        for _ in 0..links {
            if let Some(tip) = self.deltas.last() {
                let next = tip.child(format!("delta-{}", self.deltas.len()).into_bytes());
                self.deltas.push(next);
            }
        }
    }

    /// A sibling chain sharing this chain's deltas up to `height`, then
    /// continuing with `links` different deltas.
    pub fn fork_at(&self, height: usize, links: usize) -> Self {
        let mut deltas: Vec<Delta> = self.deltas.iter().take(height + 1).cloned().collect();
        for i in 0..links {
            if let Some(tip) = deltas.last() {
                let next = tip.child(format!("fork-{}-{}", height, i + 1).into_bytes());
                deltas.push(next);
            }
        }
        Self {
            genesis: self.genesis.clone(),
            deltas,
        }
    }

    /// All deltas, genesis first.
    pub fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    /// The delta at `height`, if the chain is that long.
    pub fn at(&self, height: usize) -> Option<&Delta> {
        self.deltas.get(height)
    }

    /// Digest of the delta at `height`, or [`Digest::ZERO`] past the tip.
    pub fn digest(&self, height: usize) -> Digest {
        self.at(height).map(Delta::digest).unwrap_or(Digest::ZERO)
    }

    /// The genesis delta.
    pub fn genesis(&self) -> &Delta {
        &self.genesis
    }

    /// Digest of the newest delta.
    pub fn head(&self) -> Digest {
        self.digest(self.deltas.len().saturating_sub(1))
    }

    /// Every digest from the head down to genesis.
    pub fn digests_youngest_first(&self) -> Vec<Digest> {
        self.deltas.iter().rev().map(Delta::digest).collect()
    }

    /// A cache holding every delta.
    pub fn full_cache(&self) -> MemoryDeltaCache {
        self.cache_without(&[])
    }

    /// A cache holding every delta except those at the given heights.
    /// Genesis is always present.
    pub fn cache_without(&self, missing_heights: &[usize]) -> MemoryDeltaCache {
        let cache = MemoryDeltaCache::with_capacity(self.genesis().clone(), self.deltas.len() + 1);
        for (height, delta) in self.deltas.iter().enumerate().skip(1) {
            if !missing_heights.contains(&height) {
                cache.add_confirmed(delta.clone());
            }
        }
        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_chain_is_linked() {
        let chain = ChainFixture::linear(5);
        assert_eq!(chain.deltas().len(), 6);
        for pair in chain.deltas().windows(2) {
            assert_eq!(pair[1].previous_digest, pair[0].digest());
            assert_eq!(pair[1].sequence_number, pair[0].sequence_number + 1);
        }
        assert_eq!(chain.digests_youngest_first().first(), Some(&chain.head()));
    }

    #[test]
    fn test_cache_without_skips_heights() {
        let chain = ChainFixture::linear(4);
        let cache = chain.cache_without(&[2, 0]);
        assert!(cache.contains(&chain.digest(0)));
        assert!(cache.contains(&chain.digest(1)));
        assert!(!cache.contains(&chain.digest(2)));
        assert!(cache.contains(&chain.digest(4)));
    }
}

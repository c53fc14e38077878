// Path: crates/types/src/app/delta.rs
//! Content-addressed ledger deltas and the digests that link them.

use crate::codec::to_bytes_canonical;
use crate::error::DigestParseError;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// The length in bytes of a [`Digest`].
pub const DIGEST_LEN: usize = 32;

/// A content-derived identifier for a [`Delta`].
///
/// Digests are compared by byte equality. They serve both as the cache key for a
/// confirmed delta and as the backward pointer that links a delta to its parent.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Encode, Decode, Serialize, Deserialize,
)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// The parent pointer carried by the genesis delta. No delta hashes to it.
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    /// Computes the SHA-256 digest of arbitrary bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&Sha256::digest(bytes));
        Digest(out)
    }

    /// Parses a digest from its lowercase or uppercase hex form.
    pub fn from_hex(s: &str) -> Result<Self, DigestParseError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| DigestParseError::InvalidHex(e.to_string()))?;
        let arr: [u8; DIGEST_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            DigestParseError::WrongLength {
                expected: DIGEST_LEN,
                got: v.len(),
            }
        })?;
        Ok(Digest(arr))
    }

    /// Returns true for the genesis parent pointer.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight bytes are enough to tell digests apart in logs.
        let short: String = hex::encode(self.0).chars().take(16).collect();
        write!(f, "Digest({}..)", short)
    }
}

/// A unit of ledger state change.
///
/// A delta is immutable once confirmed. Its digest is never stored; it is always
/// recomputed from the canonical encoding so that a delta received from a peer
/// can be checked against the digest it was requested under.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Delta {
    /// Digest of the parent delta, or [`Digest::ZERO`] for genesis.
    pub previous_digest: Digest,
    /// Height of this delta in the chain. Genesis is 0.
    pub sequence_number: u64,
    /// Opaque state-change payload.
    pub payload: Vec<u8>,
}

impl Delta {
    /// Builds the first delta of a chain.
    pub fn genesis(payload: Vec<u8>) -> Self {
        Self {
            previous_digest: Digest::ZERO,
            sequence_number: 0,
            payload,
        }
    }

    /// Builds the delta that directly follows `self`.
    pub fn child(&self, payload: Vec<u8>) -> Self {
        Self {
            previous_digest: self.digest(),
            sequence_number: self.sequence_number.saturating_add(1),
            payload,
        }
    }

    /// The content digest of this delta.
    pub fn digest(&self) -> Digest {
        Digest::of(&to_bytes_canonical(self))
    }

    /// True if this delta has no parent.
    pub fn is_genesis(&self) -> bool {
        self.previous_digest.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_digest_changes_with_content() {
        let genesis = Delta::genesis(b"genesis".to_vec());
        let a = genesis.child(b"a".to_vec());
        let b = genesis.child(b"b".to_vec());

        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), a.clone().digest());
        assert_eq!(a.previous_digest, genesis.digest());
        assert_eq!(a.sequence_number, 1);
        assert!(genesis.is_genesis());
        assert!(!a.is_genesis());
    }

    #[test]
    fn test_digest_hex_round_trip_and_display() {
        let d = Delta::genesis(vec![1, 2, 3]).digest();
        let shown = d.to_string();
        assert_eq!(shown.len(), DIGEST_LEN * 2);
        assert_eq!(Digest::from_hex(&shown).unwrap(), d);
        assert_eq!(Digest::from_hex(&format!("0x{shown}")).unwrap(), d);
        assert_eq!(
            Digest::from_hex("abcd"),
            Err(DigestParseError::WrongLength {
                expected: DIGEST_LEN,
                got: 2
            })
        );
        let bad = Digest::from_hex("zz").unwrap_err();
        assert!(matches!(bad, DigestParseError::InvalidHex(_)));
        assert_eq!(bad.code(), "DIGEST_INVALID_HEX");
    }

    #[test]
    fn test_zero_digest_is_never_a_delta_digest() {
        assert!(Digest::ZERO.is_zero());
        assert!(!Delta::genesis(Vec::new()).digest().is_zero());
    }
}

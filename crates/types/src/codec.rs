// Path: crates/types/src/codec.rs

//! Defines the canonical, deterministic binary codec for deltas and digests.
//!
//! A delta's digest is derived from its encoded bytes, so every node must encode
//! the same delta to the same bytes. The wrappers here around `parity-scale-codec`
//! (SCALE) are the single place that encoding is defined.

use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Encodes a value into its canonical SCALE byte representation.
///
/// Use this for anything that is hashed into a digest or sent to a peer.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Vec<u8> {
    v.encode()
}

/// Decodes a value from its canonical SCALE byte representation.
///
/// Trailing bytes are rejected, so a payload decodes only if it is exactly the
/// encoding of one `T`.
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, String> {
    T::decode_all(&mut &*b).map_err(|e| format!("canonical decode failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Encode, Decode, Debug, PartialEq, Eq)]
    struct Envelope {
        sequence: u64,
        parent: [u8; 32],
        body: Vec<u8>,
    }

    #[test]
    fn test_canonical_encoding_is_stable() {
        let a = Envelope {
            sequence: 7,
            parent: [9u8; 32],
            body: vec![1, 2, 3],
        };
        let b = Envelope {
            sequence: 7,
            parent: [9u8; 32],
            body: vec![1, 2, 3],
        };
        assert_eq!(to_bytes_canonical(&a), to_bytes_canonical(&b));

        let decoded = from_bytes_canonical::<Envelope>(&to_bytes_canonical(&a)).unwrap();
        assert_eq!(decoded, a);
    }

    #[test]
    fn test_canonical_decode_rejects_trailing_and_truncated_bytes() {
        let value = Envelope {
            sequence: 1,
            parent: [0u8; 32],
            body: vec![10, 20, 30],
        };

        let mut trailing = to_bytes_canonical(&value);
        trailing.push(0xff);
        let err = from_bytes_canonical::<Envelope>(&trailing).unwrap_err();
        assert!(err.contains("canonical decode failed"));

        let mut truncated = to_bytes_canonical(&value);
        truncated.pop();
        assert!(from_bytes_canonical::<Envelope>(&truncated).is_err());
    }
}

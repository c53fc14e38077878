// Path: crates/types/src/app/correlation.rs
//! Value types for request/response correlation and the peer reputation
//! signals derived from it.

use crate::app::{Delta, Digest};
use libp2p::PeerId;
use parity_scale_codec::{Decode, Encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque token linking an outbound request to its eventual response.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize)]
pub struct CorrelationId(pub [u8; 16]);

impl CorrelationId {
    /// Generates a fresh random identifier from the thread-local RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        CorrelationId(bytes)
    }
}

impl From<[u8; 16]> for CorrelationId {
    fn from(bytes: [u8; 16]) -> Self {
        CorrelationId(bytes)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", hex::encode(self.0))
    }
}

/// A request for the confirmed delta with the given digest.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct DeltaRequest {
    /// Identifier the response must echo.
    pub correlation_id: CorrelationId,
    /// The digest being asked for.
    pub digest: Digest,
}

/// A peer's answer to a [`DeltaRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct DeltaResponse {
    /// Identifier of the request being answered.
    pub correlation_id: CorrelationId,
    /// The delta, or `None` if the peer does not have it.
    pub delta: Option<Delta>,
}

/// An outstanding request awaiting its response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCorrelation<C> {
    /// Identifier the response must echo.
    pub correlation_id: CorrelationId,
    /// When the request was dispatched, in milliseconds since the Unix epoch.
    pub sent_at_ms: u64,
    /// The peer the request was sent to.
    pub recipient: PeerId,
    /// The original request content.
    pub content: C,
}

/// Why a pending correlation left the table without being matched.
///
/// This is best-effort metadata for reputation and retry policy. It must not be
/// used for correctness decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvictionReason {
    /// The entry's time-to-live elapsed.
    Expired,
    /// The table was full and the oldest entry made room for a new one.
    Capacity,
    /// The requester stopped waiting before a response or the TTL.
    Abandoned,
}

impl EvictionReason {
    /// A stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Expired => "expired",
            EvictionReason::Capacity => "capacity",
            EvictionReason::Abandoned => "abandoned",
        }
    }
}

/// Emitted exactly once for every pending correlation that is evicted unmatched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictionEvent<C> {
    /// The request as it was registered.
    pub correlation: PendingCorrelation<C>,
    /// Why it was evicted.
    pub reason: EvictionReason,
    /// When it was evicted, in milliseconds since the Unix epoch.
    pub evicted_at_ms: u64,
}

/// The kind of peer behaviour observed by the correlation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReputationKind {
    /// The peer answered a request in time.
    ResponseReceived,
    /// The peer never answered a request.
    NoResponseReceived,
    /// The peer sent a response nobody was waiting for.
    UnsolicitedResponse,
}

impl ReputationKind {
    /// The score adjustment external reputation logic should apply.
    pub fn score_delta(&self) -> i32 {
        match self {
            ReputationKind::ResponseReceived => 10,
            ReputationKind::NoResponseReceived => -10,
            ReputationKind::UnsolicitedResponse => -20,
        }
    }
}

/// A reputation change for a single peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReputationEvent {
    /// The peer the change applies to.
    pub peer: PeerId,
    /// What the peer did.
    pub kind: ReputationKind,
}

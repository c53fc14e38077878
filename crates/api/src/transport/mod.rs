// Path: crates/api/src/transport/mod.rs
//! The outbound half of the peer transport.
//!
//! Connection handling and wire encoding live outside the core. Responses
//! travel back through whoever owns the inbound side, which hands them to the
//! fetcher that registered the request.

use async_trait::async_trait;
use libp2p::PeerId;
use meridian_types::app::DeltaRequest;
use meridian_types::error::FetchError;

/// Sends delta requests to peers.
#[async_trait]
pub trait DeltaTransport: Send + Sync {
    /// Peers that may be able to serve deltas, in order of preference.
    fn candidate_peers(&self) -> Vec<PeerId>;

    /// Dispatches `request` to `peer`. Returns once the request is handed to
    /// the network, not when the response arrives.
    async fn send_delta_request(&self, peer: PeerId, request: DeltaRequest)
        -> Result<(), FetchError>;
}

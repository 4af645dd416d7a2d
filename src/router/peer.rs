//! # Peer Channel
//!
//! The proximity channel between relays. A channel advertises this device
//! under a display name and role, browses for others, and carries job
//! payloads over reliable sessions. Results arrive as [`PeerEvent`]s.
//!
//! ## Wire payload
//!
//! One message per job: the job's frame list serialized as JSON
//! (`[[27,64],[29,118,48,0,...],[27,100,1]]`). There is no envelope; the
//! receiver treats every message as exactly one job.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use super::role::Role;
use crate::error::{RelayError, Result};

/// Display name of a remote relay.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session state for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    NotConnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A relay advertising `role` was found
    Found { peer: PeerId, role: Role },
    Lost { peer: PeerId },
    StateChanged { peer: PeerId, state: PeerState },
    Received { peer: PeerId, payload: Vec<u8> },
    AdvertiseFailed(String),
    BrowseFailed(String),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;
pub type PeerEventReceiver = mpsc::UnboundedReceiver<PeerEvent>;

pub fn peer_channel() -> (PeerEventSender, PeerEventReceiver) {
    mpsc::unbounded_channel()
}

/// Advertising, browsing and session transport between relays.
#[async_trait]
pub trait PeerChannel: Send + Sync + 'static {
    /// Start advertising `name` under `role` and browsing for others.
    /// Restarts cleanly if already running.
    async fn start(&self, role: Role, name: &str) -> Result<()>;

    /// Stop advertising and browsing, and drop every session.
    async fn stop(&self) -> Result<()>;

    /// Open a session with a found peer.
    async fn invite(&self, peer: &PeerId) -> Result<()>;

    /// Deliver one payload reliably to each listed peer.
    async fn send(&self, peers: &[PeerId], payload: &[u8]) -> Result<()>;
}

/// Serialize a frame list for a peer.
pub fn encode_job(frames: &[Vec<u8>]) -> Result<Vec<u8>> {
    serde_json::to_vec(frames).map_err(|e| RelayError::PeerSend(e.to_string()))
}

/// Parse a peer payload back into a frame list.
pub fn decode_job(payload: &[u8]) -> Result<Vec<Vec<u8>>> {
    serde_json::from_slice(payload).map_err(|e| RelayError::Decode(format!("peer payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_payload_shape() {
        let frames = vec![vec![0x1B, 0x40], vec![0x1B, 0x64, 0x01]];
        let payload = encode_job(&frames).unwrap();
        assert_eq!(payload, b"[[27,64],[27,100,1]]");
        assert_eq!(decode_job(&payload).unwrap(), frames);
    }

    #[test]
    fn test_garbage_payload_is_decode_error() {
        assert!(matches!(decode_job(b"{\"x\":1}"), Err(RelayError::Decode(_))));
        assert!(matches!(decode_job(b"[[300]]"), Err(RelayError::Decode(_))));
    }
}

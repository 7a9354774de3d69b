//! The seam between signaling and the WebRTC engine.
//!
//! Signaling drives the offer/answer exchange through [`PeerConnection`];
//! the engine reports asynchronous happenings back as [`PeerEvent`]s over a
//! channel so they can be handled on the event loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PeerError;
use crate::track::{LocalTrack, RemoteTrack};

// MARK: - IceServer

/// ICE server entry as delivered in the Sora `offer` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

// MARK: - PeerEvent

#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local ICE candidate to trickle to the server.
    IceCandidate { sdp_mline_index: u32, candidate: String },
    /// A remote track started flowing.
    Track(RemoteTrack),
    /// A remote track went away.
    RemoveTrack { track_id: String },
    /// The transport failed irrecoverably.
    ConnectionFailed { reason: String },
}

// MARK: - PeerConnection

/// Minimal peer-connection surface needed by an answering Sora client.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Apply the ICE servers announced by the signaling server.
    fn configure_ice_servers(&self, servers: &[IceServer]);

    /// Apply the remote offer.
    async fn set_remote_offer(&self, sdp: &str) -> Result<(), PeerError>;

    /// Create an answer, apply it locally, and return its SDP text.
    async fn create_answer(&self) -> Result<String, PeerError>;

    /// Publish a local track under the given stream ids.
    fn add_track(&self, track: LocalTrack, stream_ids: &[String]) -> Result<(), PeerError>;

    /// Tear the connection down. Idempotent.
    fn close(&self);
}

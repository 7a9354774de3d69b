//! sora-signaling: Sora WebSocket signaling.
//!
//! # Lifecycle
//!
//! ```text
//! 1. SoraSignaling::new(config, peer, peer_events, observer)
//! 2. signaling.connect()          ← spawns the session task on the current runtime
//!       ├─ → connect
//!       ├─ ← offer      → PeerConnection::set_remote_offer
//!       │                 SignalingObserver::on_set_offer
//!       │                 PeerConnection::create_answer → answer
//!       ├─ ← ping       → pong
//!       └─ PeerEvent::IceCandidate → candidate
//! 3. signaling.disconnect()       ← → disconnect, close websocket
//!       └─ SignalingObserver::on_disconnect(code, message)   (exactly once)
//! ```

pub mod client;
pub mod message;

pub use client::{
    Signaling, SignalingConfig, SignalingErrorCode, SignalingObserver, SoraSignaling,
};
pub use message::{ClientMessage, ServerMessage, VideoSetting};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("WebSocket connect failed: {0}")]
    Connect(String),

    #[error("WebSocket send failed: {0}")]
    Send(String),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

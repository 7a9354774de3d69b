pub mod errors;
pub mod frame;
pub mod peer;
pub mod track;
pub mod types;

pub use errors::PeerError;
pub use frame::{monotonic_us, I420Frame};
pub use peer::{IceServer, PeerConnection, PeerEvent};
pub use track::{
    AudioOptions, AudioTrack, CaptureDevice, LocalTrack, RemoteTrack, VideoSink, VideoTrack,
};
pub use types::*;

/// A fresh 32-character random identifier for tracks and streams.
pub fn random_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

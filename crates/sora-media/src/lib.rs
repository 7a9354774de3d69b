//! sora-media: GStreamer media engine for the Sora samples.
//!
//! # Pipelines
//!
//! ```text
//! camera:   v4l2src | autovideosrc → videoconvert → videoscale → videorate
//!             → video/x-raw,format=I420 → appsink ──► VideoSink
//!
//! send:     VideoTrack ──► appsrc (I420) → videoconvert → <encoder> → <payloader> ─┐
//!           autoaudiosrc → webrtcdsp → opusenc → rtpopuspay ──────────────────────┤
//!                                                                                 ▼
//!                                                                            webrtcbin
//!                                                                                 │
//! receive:  decodebin ◄───────────────────────────────────────────────────────────┘
//!             ├─ video → videoconvert → I420 appsink ──► remote VideoTrack
//!             └─ audio → audiomixer → webrtcechoprobe → autoaudiosink
//! ```

pub mod camera;
pub mod codec;
pub mod convert;
pub mod peer;

pub use camera::{CameraCapturer, CameraConfig};
pub use codec::{send_chain, SendChain};
pub use peer::{PeerConfig, WebRtcBinPeer};

use gstreamer as gst;
use sora_core::PeerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("GStreamer init failed: {0}")]
    Init(String),

    #[error("GStreamer element not available: {0}")]
    MissingElement(String),

    #[error("GStreamer pipeline error: {0}")]
    Pipeline(String),
}

impl From<gst::glib::Error> for MediaError {
    fn from(e: gst::glib::Error) -> Self {
        Self::Pipeline(e.to_string())
    }
}

impl From<gst::glib::BoolError> for MediaError {
    fn from(e: gst::glib::BoolError) -> Self {
        Self::Pipeline(e.to_string())
    }
}

impl From<gst::StateChangeError> for MediaError {
    fn from(e: gst::StateChangeError) -> Self {
        Self::Pipeline(e.to_string())
    }
}

impl From<MediaError> for PeerError {
    fn from(e: MediaError) -> Self {
        PeerError::Pipeline(e.to_string())
    }
}

/// Initialise GStreamer. Cheap to call repeatedly.
pub fn init() -> Result<(), MediaError> {
    gst::init().map_err(|e| MediaError::Init(e.to_string()))
}

pub(crate) fn make_element(factory: &str, name: Option<&str>) -> Result<gst::Element, MediaError> {
    let mut builder = gst::ElementFactory::make(factory);
    if let Some(name) = name {
        builder = builder.name(name);
    }
    builder.build().map_err(|_| MediaError::MissingElement(factory.to_owned()))
}

pub(crate) fn element_available(factory: &str) -> bool {
    gst::ElementFactory::find(factory).is_some()
}

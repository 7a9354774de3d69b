//! Media tracks and the frame-consumer seam between sources and sinks.

use std::sync::{Arc, PoisonError, RwLock};

use crate::frame::I420Frame;
use crate::types::TrackKind;

// MARK: - VideoSink

/// Consumer of raw video frames.
///
/// Called from whichever thread produced the frame (pipe reader thread,
/// GStreamer streaming thread); implementations must not block for long.
pub trait VideoSink: Send + Sync {
    fn on_frame(&self, frame: &I420Frame);
}

// MARK: - CaptureDevice

/// A running frame producer that must be kept alive while its track is in
/// use and stopped on teardown.
pub trait CaptureDevice: Send {
    fn stop(&mut self);
}

// MARK: - VideoTrack

/// A video stream. Frames pushed into the track are fanned out to every
/// attached sink.
pub struct VideoTrack {
    id: String,
    sinks: RwLock<Vec<Arc<dyn VideoSink>>>,
}

impl VideoTrack {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), sinks: RwLock::new(Vec::new()) }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_sink(&self, sink: Arc<dyn VideoSink>) {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        if !sinks.iter().any(|s| same_sink(s, &sink)) {
            sinks.push(sink);
        }
    }

    pub fn remove_sink(&self, sink: &Arc<dyn VideoSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| !same_sink(s, sink));
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl VideoSink for VideoTrack {
    fn on_frame(&self, frame: &I420Frame) {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        for sink in sinks.iter() {
            sink.on_frame(frame);
        }
    }
}

impl std::fmt::Debug for VideoTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoTrack")
            .field("id", &self.id)
            .field("sinks", &self.sink_count())
            .finish()
    }
}

fn same_sink(a: &Arc<dyn VideoSink>, b: &Arc<dyn VideoSink>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

// MARK: - AudioOptions

/// Audio processing switches. `None` leaves the engine default in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioOptions {
    pub echo_cancellation: Option<bool>,
    pub auto_gain_control: Option<bool>,
    pub noise_suppression: Option<bool>,
    pub highpass_filter: Option<bool>,
    pub residual_echo_detector: Option<bool>,
}

impl std::fmt::Display for AudioOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn field(f: &mut std::fmt::Formatter<'_>, name: &str, value: Option<bool>) -> std::fmt::Result {
            match value {
                Some(v) => write!(f, "{name}: {v}, "),
                None => Ok(()),
            }
        }
        f.write_str("AudioOptions {")?;
        field(f, "aec", self.echo_cancellation)?;
        field(f, "agc", self.auto_gain_control)?;
        field(f, "ns", self.noise_suppression)?;
        field(f, "hf", self.highpass_filter)?;
        field(f, "red", self.residual_echo_detector)?;
        f.write_str("}")
    }
}

// MARK: - AudioTrack

/// A local microphone track. The capture itself is owned by the media
/// engine; the track carries the processing options to apply.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    id: String,
    options: AudioOptions,
}

impl AudioTrack {
    pub fn new(id: impl Into<String>, options: AudioOptions) -> Self {
        Self { id: id.into(), options }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &AudioOptions {
        &self.options
    }
}

// MARK: - LocalTrack / RemoteTrack

/// A track published to the peer.
#[derive(Debug, Clone)]
pub enum LocalTrack {
    Audio(Arc<AudioTrack>),
    Video(Arc<VideoTrack>),
}

impl LocalTrack {
    pub fn kind(&self) -> TrackKind {
        match self {
            Self::Audio(_) => TrackKind::Audio,
            Self::Video(_) => TrackKind::Video,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Audio(t) => t.id(),
            Self::Video(t) => t.id(),
        }
    }
}

/// A track received from the peer.
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    /// Decoded frames for video tracks; `None` for audio, which the engine
    /// plays out itself.
    pub video: Option<Arc<VideoTrack>>,
}

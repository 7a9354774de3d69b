//! Factories for everything the call client talks to: capture devices, the
//! peer connection and signaling.

use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use sora_core::{CaptureDevice, PeerConnection, PeerEvent, VideoSink};
use sora_media::{CameraCapturer, PeerConfig, WebRtcBinPeer};
use sora_pipe_capture::PipeVideoCapturer;
use sora_signaling::{Signaling, SignalingConfig, SignalingObserver, SoraSignaling};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::cli::{SessionConfig, VideoSource};

pub type PeerHandle = (Arc<dyn PeerConnection>, UnboundedReceiver<PeerEvent>);

pub trait MediaDevices: Send + Sync {
    /// Start capturing from `source` into `sink`. Never called with
    /// [`VideoSource::Disabled`].
    fn open_video(
        &self,
        config: &SessionConfig,
        source: &VideoSource,
        sink: Arc<dyn VideoSink>,
    ) -> Result<Box<dyn CaptureDevice>>;

    fn create_peer(&self, config: PeerConfig) -> Result<PeerHandle>;

    fn create_signaling(
        &self,
        config: SignalingConfig,
        peer: PeerHandle,
        observer: Weak<dyn SignalingObserver>,
    ) -> Arc<dyn Signaling>;
}

/// GStreamer capture and webrtcbin, Sora over WebSocket.
pub struct SystemDevices;

impl MediaDevices for SystemDevices {
    fn open_video(
        &self,
        config: &SessionConfig,
        source: &VideoSource,
        sink: Arc<dyn VideoSink>,
    ) -> Result<Box<dyn CaptureDevice>> {
        match source {
            VideoSource::Fifo { path } => {
                let capturer = PipeVideoCapturer::create(&config.pipe_config(path), sink)
                    .with_context(|| format!("Failed to open video pipe {path}"))?;
                Ok(Box::new(capturer))
            }
            VideoSource::Camera { device } => {
                let capturer = CameraCapturer::start(&config.camera_config(device.as_deref()), sink)
                    .context("Failed to start camera")?;
                Ok(Box::new(capturer))
            }
            VideoSource::Disabled => anyhow::bail!("Video is disabled"),
        }
    }

    fn create_peer(&self, config: PeerConfig) -> Result<PeerHandle> {
        let (peer, events) = WebRtcBinPeer::new(config).context("Failed to create peer connection")?;
        let peer: Arc<dyn PeerConnection> = peer;
        Ok((peer, events))
    }

    fn create_signaling(
        &self,
        config: SignalingConfig,
        (peer, events): PeerHandle,
        observer: Weak<dyn SignalingObserver>,
    ) -> Arc<dyn Signaling> {
        SoraSignaling::new(config, peer, events, observer)
    }
}

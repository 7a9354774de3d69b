//! Camera capture through GStreamer, delivering I420 frames to a [`VideoSink`].

use std::sync::Arc;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use sora_core::{CaptureDevice, VideoSink};
use tracing::{debug, info};

use crate::{convert, MediaError};

const SOURCE: &str = "camera";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    /// V4L2 device node; `None` lets GStreamer pick a default source.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { device: None, width: 640, height: 480, framerate: 30 }
    }
}

impl CameraConfig {
    /// gst-launch description of the capture pipeline. The device path is
    /// not part of it; [`CameraConfig::apply_device`] sets it afterwards.
    pub(crate) fn pipeline_description(&self) -> String {
        let source = match &self.device {
            Some(_) => format!("v4l2src name={SOURCE}"),
            None => format!("autovideosrc name={SOURCE}"),
        };
        let (w, h, fps) = (self.width, self.height, self.framerate);
        format!(
            "{source} \
             ! videoconvert \
             ! videoscale \
             ! videorate \
             ! video/x-raw,format=I420,width={w},height={h},framerate={fps}/1 \
             ! appsink name=sink max-buffers=2 drop=true sync=false emit-signals=false"
        )
    }

    pub(crate) fn apply_device(&self, pipeline: &gst::Pipeline) -> Result<(), MediaError> {
        let Some(device) = &self.device else {
            return Ok(());
        };
        let source = pipeline
            .by_name(SOURCE)
            .ok_or_else(|| MediaError::Pipeline("No camera source".into()))?;
        source.set_property("device", device);
        Ok(())
    }
}

/// A running camera pipeline. Frames flow until [`CaptureDevice::stop`] or drop.
pub struct CameraCapturer {
    pipeline: gst::Pipeline,
    running: bool,
}

impl CameraCapturer {
    pub fn start(config: &CameraConfig, sink: Arc<dyn VideoSink>) -> Result<Self, MediaError> {
        crate::init()?;

        let desc = config.pipeline_description();
        debug!("Camera pipeline: {}", desc);

        let pipeline = gst::parse::launch(&desc)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| MediaError::Pipeline("Expected a Pipeline".into()))?;
        config.apply_device(&pipeline)?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| MediaError::Pipeline("No appsink".into()))?;

        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    match convert::sample_to_frame(&sample) {
                        Ok(frame) => sink.on_frame(&frame),
                        Err(e) => debug!("Dropping camera sample: {}", e),
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline.set_state(gst::State::Playing)?;
        info!(
            "Camera started: {} {}x{} @ {}fps",
            config.device.as_deref().unwrap_or("(default)"),
            config.width,
            config.height,
            config.framerate
        );
        Ok(Self { pipeline, running: true })
    }
}

impl CaptureDevice for CameraCapturer {
    fn stop(&mut self) {
        if std::mem::take(&mut self.running) {
            let _ = self.pipeline.set_state(gst::State::Null);
            debug!("Camera stopped");
        }
    }
}

impl Drop for CameraCapturer {
    fn drop(&mut self) {
        self.stop();
    }
}

//! sora-pipe-capture: raw I420 video source fed through a named pipe.
//!
//! Another process writes back-to-back planar YUV420 frames (no header,
//! `w*h + 2*(w/2*h/2)` bytes each) into a FIFO or this process's stdin; a
//! reader thread slices them into [`sora_core::I420Frame`]s and pushes them
//! into a [`sora_core::VideoSink`].

pub mod capturer;
pub mod pipe;

pub use capturer::{PipeCaptureConfig, PipeVideoCapturer, DEFAULT_READY_TIMEOUT};
pub use pipe::{InputPipe, STDIN_PATH};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to allocate a {bytes}-byte frame buffer")]
    Allocation { bytes: usize },

    #[error("Capturer is not initialized")]
    NotInitialized,

    #[error("Invalid frame size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}


//! Command line flags and the session configuration derived from them.

use clap::{ArgAction, Parser, ValueEnum};
use sora_core::{AudioOptions, Resolution, Role, VideoCodecType};
use sora_media::{CameraConfig, PeerConfig};
use sora_pipe_capture::{PipeCaptureConfig, DEFAULT_READY_TIMEOUT};
use sora_renderer::WindowOptions;
use sora_signaling::SignalingConfig;

const CODEC_NAMES: [&str; 5] = ["", "VP8", "VP9", "AV1", "H264"];

fn parse_codec_name(s: &str) -> Result<String, String> {
    if CODEC_NAMES.contains(&s) {
        Ok(s.to_owned())
    } else {
        Err(format!("'{s}' is not one of \"\", VP8, VP9, AV1, H264"))
    }
}

/// `true` / `false` in any letter case.
fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("'{s}' is not true or false")),
    }
}

fn parse_json(s: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))
}

/// A regular file or, on unix, a character device such as `/dev/video0`.
fn existing_file(s: &str) -> Result<String, String> {
    let metadata = std::fs::metadata(s).map_err(|_| format!("'{s}' does not exist"))?;
    if metadata.is_file() || is_char_device(&metadata.file_type()) {
        Ok(s.to_owned())
    } else {
        Err(format!("'{s}' is not a file"))
    }
}

#[cfg(unix)]
fn is_char_device(file_type: &std::fs::FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    file_type.is_char_device()
}

#[cfg(not(unix))]
fn is_char_device(_file_type: &std::fs::FileType) -> bool {
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Verbose,
    Info,
    Warning,
    Error,
    None,
}

impl LogLevel {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Verbose => "trace",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
            Self::None => "off",
        }
    }
}

// ── Cli ───────────────────────────────────────────────────────────────────────

/// Join a Sora channel, publishing camera or pipe video and showing what
/// the other participants send.
#[derive(Parser, Debug, Clone)]
#[command(name = "sora-sample", version)]
pub struct Cli {
    /// Signaling URL (ws:// or wss://)
    #[arg(long)]
    pub signaling_url: String,

    /// Channel ID
    #[arg(long)]
    pub channel_id: String,

    /// Role: sendonly, recvonly or sendrecv
    #[arg(long)]
    pub role: Role,

    /// Video codec to request; empty lets the server decide
    #[arg(long, default_value = "", value_parser = parse_codec_name)]
    pub video_codec_type: String,

    /// Video resolution: QVGA, VGA, HD, FHD, 4K or [WIDTH]x[HEIGHT]
    #[arg(long, default_value = "VGA")]
    pub resolution: Resolution,

    /// Video frame rate
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=60))]
    pub framerate: u32,

    /// Use multistream (true or false)
    #[arg(long, default_value = "false", value_parser = parse_bool, action = ArgAction::Set)]
    pub multistream: bool,

    /// Metadata sent with the connect message (JSON)
    #[arg(long, value_parser = parse_json)]
    pub metadata: Option<serde_json::Value>,

    /// Do not publish video
    #[arg(long)]
    pub no_video_device: bool,

    /// Do not capture or play audio
    #[arg(long)]
    pub no_audio_device: bool,

    /// Camera device node to capture from
    #[arg(long, value_parser = existing_file)]
    pub video_device: Option<String>,

    /// Read raw I420 frames from this FIFO ("-" for stdin) instead of a camera
    #[arg(long, conflicts_with = "video_device")]
    pub video_fifo: Option<String>,

    #[arg(long)]
    pub disable_echo_cancellation: bool,

    #[arg(long)]
    pub disable_auto_gain_control: bool,

    #[arg(long)]
    pub disable_noise_suppression: bool,

    #[arg(long)]
    pub disable_highpass_filter: bool,

    #[arg(long)]
    pub disable_residual_echo_detector: bool,

    /// Window width
    #[arg(long, default_value_t = 640, value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    /// Window height
    #[arg(long, default_value_t = 480, value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    /// Start the window fullscreen
    #[arg(long)]
    pub fullscreen: bool,

    /// Show the local video as well
    #[arg(long)]
    pub show_me: bool,

    /// Log level; RUST_LOG overrides it
    #[arg(long, value_enum, default_value_t = LogLevel::Error)]
    pub log_level: LogLevel,
}

impl Cli {
    fn audio_options(&self) -> AudioOptions {
        let disabled = |flag: bool| flag.then_some(false);
        AudioOptions {
            echo_cancellation: disabled(self.disable_echo_cancellation),
            auto_gain_control: disabled(self.disable_auto_gain_control),
            noise_suppression: disabled(self.disable_noise_suppression),
            highpass_filter: disabled(self.disable_highpass_filter),
            residual_echo_detector: disabled(self.disable_residual_echo_detector),
        }
    }

    pub fn into_session(self) -> SessionConfig {
        let video = if self.no_video_device {
            VideoSource::Disabled
        } else if let Some(path) = self.video_fifo.clone() {
            VideoSource::Fifo { path }
        } else {
            VideoSource::Camera { device: self.video_device.clone() }
        };
        let audio = (!self.no_audio_device).then(|| self.audio_options());

        SessionConfig {
            signaling_urls: vec![self.signaling_url],
            channel_id: self.channel_id,
            role: self.role,
            video_codec: self.video_codec_type.parse().ok(),
            resolution: self.resolution,
            framerate: self.framerate,
            multistream: self.multistream,
            metadata: self.metadata,
            video,
            audio,
            show_me: self.show_me,
            window: WindowOptions {
                title: "Sora Sample".into(),
                width: self.width,
                height: self.height,
                fullscreen: self.fullscreen,
            },
        }
    }
}

// ── SessionConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    Disabled,
    Camera { device: Option<String> },
    Fifo { path: String },
}

/// Everything a call needs, fixed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub signaling_urls: Vec<String>,
    pub channel_id: String,
    pub role: Role,
    pub video_codec: Option<VideoCodecType>,
    pub resolution: Resolution,
    pub framerate: u32,
    pub multistream: bool,
    pub metadata: Option<serde_json::Value>,
    pub video: VideoSource,
    /// `None` when there is no audio device.
    pub audio: Option<AudioOptions>,
    pub show_me: bool,
    pub window: WindowOptions,
}

impl SessionConfig {
    /// A window is needed to show remote video, or local video with `--show-me`.
    pub fn wants_renderer(&self) -> bool {
        self.role.receives() || self.show_me
    }

    pub fn signaling_config(&self) -> SignalingConfig {
        let mut config = SignalingConfig::new("", self.channel_id.clone(), self.role);
        config.signaling_urls = self.signaling_urls.clone();
        config.multistream = self.multistream;
        config.video_codec_type = self.video_codec;
        config.metadata = self.metadata.clone();
        config
    }

    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            video_codec: self.video_codec.unwrap_or(VideoCodecType::Vp8),
            framerate: self.framerate,
            audio_output: self.audio.is_some(),
        }
    }

    pub fn pipe_config(&self, path: &str) -> PipeCaptureConfig {
        PipeCaptureConfig {
            video_fifo: path.to_owned(),
            width: self.resolution.width,
            height: self.resolution.height,
            framerate: self.framerate,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn camera_config(&self, device: Option<&str>) -> CameraConfig {
        CameraConfig {
            device: device.map(str::to_owned),
            width: self.resolution.width,
            height: self.resolution.height,
            framerate: self.framerate,
        }
    }
}

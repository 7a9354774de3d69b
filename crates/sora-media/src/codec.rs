//! Encoder and RTP payloader selection for the video send branch.
//!
//! # Encoder priority (highest to lowest)
//!
//! | Codec | Candidates | Notes |
//! |-------|------------|-------|
//! | VP8   | `vp8enc` | default, realtime deadline |
//! | VP9   | `vp9enc` | |
//! | AV1   | `svtav1enc`, `rav1enc`, `av1enc` | first installed wins |
//! | H264  | `vaapih264enc`, `nvh264enc`, `x264enc` | VA-API / NVENC hardware, then CPU |

use sora_core::VideoCodecType;
use tracing::{info, warn};

use crate::element_available;

/// Everything between `videoconvert` and `webrtcbin` for one codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendChain {
    /// Encoder element with its properties, in `gst-launch` syntax.
    pub encoder: String,
    pub payloader: &'static str,
    pub encoding_name: &'static str,
    pub payload_type: u8,
}

impl SendChain {
    /// The `gst-launch` fragment from the encoder to the RTP caps filter.
    pub fn description(&self) -> String {
        format!(
            "{} ! {} ! application/x-rtp,media=video,encoding-name={},payload={}",
            self.encoder, self.payloader, self.encoding_name, self.payload_type
        )
    }
}

const H264_ENCODERS: &[(&str, &str)] = &[
    ("vaapih264enc", "rate-control=cbr"),
    ("nvh264enc", "preset=low-latency-hq rc-mode=cbr"),
    ("x264enc", "tune=zerolatency speed-preset=veryfast key-int-max=60"),
];

const AV1_ENCODERS: &[(&str, &str)] = &[
    ("svtav1enc", "preset=12"),
    ("rav1enc", "speed-preset=10 low-latency=true"),
    ("av1enc", "usage-profile=realtime cpu-used=8"),
];

/// Pick the send chain for `codec` from the encoders installed on this host.
pub fn send_chain(codec: VideoCodecType) -> SendChain {
    send_chain_with(codec, element_available)
}

pub(crate) fn send_chain_with(codec: VideoCodecType, available: impl Fn(&str) -> bool) -> SendChain {
    match codec {
        VideoCodecType::Vp8 => SendChain {
            encoder: "vp8enc deadline=1 cpu-used=8 keyframe-max-dist=60 error-resilient=partitions"
                .into(),
            payloader: "rtpvp8pay",
            encoding_name: "VP8",
            payload_type: 96,
        },
        VideoCodecType::Vp9 => SendChain {
            encoder: "vp9enc deadline=1 cpu-used=8 keyframe-max-dist=60".into(),
            payloader: "rtpvp9pay",
            encoding_name: "VP9",
            payload_type: 98,
        },
        VideoCodecType::Av1 => SendChain {
            encoder: select_encoder("AV1", AV1_ENCODERS, &available),
            payloader: "rtpav1pay",
            encoding_name: "AV1",
            payload_type: 45,
        },
        VideoCodecType::H264 => SendChain {
            encoder: format!(
                "{} ! video/x-h264,profile=constrained-baseline",
                select_encoder("H.264", H264_ENCODERS, &available)
            ),
            payloader: "rtph264pay config-interval=-1 aggregate-mode=zero-latency",
            encoding_name: "H264",
            payload_type: 102,
        },
    }
}

fn select_encoder(label: &str, candidates: &[(&str, &str)], available: &impl Fn(&str) -> bool) -> String {
    for (name, props) in candidates {
        if available(name) {
            info!("{} encoder selected: {}", label, name);
            return format!("{name} {props}");
        }
    }
    // The last candidate is the software one; let pipeline parsing report it
    // if it is missing too.
    let (name, props) = candidates[candidates.len() - 1];
    warn!("No {} encoder found; falling back to {}", label, name);
    format!("{name} {props}")
}

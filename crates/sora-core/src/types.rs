use std::str::FromStr;

use serde::{Deserialize, Serialize};

// MARK: - Resolution

/// Capture / send resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const QVGA: Self = Self { width: 320, height: 240 };
    pub const VGA: Self = Self { width: 640, height: 480 };
    pub const HD: Self = Self { width: 1280, height: 720 };
    pub const FHD: Self = Self { width: 1920, height: 1080 };
    pub const UHD_4K: Self = Self { width: 3840, height: 2160 };

    /// Smallest width or height accepted for a `<W>x<H>` resolution.
    pub const MIN_DIMENSION: u32 = 16;

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Named presets: `QVGA`, `VGA`, `HD`, `FHD`, `4K`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "QVGA" => Some(Self::QVGA),
            "VGA" => Some(Self::VGA),
            "HD" => Some(Self::HD),
            "FHD" => Some(Self::FHD),
            "4K" => Some(Self::UHD_4K),
            _ => None,
        }
    }

    /// Resolve a preset or `<W>x<H>` string without rejecting anything.
    ///
    /// Each dimension is read like C `atoi` (leading digits, `0` when there
    /// are none) and clamped to [`Resolution::MIN_DIMENSION`]. A string with
    /// no `x` resolves to 16×16.
    pub fn parse_lenient(input: &str) -> Self {
        if let Some(preset) = Self::from_name(input) {
            return preset;
        }
        let Some((w, h)) = input.split_once('x') else {
            return Self::new(Self::MIN_DIMENSION, Self::MIN_DIMENSION);
        };
        Self::new(clamp_dimension(leading_int(w)), clamp_dimension(leading_int(h)))
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Strict form used for command-line validation: a preset name or
/// `^[1-9][0-9]*x[1-9][0-9]*$`. Accepted values are then clamped like
/// [`Resolution::parse_lenient`].
impl FromStr for Resolution {
    type Err = ResolutionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if let Some(preset) = Self::from_name(input) {
            return Ok(preset);
        }
        let (w, h) = input
            .split_once('x')
            .ok_or_else(|| ResolutionParseError(input.to_owned()))?;
        if !is_positive_decimal(w) || !is_positive_decimal(h) {
            return Err(ResolutionParseError(input.to_owned()));
        }
        let width: u32 = w.parse().map_err(|_| ResolutionParseError(input.to_owned()))?;
        let height: u32 = h.parse().map_err(|_| ResolutionParseError(input.to_owned()))?;
        Ok(Self::new(
            width.max(Self::MIN_DIMENSION),
            height.max(Self::MIN_DIMENSION),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resolution '{0}': must be one of QVGA, VGA, HD, FHD, 4K, or [WIDTH]x[HEIGHT]")]
pub struct ResolutionParseError(pub String);

fn is_positive_decimal(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some('1'..='9')) && chars.all(|c| c.is_ascii_digit())
}

/// `atoi`-style prefix parse, saturating instead of overflowing.
fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    if negative { -value } else { value }
}

fn clamp_dimension(value: i64) -> u32 {
    value.clamp(i64::from(Resolution::MIN_DIMENSION), i64::from(u32::MAX)) as u32
}

// MARK: - Role

/// Direction of media for a Sora connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    SendOnly,
    RecvOnly,
    SendRecv,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendOnly => "sendonly",
            Self::RecvOnly => "recvonly",
            Self::SendRecv => "sendrecv",
        }
    }

    /// Whether local tracks are published.
    pub fn sends(&self) -> bool {
        !matches!(self, Self::RecvOnly)
    }

    /// Whether remote tracks are expected.
    pub fn receives(&self) -> bool {
        !matches!(self, Self::SendOnly)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sendonly" => Ok(Self::SendOnly),
            "recvonly" => Ok(Self::RecvOnly),
            "sendrecv" => Ok(Self::SendRecv),
            other => Err(format!("'{other}' is not one of sendonly, recvonly, sendrecv")),
        }
    }
}

// MARK: - VideoCodecType

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodecType {
    #[serde(rename = "VP8")]
    Vp8,
    #[serde(rename = "VP9")]
    Vp9,
    #[serde(rename = "AV1")]
    Av1,
    #[serde(rename = "H264")]
    H264,
}

impl VideoCodecType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
            Self::Av1 => "AV1",
            Self::H264 => "H264",
        }
    }
}

impl std::fmt::Display for VideoCodecType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCodecType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VP8" => Ok(Self::Vp8),
            "VP9" => Ok(Self::Vp9),
            "AV1" => Ok(Self::Av1),
            "H264" => Ok(Self::H264),
            other => Err(format!("'{other}' is not one of VP8, VP9, AV1, H264")),
        }
    }
}

// MARK: - TrackKind

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

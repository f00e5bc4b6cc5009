//! Video encoding configuration and output frame targets.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Pixel format accepted by every mainstream player
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Output frame rate
pub const DEFAULT_FPS: u32 = 25;

/// Portrait output resolution
pub const PORTRAIT_WIDTH: u32 = 720;
pub const PORTRAIT_HEIGHT: u32 = 1280;

/// Landscape output resolution
pub const LANDSCAPE_WIDTH: u32 = 1920;
pub const LANDSCAPE_HEIGHT: u32 = 1080;

/// Output frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const PORTRAIT: FrameSize = FrameSize {
        width: PORTRAIT_WIDTH,
        height: PORTRAIT_HEIGHT,
    };

    pub const LANDSCAPE: FrameSize = FrameSize {
        width: LANDSCAPE_WIDTH,
        height: LANDSCAPE_HEIGHT,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Orientation of the rendered deliverables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// 9:16 short-form output
    #[default]
    Portrait,
    /// 16:9 output
    Landscape,
}

impl PipelineMode {
    pub fn frame_size(&self) -> FrameSize {
        match self {
            PipelineMode::Portrait => FrameSize::PORTRAIT,
            PipelineMode::Landscape => FrameSize::LANDSCAPE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineMode::Portrait => "portrait",
            PipelineMode::Landscape => "landscape",
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "portrait" | "vertical" => Ok(PipelineMode::Portrait),
            "landscape" | "horizontal" => Ok(PipelineMode::Landscape),
            other => Err(format!("unknown pipeline mode: {}", other)),
        }
    }
}

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Output pixel format
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Output frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}
fn default_fps() -> u32 {
    DEFAULT_FPS
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            preset: default_preset(),
            crf: DEFAULT_CRF,
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            pixel_format: default_pixel_format(),
            fps: DEFAULT_FPS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_frame_sizes() {
        assert_eq!(PipelineMode::Portrait.frame_size(), FrameSize::new(720, 1280));
        assert_eq!(PipelineMode::Landscape.frame_size(), FrameSize::new(1920, 1080));
        assert!(FrameSize::PORTRAIT.is_portrait());
        assert!(!FrameSize::LANDSCAPE.is_portrait());
        assert_eq!(FrameSize::LANDSCAPE.to_string(), "1920x1080");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Landscape".parse::<PipelineMode>().unwrap(), PipelineMode::Landscape);
        assert_eq!("vertical".parse::<PipelineMode>().unwrap(), PipelineMode::Portrait);
        assert!("square".parse::<PipelineMode>().is_err());
    }

    #[test]
    fn test_encoding_defaults_from_empty_json() {
        let config: EncodingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EncodingConfig::default());
        assert_eq!(config.pixel_format, "yuv420p");
    }
}

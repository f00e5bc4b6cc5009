//! Worker configuration.

use std::path::PathBuf;

use reel_media::{Corner, MergeLayout, SlideshowOptions};
use reel_models::{EncodingConfig, PipelineMode};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Parent directory of per-run scratch directories
    pub work_dir: PathBuf,
    /// Directory holding project and profile JSON documents
    pub projects_dir: PathBuf,
    /// Forces an orientation instead of the project's own mode
    pub mode_override: Option<PipelineMode>,
    pub slideshow: SlideshowOptions,
    pub merge_layout: MergeLayout,
    pub encoding: EncodingConfig,
    /// Kill an ffmpeg invocation after this many seconds
    pub ffmpeg_timeout_secs: u64,
    /// Retries for each asset download and upload
    pub transfer_max_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("reelforge"),
            projects_dir: PathBuf::from("./data"),
            mode_override: None,
            slideshow: SlideshowOptions::default(),
            merge_layout: MergeLayout::Stacked,
            encoding: EncodingConfig::default(),
            ffmpeg_timeout_secs: 900,
            transfer_max_retries: 3,
        }
    }
}

fn parse_layout(layout: &str, corner: Option<&str>) -> MergeLayout {
    match layout.to_ascii_lowercase().as_str() {
        "pip" | "picture_in_picture" | "overlay" => MergeLayout::PictureInPicture {
            corner: corner.and_then(|c| c.parse::<Corner>().ok()).unwrap_or_default(),
        },
        _ => MergeLayout::Stacked,
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let slideshow_defaults = SlideshowOptions::default();
        let fade = std::env::var("SLIDESHOW_FADE_SECS")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|f| f.is_finite() && *f >= 0.0);

        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            projects_dir: std::env::var("PROJECTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.projects_dir),
            mode_override: std::env::var("PIPELINE_MODE").ok().and_then(|s| s.parse().ok()),
            slideshow: SlideshowOptions {
                fade_in_secs: fade.unwrap_or(slideshow_defaults.fade_in_secs),
                fade_out_secs: fade.unwrap_or(slideshow_defaults.fade_out_secs),
                ken_burns: std::env::var("SLIDESHOW_KEN_BURNS")
                    .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "off"))
                    .unwrap_or(slideshow_defaults.ken_burns),
                max_zoom: std::env::var("SLIDESHOW_MAX_ZOOM")
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .filter(|z| *z >= 1.0)
                    .unwrap_or(slideshow_defaults.max_zoom),
                ..slideshow_defaults
            },
            merge_layout: std::env::var("MERGE_LAYOUT")
                .map(|l| parse_layout(&l, std::env::var("MERGE_PIP_CORNER").ok().as_deref()))
                .unwrap_or(defaults.merge_layout),
            encoding: defaults.encoding,
            ffmpeg_timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ffmpeg_timeout_secs),
            transfer_max_retries: std::env::var("DOWNLOAD_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.transfer_max_retries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout() {
        assert_eq!(parse_layout("stacked", None), MergeLayout::Stacked);
        assert_eq!(
            parse_layout("PIP", Some("top-left")),
            MergeLayout::PictureInPicture {
                corner: Corner::TopLeft
            }
        );
        assert_eq!(
            parse_layout("overlay", Some("nowhere")),
            MergeLayout::PictureInPicture {
                corner: Corner::BottomRight
            }
        );
        assert_eq!(parse_layout("mosaic", None), MergeLayout::Stacked);
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.ffmpeg_timeout_secs, 900);
        assert!(config.mode_override.is_none());
        assert!(config.slideshow.ken_burns);
    }
}

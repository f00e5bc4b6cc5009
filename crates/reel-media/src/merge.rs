//! Split-screen merge of the slideshow and the lip-sync clip.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use reel_models::{EncodingConfig, FrameSize};

use crate::command::{run_ffmpeg, FfmpegCommand, InputSpec, ProcessRunner};
use crate::error::MediaResult;
use crate::graph::{scale_pad, Filter, FilterChain, FilterGraph, StreamLabel};
use crate::probe::probe;
use crate::tiers::RenderTier;

/// Margin between a picture-in-picture overlay and the frame edge.
pub const OVERLAY_MARGIN: u32 = 10;

/// Anchor corner for a picture-in-picture overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

impl Corner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Corner::TopLeft => "top_left",
            Corner::TopRight => "top_right",
            Corner::BottomLeft => "bottom_left",
            Corner::BottomRight => "bottom_right",
        }
    }

    /// Top-left pixel of an `overlay` placed in this corner of `out`.
    pub fn overlay_position(&self, out: FrameSize, overlay: FrameSize, margin: u32) -> (u32, u32) {
        let right = out.width.saturating_sub(overlay.width + margin);
        let bottom = out.height.saturating_sub(overlay.height + margin);
        match self {
            Corner::TopLeft => (margin, margin),
            Corner::TopRight => (right, margin),
            Corner::BottomLeft => (margin, bottom),
            Corner::BottomRight => (right, bottom),
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Corner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "top_left" => Ok(Corner::TopLeft),
            "top_right" => Ok(Corner::TopRight),
            "bottom_left" => Ok(Corner::BottomLeft),
            "bottom_right" => Ok(Corner::BottomRight),
            other => Err(format!("unknown corner: {}", other)),
        }
    }
}

/// How the two clips share the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeLayout {
    /// Slideshow above (portrait) or left of (landscape) the talking head
    #[default]
    Stacked,
    /// Talking head inset over the full-frame slideshow
    PictureInPicture { corner: Corner },
}

/// Inputs for one merge render.
#[derive(Debug, Clone)]
pub struct MergeJob {
    pub slideshow: PathBuf,
    pub lipsync: PathBuf,
    pub output: PathBuf,
    pub frame: FrameSize,
    pub layout: MergeLayout,
    pub encoding: EncodingConfig,
    /// Lip-sync clip dimensions, probed on demand when unset
    pub lipsync_size: Option<FrameSize>,
}

fn even(value: u32) -> u32 {
    (value / 2 * 2).max(2)
}

/// Size of each half of a stacked layout.
fn stacked_half(frame: FrameSize) -> FrameSize {
    if frame.is_portrait() {
        FrameSize::new(frame.width, even(frame.height / 2))
    } else {
        FrameSize::new(even(frame.width / 2), frame.height)
    }
}

fn stack_filter(frame: FrameSize) -> Filter {
    if frame.is_portrait() {
        Filter::VStack { inputs: 2 }
    } else {
        Filter::HStack { inputs: 2 }
    }
}

/// Overlay size: a third of the frame width, keeping the clip's aspect.
fn pip_size(frame: FrameSize, clip: FrameSize) -> FrameSize {
    let width = even(frame.width / 3);
    let height = if clip.width == 0 {
        width
    } else {
        even((width as f64 * clip.height as f64 / clip.width as f64).round() as u32)
    };
    FrameSize::new(width, height)
}

/// Stacked graph: both clips scaled and padded to half frames.
pub fn build_stacked_graph(frame: FrameSize, pixel_format: &str) -> FilterGraph {
    let half = stacked_half(frame);
    let mut graph = FilterGraph::new();
    graph
        .push(FilterChain::new(vec![StreamLabel::video(0)], scale_pad(half), StreamLabel::named("top")))
        .push(FilterChain::new(vec![StreamLabel::video(1)], scale_pad(half), StreamLabel::named("bottom")))
        .push(FilterChain::new(
            vec![StreamLabel::named("top"), StreamLabel::named("bottom")],
            vec![stack_filter(frame), Filter::Format(pixel_format.to_string())],
            StreamLabel::named("outv"),
        ));
    graph
}

/// Picture-in-picture graph over a full-frame slideshow.
pub fn build_pip_graph(frame: FrameSize, clip: FrameSize, corner: Corner, pixel_format: &str) -> FilterGraph {
    let inset = pip_size(frame, clip);
    let (x, y) = corner.overlay_position(frame, inset, OVERLAY_MARGIN);
    let mut graph = FilterGraph::new();
    graph
        .push(FilterChain::new(vec![StreamLabel::video(0)], scale_pad(frame), StreamLabel::named("base")))
        .push(FilterChain::new(
            vec![StreamLabel::video(1)],
            vec![
                Filter::Scale {
                    width: inset.width as i32,
                    height: inset.height as i32,
                },
                Filter::SetSar,
            ],
            StreamLabel::named("pip"),
        ))
        .push(FilterChain::new(
            vec![StreamLabel::named("base"), StreamLabel::named("pip")],
            vec![Filter::Overlay { x, y }, Filter::Format(pixel_format.to_string())],
            StreamLabel::named("outv"),
        ));
    graph
}

fn merge_command(job: &MergeJob, graph: &FilterGraph) -> MediaResult<FfmpegCommand> {
    let out = graph.validate(2)?;
    Ok(FfmpegCommand::new(&job.output)
        .input(InputSpec::new(&job.slideshow))
        .input(InputSpec::new(&job.lipsync))
        .filter_complex(graph.render())
        .map(out.map_arg())
        .map(StreamLabel::audio(0).map_arg())
        .encoding(&job.encoding)
        .shortest()
        .faststart())
}

/// Layout-aware merge with scaling and padding.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryMerge;

impl PrimaryMerge {
    pub async fn build_command(&self, runner: &dyn ProcessRunner, job: &MergeJob) -> MediaResult<FfmpegCommand> {
        let graph = match job.layout {
            MergeLayout::Stacked => build_stacked_graph(job.frame, &job.encoding.pixel_format),
            MergeLayout::PictureInPicture { corner } => {
                let clip = match job.lipsync_size {
                    Some(size) => size,
                    None => {
                        let info = probe(runner, &job.lipsync).await?;
                        FrameSize::new(info.width, info.height)
                    }
                };
                build_pip_graph(job.frame, clip, corner, &job.encoding.pixel_format)
            }
        };
        merge_command(job, &graph)
    }
}

#[async_trait]
impl RenderTier<MergeJob> for PrimaryMerge {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn scratch_files(&self, job: &MergeJob) -> Vec<PathBuf> {
        vec![job.output.clone()]
    }

    async fn render(&self, runner: &dyn ProcessRunner, job: &MergeJob) -> MediaResult<PathBuf> {
        let cmd = self.build_command(runner, job).await?;
        run_ffmpeg(runner, &cmd).await?;
        Ok(job.output.clone())
    }
}

/// Last resort: stack the two streams as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawStackMerge;

impl RawStackMerge {
    pub fn build_command(&self, job: &MergeJob) -> MediaResult<FfmpegCommand> {
        let mut graph = FilterGraph::new();
        graph.push(FilterChain::new(
            vec![StreamLabel::video(0), StreamLabel::video(1)],
            vec![stack_filter(job.frame)],
            StreamLabel::named("outv"),
        ));
        merge_command(job, &graph)
    }
}

#[async_trait]
impl RenderTier<MergeJob> for RawStackMerge {
    fn name(&self) -> &'static str {
        "raw_stack"
    }

    fn scratch_files(&self, job: &MergeJob) -> Vec<PathBuf> {
        vec![job.output.clone()]
    }

    async fn render(&self, runner: &dyn ProcessRunner, job: &MergeJob) -> MediaResult<PathBuf> {
        let cmd = self.build_command(job)?;
        run_ffmpeg(runner, &cmd).await?;
        Ok(job.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{FilterArg, ProcessOutput};

    struct NoProbe;

    #[async_trait]
    impl ProcessRunner for NoProbe {
        async fn run(&self, program: &str, _args: &[String]) -> MediaResult<ProcessOutput> {
            panic!("unexpected {} call", program);
        }
    }

    fn job(layout: MergeLayout, frame: FrameSize) -> MergeJob {
        MergeJob {
            slideshow: PathBuf::from("/tmp/slideshow.mp4"),
            lipsync: PathBuf::from("/tmp/lipsync.mp4"),
            output: PathBuf::from("/tmp/final.mp4"),
            frame,
            layout,
            encoding: EncodingConfig::default(),
            lipsync_size: Some(FrameSize::new(1080, 1920)),
        }
    }

    fn graph_of(cmd: &FfmpegCommand) -> String {
        match cmd.filter() {
            Some(FilterArg::Complex(graph)) => graph.clone(),
            other => panic!("unexpected filter {:?}", other),
        }
    }

    #[test]
    fn test_overlay_positions() {
        let out = FrameSize::new(1920, 1080);
        let overlay = FrameSize::new(640, 360);
        assert_eq!(Corner::TopLeft.overlay_position(out, overlay, 10), (10, 10));
        assert_eq!(Corner::TopRight.overlay_position(out, overlay, 10), (1270, 10));
        assert_eq!(Corner::BottomLeft.overlay_position(out, overlay, 10), (10, 710));
        assert_eq!(Corner::BottomRight.overlay_position(out, overlay, 10), (1270, 710));
    }

    #[test]
    fn test_corner_parse() {
        assert_eq!("top-left".parse::<Corner>().unwrap(), Corner::TopLeft);
        assert_eq!("BOTTOM_RIGHT".parse::<Corner>().unwrap(), Corner::BottomRight);
        assert!("middle".parse::<Corner>().is_err());
    }

    #[test]
    fn test_stacked_portrait_uses_half_height() {
        let graph = build_stacked_graph(FrameSize::PORTRAIT, "yuv420p").render();
        assert!(graph.contains("scale=720:640:force_original_aspect_ratio=decrease"));
        assert!(graph.contains("vstack=inputs=2"));
    }

    #[test]
    fn test_stacked_landscape_uses_half_width() {
        let graph = build_stacked_graph(FrameSize::LANDSCAPE, "yuv420p").render();
        assert!(graph.contains("pad=960:1080"));
        assert!(graph.contains("hstack=inputs=2"));
    }

    #[test]
    fn test_pip_size_keeps_clip_aspect() {
        let inset = pip_size(FrameSize::LANDSCAPE, FrameSize::new(1080, 1920));
        assert_eq!(inset, FrameSize::new(640, 1138));
    }

    #[tokio::test]
    async fn test_primary_pip_uses_known_size() {
        let job = job(
            MergeLayout::PictureInPicture {
                corner: Corner::TopLeft,
            },
            FrameSize::PORTRAIT,
        );
        let cmd = PrimaryMerge.build_command(&NoProbe, &job).await.unwrap();
        let graph = graph_of(&cmd);
        assert!(graph.contains("overlay=10:10"));
        assert!(graph.contains("scale=240:426"));
        assert_eq!(cmd.maps(), &["[outv]".to_string(), "0:a".to_string()]);
    }

    #[test]
    fn test_raw_stack_has_no_scaling() {
        let cmd = RawStackMerge.build_command(&job(MergeLayout::Stacked, FrameSize::PORTRAIT)).unwrap();
        assert_eq!(graph_of(&cmd), "[0:v][1:v]vstack=inputs=2[outv]");
        assert!(cmd.build_args().contains(&"-shortest".to_string()));
    }
}

//! Narrated slideshow rendering.
//!
//! Two tiers render the same [`SlideshowJob`]:
//! - [`EnhancedSlideshow`]: per-image Ken Burns zoom/pan with fades, concatenated in a filter graph
//! - [`BasicSlideshow`]: concat-demuxer list with per-image durations, one scale/pad pass

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use reel_models::{EncodingConfig, FrameSize};

use crate::command::{run_ffmpeg, FfmpegCommand, InputSpec, ProcessRunner};
use crate::error::{MediaError, MediaResult};
use crate::graph::{scale_pad, FadeKind, Filter, FilterChain, FilterGraph, StreamLabel};
use crate::tiers::RenderTier;

/// Display time of the repeated final entry in a concat list.
const CONCAT_TAIL_SECS: f64 = 0.04;

const ENHANCED_GRAPH_FILE: &str = "slideshow_graph.txt";
const CONCAT_LIST_FILE: &str = "slideshow_concat.txt";

/// Pan target of the zoom, chosen by `image_index % 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KenBurnsDirection {
    CenterIn,
    TopLeftIn,
    TopRightIn,
    BottomIn,
}

impl KenBurnsDirection {
    pub const ALL: [KenBurnsDirection; 4] = [
        KenBurnsDirection::CenterIn,
        KenBurnsDirection::TopLeftIn,
        KenBurnsDirection::TopRightIn,
        KenBurnsDirection::BottomIn,
    ];

    pub fn for_index(image_index: usize) -> Self {
        Self::ALL[image_index % Self::ALL.len()]
    }

    pub fn index(&self) -> usize {
        match self {
            KenBurnsDirection::CenterIn => 0,
            KenBurnsDirection::TopLeftIn => 1,
            KenBurnsDirection::TopRightIn => 2,
            KenBurnsDirection::BottomIn => 3,
        }
    }

    /// zoompan `x` expression.
    pub fn x_expr(&self) -> &'static str {
        match self {
            KenBurnsDirection::CenterIn | KenBurnsDirection::BottomIn => "iw/2-(iw/zoom/2)",
            KenBurnsDirection::TopLeftIn => "0",
            KenBurnsDirection::TopRightIn => "iw-iw/zoom",
        }
    }

    /// zoompan `y` expression.
    pub fn y_expr(&self) -> &'static str {
        match self {
            KenBurnsDirection::CenterIn => "ih/2-(ih/zoom/2)",
            KenBurnsDirection::TopLeftIn | KenBurnsDirection::TopRightIn => "0",
            KenBurnsDirection::BottomIn => "ih-ih/zoom",
        }
    }

    /// Recover the direction from rendered zoompan expressions.
    pub fn from_exprs(x: &str, y: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.x_expr() == x && d.y_expr() == y)
    }
}

/// Look of the enhanced tier.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideshowOptions {
    pub fade_in_secs: f64,
    pub fade_out_secs: f64,
    pub ken_burns: bool,
    /// Zoom added per output frame
    pub zoom_increment: f64,
    pub max_zoom: f64,
    /// Graphs longer than this are passed via `-filter_complex_script`
    pub inline_graph_limit: usize,
}

impl Default for SlideshowOptions {
    fn default() -> Self {
        Self {
            fade_in_secs: 0.5,
            fade_out_secs: 0.5,
            ken_burns: true,
            zoom_increment: 0.0015,
            max_zoom: 1.5,
            inline_graph_limit: 8 * 1024,
        }
    }
}

/// Inputs for one slideshow render.
#[derive(Debug, Clone)]
pub struct SlideshowJob {
    /// Local image files in display order
    pub images: Vec<PathBuf>,
    /// Display duration of each image in seconds
    pub durations: Vec<f64>,
    /// Local narration track
    pub audio: PathBuf,
    pub output: PathBuf,
    /// Where graph scripts and concat lists are written
    pub work_dir: PathBuf,
    pub frame: FrameSize,
    pub encoding: EncodingConfig,
}

impl SlideshowJob {
    pub fn validate(&self) -> MediaResult<()> {
        if self.images.is_empty() {
            return Err(MediaError::invalid_input("slideshow has no images"));
        }
        if self.images.len() != self.durations.len() {
            return Err(MediaError::invalid_input(format!(
                "{} images but {} durations",
                self.images.len(),
                self.durations.len()
            )));
        }
        if let Some(d) = self.durations.iter().find(|d| !d.is_finite() || **d <= 0.0) {
            return Err(MediaError::invalid_input(format!("invalid image duration {}", d)));
        }
        Ok(())
    }
}

/// Fade timings for one segment: (fade-in duration, fade-out start, fade-out duration).
fn fade_window(duration: f64, options: &SlideshowOptions) -> (f64, f64, f64) {
    let fade_in = options.fade_in_secs.max(0.0).min(duration / 2.0);
    let fade_out_start = (duration - options.fade_out_secs.max(0.0)).max(fade_in);
    let fade_out = (duration - fade_out_start).max(0.0);
    (fade_in, fade_out_start, fade_out)
}

/// Build the enhanced-tier graph: one `[v{i}]` segment per image and a
/// final `[outv]` concatenation.
pub fn build_enhanced_graph(job: &SlideshowJob, options: &SlideshowOptions) -> MediaResult<FilterGraph> {
    job.validate()?;

    let fps = job.encoding.fps;
    let mut graph = FilterGraph::new();
    let mut segments = Vec::with_capacity(job.images.len());

    for (i, duration) in job.durations.iter().copied().enumerate() {
        let mut filters = scale_pad(job.frame);

        if options.ken_burns {
            let direction = KenBurnsDirection::for_index(i);
            filters.push(Filter::ZoomPan {
                zoom_increment: options.zoom_increment,
                max_zoom: options.max_zoom,
                x: direction.x_expr().to_string(),
                y: direction.y_expr().to_string(),
                frames: (duration * fps as f64).ceil().max(1.0) as u32,
                size: job.frame,
                fps,
            });
        }

        filters.push(Filter::Trim { duration_secs: duration });
        filters.push(Filter::SetPts);

        let (fade_in, fade_out_start, fade_out) = fade_window(duration, options);
        if fade_in > 0.0 {
            filters.push(Filter::Fade {
                kind: FadeKind::In,
                start_secs: 0.0,
                duration_secs: fade_in,
            });
        }
        if fade_out > 0.0 {
            filters.push(Filter::Fade {
                kind: FadeKind::Out,
                start_secs: fade_out_start,
                duration_secs: fade_out,
            });
        }
        filters.push(Filter::Format(job.encoding.pixel_format.clone()));

        let label = StreamLabel::named(format!("v{}", i));
        graph.push(FilterChain::new(vec![StreamLabel::video(i)], filters, label.clone()));
        segments.push(label);
    }

    let count = segments.len();
    graph.push(FilterChain::new(
        segments,
        vec![Filter::Concat { segments: count }],
        StreamLabel::named("outv"),
    ));

    graph.validate(count + 1)?;
    Ok(graph)
}

/// Zoom/pan and fade tier.
#[derive(Debug, Clone, Default)]
pub struct EnhancedSlideshow {
    pub options: SlideshowOptions,
}

impl EnhancedSlideshow {
    pub fn new(options: SlideshowOptions) -> Self {
        Self { options }
    }

    fn script_path(job: &SlideshowJob) -> PathBuf {
        job.work_dir.join(ENHANCED_GRAPH_FILE)
    }

    /// Build the ffmpeg command, writing the graph to a script file when it
    /// exceeds the inline limit.
    pub async fn build_command(&self, job: &SlideshowJob) -> MediaResult<FfmpegCommand> {
        let graph = build_enhanced_graph(job, &self.options)?;
        let fps = job.encoding.fps;

        let mut cmd = FfmpegCommand::new(&job.output);
        for (image, duration) in job.images.iter().zip(&job.durations) {
            let input = if self.options.ken_burns {
                // zoompan expands the single frame to the segment length
                InputSpec::new(image)
            } else {
                InputSpec::looped_still(image, *duration, fps)
            };
            cmd = cmd.input(input);
        }
        cmd = cmd.input(InputSpec::new(&job.audio));

        let rendered = graph.render();
        cmd = if rendered.len() > self.options.inline_graph_limit {
            let script = Self::script_path(job);
            tokio::fs::write(&script, rendered.as_bytes()).await?;
            debug!("Wrote {} byte filter graph to {}", rendered.len(), script.display());
            cmd.filter_script(script)
        } else {
            cmd.filter_complex(rendered)
        };

        Ok(cmd
            .map("[outv]")
            .map(StreamLabel::audio(job.images.len()).map_arg())
            .encoding(&job.encoding)
            .frame_rate(fps)
            .shortest()
            .faststart())
    }
}

#[async_trait]
impl RenderTier<SlideshowJob> for EnhancedSlideshow {
    fn name(&self) -> &'static str {
        "enhanced"
    }

    fn scratch_files(&self, job: &SlideshowJob) -> Vec<PathBuf> {
        vec![Self::script_path(job), job.output.clone()]
    }

    async fn render(&self, runner: &dyn ProcessRunner, job: &SlideshowJob) -> MediaResult<PathBuf> {
        let cmd = self.build_command(job).await?;
        run_ffmpeg(runner, &cmd).await?;
        Ok(job.output.clone())
    }
}

/// Quote a path for the concat demuxer.
fn concat_quote(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

/// Concat-demuxer list: each image with its duration, then the last image
/// again with a near-zero duration so the final `duration` is honored.
pub fn concat_list(images: &[PathBuf], durations: &[f64]) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for (image, duration) in images.iter().zip(durations) {
        let _ = writeln!(list, "file '{}'", concat_quote(image));
        let _ = writeln!(list, "duration {:.3}", duration);
    }
    if let Some(last) = images.last() {
        let _ = writeln!(list, "file '{}'", concat_quote(last));
        let _ = writeln!(list, "duration {:.3}", CONCAT_TAIL_SECS);
    }
    list
}

/// Plain concat tier without motion or fades.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSlideshow;

impl BasicSlideshow {
    fn list_path(job: &SlideshowJob) -> PathBuf {
        job.work_dir.join(CONCAT_LIST_FILE)
    }

    pub async fn build_command(&self, job: &SlideshowJob) -> MediaResult<FfmpegCommand> {
        job.validate()?;

        let list_path = Self::list_path(job);
        tokio::fs::write(&list_path, concat_list(&job.images, &job.durations)).await?;

        let mut filters = scale_pad(job.frame);
        filters.push(Filter::Format(job.encoding.pixel_format.clone()));
        let chain: Vec<String> = filters.iter().map(|f| f.to_string()).collect();

        Ok(FfmpegCommand::new(&job.output)
            .input(InputSpec::concat_list(&list_path))
            .input(InputSpec::new(&job.audio))
            .video_filter(chain.join(","))
            .map("0:v")
            .map("1:a")
            .encoding(&job.encoding)
            .frame_rate(job.encoding.fps)
            .shortest()
            .faststart())
    }
}

#[async_trait]
impl RenderTier<SlideshowJob> for BasicSlideshow {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn scratch_files(&self, job: &SlideshowJob) -> Vec<PathBuf> {
        vec![Self::list_path(job), job.output.clone()]
    }

    async fn render(&self, runner: &dyn ProcessRunner, job: &SlideshowJob) -> MediaResult<PathBuf> {
        let cmd = self.build_command(job).await?;
        run_ffmpeg(runner, &cmd).await?;
        Ok(job.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FilterArg;

    fn job(dir: &Path, count: usize, frame: FrameSize) -> SlideshowJob {
        SlideshowJob {
            images: (0..count).map(|i| dir.join(format!("img_{}.png", i))).collect(),
            durations: (0..count).map(|i| 1.0 + i as f64 * 0.5).collect(),
            audio: dir.join("voice.mp3"),
            output: dir.join("slideshow.mp4"),
            work_dir: dir.to_path_buf(),
            frame,
            encoding: EncodingConfig::default(),
        }
    }

    fn zoompan_directions(graph: &FilterGraph) -> Vec<usize> {
        graph
            .chains()
            .iter()
            .flat_map(|c| c.filters.iter())
            .filter_map(|f| match f {
                Filter::ZoomPan { x, y, .. } => KenBurnsDirection::from_exprs(x, y).map(|d| d.index()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_five_images_cycle_pan_directions() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), 5, FrameSize::LANDSCAPE);
        let graph = build_enhanced_graph(&job, &SlideshowOptions::default()).unwrap();

        assert_eq!(zoompan_directions(&graph), vec![0, 1, 2, 3, 0]);
        assert!(graph.render().contains("s=1920x1080"));
    }

    #[test]
    fn test_graph_has_one_segment_per_image_and_one_concat() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), 4, FrameSize::PORTRAIT);
        let graph = build_enhanced_graph(&job, &SlideshowOptions::default()).unwrap();

        let labels = graph.produced_labels();
        assert_eq!(labels, vec!["v0", "v1", "v2", "v3", "outv"]);
        let rendered = graph.render();
        assert_eq!(rendered.matches("concat=n=4:v=1:a=0[outv]").count(), 1);
        assert_eq!(graph.validate(5).unwrap(), StreamLabel::named("outv"));
    }

    #[test]
    fn test_fades_never_overlap() {
        let options = SlideshowOptions::default();
        assert_eq!(fade_window(3.0, &options), (0.5, 2.5, 0.5));

        let (fade_in, out_start, fade_out) = fade_window(0.6, &options);
        assert!((fade_in - 0.3).abs() < 1e-9);
        assert!(out_start >= fade_in);
        assert!((out_start + fade_out - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_without_ken_burns_has_no_zoompan() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), 2, FrameSize::PORTRAIT);
        let options = SlideshowOptions {
            ken_burns: false,
            ..Default::default()
        };
        let graph = build_enhanced_graph(&job, &options).unwrap();
        assert!(!graph.render().contains("zoompan"));
    }

    #[test]
    fn test_job_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = job(dir.path(), 2, FrameSize::PORTRAIT);
        bad.durations.pop();
        assert!(build_enhanced_graph(&bad, &SlideshowOptions::default()).is_err());

        let empty = job(dir.path(), 0, FrameSize::PORTRAIT);
        assert!(empty.validate().is_err());
    }

    #[tokio::test]
    async fn test_enhanced_command_maps_audio_after_images() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), 3, FrameSize::PORTRAIT);
        let cmd = EnhancedSlideshow::default().build_command(&job).await.unwrap();

        assert_eq!(cmd.inputs().len(), 4);
        assert_eq!(cmd.maps(), &["[outv]".to_string(), "3:a".to_string()]);
        assert!(matches!(cmd.filter(), Some(FilterArg::Complex(_))));
        let args = cmd.build_args();
        assert!(args.contains(&"-shortest".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
    }

    #[tokio::test]
    async fn test_large_graph_goes_to_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), 3, FrameSize::PORTRAIT);
        let tier = EnhancedSlideshow::new(SlideshowOptions {
            inline_graph_limit: 10,
            ..Default::default()
        });
        let cmd = tier.build_command(&job).await.unwrap();

        let script = dir.path().join(ENHANCED_GRAPH_FILE);
        assert_eq!(cmd.filter(), Some(&FilterArg::Script(script.clone())));
        let written = std::fs::read_to_string(script).unwrap();
        assert!(written.contains("concat=n=3"));
        assert!(tier.scratch_files(&job).contains(&dir.path().join(ENHANCED_GRAPH_FILE)));
    }

    #[test]
    fn test_concat_list_repeats_last_image() {
        let images = vec![PathBuf::from("/tmp/a.png"), PathBuf::from("/tmp/it's.png")];
        let list = concat_list(&images, &[1.5, 2.0]);
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(
            lines,
            vec![
                "ffconcat version 1.0",
                "file '/tmp/a.png'",
                "duration 1.500",
                "file '/tmp/it'\\''s.png'",
                "duration 2.000",
                "file '/tmp/it'\\''s.png'",
                "duration 0.040",
            ]
        );
    }

    #[tokio::test]
    async fn test_basic_command_uses_concat_list() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), 2, FrameSize::PORTRAIT);
        let cmd = BasicSlideshow.build_command(&job).await.unwrap();

        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "concat"));
        assert!(args.contains(&"-vf".to_string()));
        assert_eq!(cmd.maps(), &["0:v".to_string(), "1:a".to_string()]);
        assert!(dir.path().join(CONCAT_LIST_FILE).exists());
    }
}

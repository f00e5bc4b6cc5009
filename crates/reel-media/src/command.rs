//! FFmpeg command builder and process runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use reel_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, parse_progress_line, FfmpegProgress};

/// Captured result of an external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Spawns external media tools.
///
/// A nonzero exit is not an error at this level; callers interpret
/// `ProcessOutput`. Errors are reserved for spawn, IO and timeout failures.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> MediaResult<ProcessOutput>;
}

/// Runner backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    /// Kill the child after this many seconds
    timeout_secs: Option<u64>,
    /// Receives parsed `-progress` snapshots
    progress_tx: Option<mpsc::UnboundedSender<FfmpegProgress>>,
}

impl SystemRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Forward progress snapshots parsed from stderr.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<FfmpegProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    fn resolve(program: &str) -> MediaResult<PathBuf> {
        which::which(program).map_err(|_| match program {
            "ffmpeg" => MediaError::FfmpegNotFound,
            "ffprobe" => MediaError::FfprobeNotFound,
            other => MediaError::ExecutableNotFound(other.to_string()),
        })
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> MediaResult<ProcessOutput> {
        let executable = Self::resolve(program)?;
        debug!("Running {} {}", program, args.join(" "));

        let mut child = Command::new(&executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Io(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::Io(std::io::Error::other("stderr not captured")))?;

        let stdout_handle = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf).await;
            buf
        });

        let progress_tx = self.progress_tx.clone();
        let stderr_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            let mut current = FfmpegProgress::default();
            let mut captured = String::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if is_progress_line(&line) {
                    if let Some(snapshot) = parse_progress_line(&line, &mut current) {
                        if let Some(tx) = &progress_tx {
                            let _ = tx.send(snapshot);
                        }
                    }
                    continue;
                }
                captured.push_str(&line);
                captured.push('\n');
            }
            captured
        });

        let status = match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!("{} timed out after {} seconds, killing process", program, secs);
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(secs));
                }
            },
            None => child.wait().await?,
        };

        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();

        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// One ffmpeg input and the options that precede its `-i`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub options: Vec<String>,
    pub path: PathBuf,
}

impl InputSpec {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            options: Vec::new(),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Add an input option (before -i).
    pub fn option(mut self, arg: impl Into<String>) -> Self {
        self.options.push(arg.into());
        self
    }

    /// A still image looped for `duration_secs` at `fps`.
    pub fn looped_still(path: impl AsRef<Path>, duration_secs: f64, fps: u32) -> Self {
        Self::new(path)
            .option("-loop")
            .option("1")
            .option("-framerate")
            .option(fps.to_string())
            .option("-t")
            .option(format!("{:.3}", duration_secs))
    }

    /// A concat-demuxer list file.
    pub fn concat_list(path: impl AsRef<Path>) -> Self {
        Self::new(path)
            .option("-f")
            .option("concat")
            .option("-safe")
            .option("0")
    }
}

/// How the filter graph is handed to ffmpeg.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterArg {
    /// `-filter_complex <graph>`
    Complex(String),
    /// `-filter_complex_script <file>` for graphs too long for argv
    Script(PathBuf),
    /// `-vf <chain>` for single-input commands
    Simple(String),
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<InputSpec>,
    filter: Option<FilterArg>,
    maps: Vec<String>,
    output_args: Vec<String>,
    output: PathBuf,
    overwrite: bool,
    log_level: String,
    progress: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            filter: None,
            maps: Vec::new(),
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
            overwrite: true,
            log_level: "error".to_string(),
            progress: true,
        }
    }

    /// Append an input.
    pub fn input(mut self, input: InputSpec) -> Self {
        self.inputs.push(input);
        self
    }

    /// Set filter complex.
    pub fn filter_complex(mut self, graph: impl Into<String>) -> Self {
        self.filter = Some(FilterArg::Complex(graph.into()));
        self
    }

    /// Read the filter complex from a script file.
    pub fn filter_script(mut self, path: impl AsRef<Path>) -> Self {
        self.filter = Some(FilterArg::Script(path.as_ref().to_path_buf()));
        self
    }

    /// Set video filter.
    pub fn video_filter(mut self, chain: impl Into<String>) -> Self {
        self.filter = Some(FilterArg::Simple(chain.into()));
        self
    }

    /// Map an output stream: a graph label (`[outv]`) or an input stream (`1:a`).
    pub fn map(mut self, stream: impl Into<String>) -> Self {
        self.maps.push(stream.into());
        self
    }

    /// Add output arguments (after the inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Set output pixel format.
    pub fn pixel_format(self, pix_fmt: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(pix_fmt)
    }

    /// Set output frame rate.
    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Stop at the end of the shortest stream.
    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// Move the moov atom to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Apply codec, quality and pixel format settings.
    pub fn encoding(self, encoding: &EncodingConfig) -> Self {
        self.video_codec(&encoding.codec)
            .preset(&encoding.preset)
            .crf(encoding.crf)
            .pixel_format(&encoding.pixel_format)
            .audio_codec(&encoding.audio_codec)
            .audio_bitrate(&encoding.audio_bitrate)
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Toggle `-progress pipe:2` output.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    pub fn filter(&self) -> Option<&FilterArg> {
        self.filter.as_ref()
    }

    pub fn maps(&self) -> &[String] {
        &self.maps
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Check that the command is runnable: at least one input, and every
    /// input-stream map points at an existing input.
    pub fn validate(&self) -> MediaResult<()> {
        if self.inputs.is_empty() {
            return Err(MediaError::invalid_input("ffmpeg command has no inputs"));
        }
        for map in &self.maps {
            if map.starts_with('[') {
                if !map.ends_with(']') || map.len() < 3 {
                    return Err(MediaError::invalid_input(format!("malformed map label: {}", map)));
                }
                continue;
            }
            let index = map
                .split(':')
                .next()
                .and_then(|i| i.parse::<usize>().ok())
                .ok_or_else(|| MediaError::invalid_input(format!("malformed map: {}", map)))?;
            if index >= self.inputs.len() {
                return Err(MediaError::invalid_input(format!(
                    "map {} references input {} but only {} inputs exist",
                    map,
                    index,
                    self.inputs.len()
                )));
            }
        }
        Ok(())
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        if self.progress {
            args.push("-progress".to_string());
            args.push("pipe:2".to_string());
            args.push("-nostats".to_string());
        }

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        match &self.filter {
            Some(FilterArg::Complex(graph)) => {
                args.push("-filter_complex".to_string());
                args.push(graph.clone());
            }
            Some(FilterArg::Script(path)) => {
                args.push("-filter_complex_script".to_string());
                args.push(path.to_string_lossy().to_string());
            }
            Some(FilterArg::Simple(chain)) => {
                args.push("-vf".to_string());
                args.push(chain.clone());
            }
            None => {}
        }

        for map in &self.maps {
            args.push("-map".to_string());
            args.push(map.clone());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Run an ffmpeg command, turning a nonzero exit into `FfmpegFailed`.
pub async fn run_ffmpeg(runner: &dyn ProcessRunner, cmd: &FfmpegCommand) -> MediaResult<ProcessOutput> {
    cmd.validate()?;
    let args = cmd.build_args();
    let output = runner.run("ffmpeg", &args).await?;

    if output.success() {
        Ok(output)
    } else {
        Err(MediaError::ffmpeg_failed(
            format!("FFmpeg exited with status {:?} writing {}", output.exit_code, cmd.output().display()),
            Some(output.stderr),
            output.exit_code,
        ))
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

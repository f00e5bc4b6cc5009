//! FFprobe media inspection.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::command::ProcessRunner;
use crate::error::{MediaError, MediaResult};

/// Dimensions and duration of a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Width in pixels, 0 for audio-only files
    pub width: u32,
    /// Height in pixels, 0 for audio-only files
    pub height: u32,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Frame rate (fps)
    pub fps: f64,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a media file for width, height and duration.
pub async fn probe(runner: &dyn ProcessRunner, path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let args = vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().to_string(),
    ];

    let output = runner.run("ffprobe", &args).await?;
    if !output.success() {
        return Err(MediaError::inspection_failed(
            format!("ffprobe exited with status {:?} for {}", output.exit_code, path.display()),
            Some(output.stderr),
        ));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &str) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_str(stdout)
        .map_err(|e| MediaError::inspection_failed(format!("unparsable ffprobe output: {}", e), None))?;

    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");

    let format_duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());
    let stream_duration = probe
        .streams
        .iter()
        .filter_map(|s| s.duration.as_deref())
        .filter_map(|d| d.parse::<f64>().ok())
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

    let duration_secs = format_duration
        .or(stream_duration)
        .ok_or_else(|| MediaError::inspection_failed("ffprobe output has no duration", None))?;

    let fps = video_stream
        .and_then(|s| s.avg_frame_rate.as_deref().or(s.r_frame_rate.as_deref()))
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    Ok(MediaInfo {
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
        duration_secs,
        fps,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

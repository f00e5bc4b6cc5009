//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Executable not found in PATH: {0}")]
    ExecutableNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Media inspection failed: {message}")]
    InspectionFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Invalid filter graph: {0}")]
    InvalidGraph(String),

    #[error("Invalid render input: {0}")]
    InvalidInput(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an inspection failure error.
    pub fn inspection_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::InspectionFailed {
            message: message.into(),
            stderr,
        }
    }

    pub fn invalid_graph(message: impl Into<String>) -> Self {
        Self::InvalidGraph(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Last lines of captured stderr, for log lines and user-facing reasons.
    pub fn stderr_tail(&self, max_lines: usize) -> Option<String> {
        let stderr = match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::InspectionFailed { stderr, .. } => {
                stderr.as_deref()?
            }
            _ => return None,
        };
        let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(max_lines);
        Some(lines[start..].join("\n"))
    }
}

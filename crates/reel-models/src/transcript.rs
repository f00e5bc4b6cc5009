//! Word-level transcripts produced by speech-to-text.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single recognized word with its position in the narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WordTimestamp {
    pub text: String,
    /// Start offset in milliseconds
    pub start_ms: u64,
    /// End offset in milliseconds
    pub end_ms: u64,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl WordTimestamp {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
            confidence: 1.0,
        }
    }
}

/// Full transcription result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub text: String,
    pub words: Vec<WordTimestamp>,
    /// Total narration length in seconds
    pub audio_duration_secs: f64,
}

impl Transcript {
    /// Total narration length in whole milliseconds.
    pub fn audio_duration_ms(&self) -> u64 {
        secs_to_ms(self.audio_duration_secs)
    }

    /// Whether the words are ordered by start and do not overlap.
    pub fn is_monotonic(&self) -> bool {
        self.words
            .windows(2)
            .all(|w| w[0].start_ms <= w[1].start_ms && w[0].end_ms <= w[1].start_ms)
    }
}

/// Convert seconds to whole milliseconds, clamping negatives to zero.
pub fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

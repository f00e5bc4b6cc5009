//! Timed scenes derived from a transcript.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A window of narration and the images displayed during it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimedScene {
    pub start_ms: u64,
    pub end_ms: u64,
    pub image_prompts: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

impl TimedScene {
    pub fn new(start_ms: u64, end_ms: u64, prompt: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            image_prompts: vec![prompt.into()],
            image_urls: Vec::new(),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms() as f64 / 1000.0
    }
}

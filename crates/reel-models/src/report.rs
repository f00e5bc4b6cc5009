//! Summary of a composition run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ProjectId;

/// Outputs and tier choices of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub project_id: ProjectId,
    pub slideshow_url: Option<String>,
    pub lipsync_url: Option<String>,
    pub final_video_url: Option<String>,
    /// Name of the slideshow tier that succeeded
    pub slideshow_tier: Option<String>,
    /// Name of the merge tier that succeeded
    pub merge_tier: Option<String>,
    pub timed_scene_count: usize,
    pub audio_duration_secs: f64,
}

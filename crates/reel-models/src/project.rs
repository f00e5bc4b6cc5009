//! Project records and their lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::{PipelineMode, TimedScene, Transcript, UserId};

/// Unique identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Generate a new random project ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Project was created and never rendered
    #[default]
    Draft,
    /// A composition run owns the project
    Processing,
    /// Last run delivered its outputs
    Completed,
    /// Last run hit a fatal error
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state for a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Failed)
    }

    /// Whether a project in this status may move to `next`.
    ///
    /// A run enters `Processing` from any resting state and leaves it only
    /// for `Completed` or `Failed`.
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Draft | Completed | Failed, Processing) | (Processing, Completed | Failed)
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct StatusTransitionError {
    pub from: ProjectStatus,
    pub to: ProjectStatus,
}

/// One script scene and the prompts for the images shown during it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub content: String,
    #[serde(default)]
    pub image_prompts: Vec<String>,
}

/// Unit of work: script, images, narration and the rendered outputs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,

    /// Owning user
    pub user_id: UserId,

    #[serde(default)]
    pub status: ProjectStatus,

    /// Frame orientation of the rendered outputs
    #[serde(default)]
    pub mode: PipelineMode,

    /// Full narration text
    #[serde(default)]
    pub script: String,

    #[serde(default)]
    pub scenes: Vec<Scene>,

    /// Flattened image prompts, in display order
    #[serde(default)]
    pub image_prompts: Vec<String>,

    /// Generated image URLs, aligned with `image_prompts`
    #[serde(default)]
    pub generated_images: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,

    /// Derived on every run; kept for display only
    #[serde(default)]
    pub timed_scenes: Vec<TimedScene>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slideshow_video_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lipsync_video_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,

    /// Reason of the last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Create a new draft project.
    pub fn new(user_id: impl Into<UserId>, script: impl Into<String>, scenes: Vec<Scene>) -> Self {
        let now = Utc::now();
        let image_prompts = scenes
            .iter()
            .flat_map(|s| s.image_prompts.iter().cloned())
            .collect();
        Self {
            id: ProjectId::new(),
            user_id: user_id.into(),
            status: ProjectStatus::Draft,
            mode: PipelineMode::default(),
            script: script.into(),
            scenes,
            image_prompts,
            generated_images: Vec::new(),
            transcript: None,
            timed_scenes: Vec::new(),
            audio_duration: None,
            slideshow_video_url: None,
            lipsync_video_url: None,
            final_video_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        }
    }

    /// Image prompts in display order.
    ///
    /// Falls back to flattening the scenes when the flattened list was never
    /// stored.
    pub fn flattened_prompts(&self) -> Vec<String> {
        if !self.image_prompts.is_empty() {
            return self.image_prompts.clone();
        }
        self.scenes
            .iter()
            .flat_map(|s| s.image_prompts.iter().cloned())
            .filter(|p| !p.trim().is_empty())
            .collect()
    }

    /// Move to a new status, enforcing the lifecycle rules.
    pub fn transition_to(&mut self, next: ProjectStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusTransitionError {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        match next {
            ProjectStatus::Processing => self.error_message = None,
            ProjectStatus::Completed => self.completed_at = Some(now),
            ProjectStatus::Failed => self.failed_at = Some(now),
            ProjectStatus::Draft => {}
        }
        Ok(())
    }

    /// Complete a run.
    pub fn mark_completed(&mut self) -> Result<(), StatusTransitionError> {
        self.transition_to(ProjectStatus::Completed)
    }

    /// Record a failure. Unlike `transition_to`, this is accepted from any
    /// state so precondition errors can fail a resting project.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        let now = Utc::now();
        self.status = ProjectStatus::Failed;
        self.error_message = Some(reason.into());
        self.failed_at = Some(now);
        self.updated_at = now;
    }

    /// Bump the update timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

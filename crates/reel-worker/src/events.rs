//! Progress events of a run.
//!
//! The orchestrator publishes on a broadcast channel; subscribers (the
//! binary's logger, tests) observe without affecting control flow. Events
//! published with no subscriber are dropped.

use serde::Serialize;
use tokio::sync::broadcast;

use reel_models::{ProjectId, ProjectStatus};

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    GenerateImages,
    Synthesize,
    Transcribe,
    Align,
    Download,
    Slideshow,
    LipSync,
    Merge,
    Finalize,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::GenerateImages => "generate_images",
            PipelineStep::Synthesize => "synthesize",
            PipelineStep::Transcribe => "transcribe",
            PipelineStep::Align => "align",
            PipelineStep::Download => "download",
            PipelineStep::Slideshow => "slideshow",
            PipelineStep::LipSync => "lip_sync",
            PipelineStep::Merge => "merge",
            PipelineStep::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StepStarted {
        project_id: ProjectId,
        step: PipelineStep,
    },
    StepFinished {
        project_id: ProjectId,
        step: PipelineStep,
        elapsed_ms: u64,
    },
    TierFailed {
        project_id: ProjectId,
        chain: &'static str,
        tier: &'static str,
        reason: String,
    },
    ArtifactStored {
        project_id: ProjectId,
        kind: &'static str,
        url: String,
    },
    RunFinished {
        project_id: ProjectId,
        status: ProjectStatus,
        error: Option<String>,
    },
}

/// Broadcast bus for [`PipelineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

//! Shared data models for the reelforge composition pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Projects, their lifecycle status, and owning user profiles
//! - Word-level transcripts and timed scenes
//! - Frame sizes, pipeline modes, and encoding configuration
//! - Run reports returned by the orchestrator

pub mod encoding;
pub mod project;
pub mod report;
pub mod scene;
pub mod transcript;
pub mod user;

// Re-export common types
pub use encoding::{EncodingConfig, FrameSize, PipelineMode};
pub use project::{Project, ProjectId, ProjectStatus, Scene, StatusTransitionError};
pub use report::RunReport;
pub use scene::TimedScene;
pub use transcript::{Transcript, WordTimestamp};
pub use user::{UserId, UserProfile};

//! Composition worker.
//!
//! This crate provides:
//! - The composition orchestrator driving a project from prompts to final video
//! - Per-run scratch resource management with guaranteed cleanup
//! - Project and profile repositories
//! - Progress events, structured run logging and metrics

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod repository;
pub mod resources;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use events::{EventBus, PipelineEvent, PipelineStep};
pub use logging::RunLogger;
pub use orchestrator::{CompositionOrchestrator, Services};
pub use repository::{InMemoryRepository, JsonFileRepository, ProfileRepository, ProjectRepository};
pub use resources::{ReleaseSummary, RunResources};

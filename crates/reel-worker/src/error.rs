//! Worker error types.
//!
//! Variants follow the failure classes of a run: precondition errors fail
//! before any work, external-call errors come from remote services and
//! media tools, resource errors come from local scratch storage.

use thiserror::Error;

use reel_models::{ProjectId, StatusTransitionError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Project {0} is already processing")]
    AlreadyProcessing(ProjectId),

    #[error("{step} failed: {message}")]
    ExternalCall { step: &'static str, message: String },

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error(transparent)]
    Transition(#[from] StatusTransitionError),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),

    #[error("AI service error: {0}")]
    Ai(#[from] reel_ai::AiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn external(step: &'static str, err: impl std::fmt::Display) -> Self {
        Self::ExternalCall {
            step,
            message: err.to_string(),
        }
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    /// Reason stored on the project and shown to the user.
    pub fn user_reason(&self) -> String {
        match self {
            WorkerError::Precondition(msg) => msg.clone(),
            WorkerError::AlreadyProcessing(_) => "A run is already in progress for this project".to_string(),
            WorkerError::ExternalCall { step, message } => format!("{} failed: {}", step, message),
            WorkerError::Resource(msg) => format!("Could not prepare media files: {}", msg),
            WorkerError::Media(e) => match e.stderr_tail(3) {
                Some(tail) if !tail.is_empty() => format!("Video processing failed: {}", tail),
                _ => format!("Video processing failed: {}", e),
            },
            other => other.to_string(),
        }
    }

    /// Errors raised before the run touched the project.
    pub fn is_precondition(&self) -> bool {
        matches!(self, WorkerError::Precondition(_))
    }
}

//! Structured run logging.
//!
//! Every line carries the project id and operation so one run can be
//! followed through interleaved worker output.

use tracing::{error, info, warn, Span};

use reel_models::ProjectId;

/// Run logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct RunLogger {
    project_id: String,
    operation: String,
}

impl RunLogger {
    pub fn new(project_id: &ProjectId, operation: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            project_id = %self.project_id,
            operation = %self.operation,
            "Run started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            project_id = %self.project_id,
            operation = %self.operation,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            project_id = %self.project_id,
            operation = %self.operation,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            project_id = %self.project_id,
            operation = %self.operation,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            project_id = %self.project_id,
            operation = %self.operation,
            "Run completed: {}", message
        );
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            project_id = %self.project_id,
            operation = %self.operation
        )
    }
}

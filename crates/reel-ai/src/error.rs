//! AI service error types.

use thiserror::Error;

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("{service} service unavailable: {message}")]
    ServiceUnavailable { service: &'static str, message: String },

    #[error("{service} request failed with status {status}: {body}")]
    RequestFailed {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse { service: &'static str, message: String },

    #[error("{service} job failed: {reason}")]
    JobFailed { service: &'static str, reason: String },

    #[error("{service} job still pending after {attempts} polls")]
    PollExhausted { service: &'static str, attempts: u32 },

    #[error("Every {service} request failed: {message}")]
    AllFailed { service: &'static str, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    pub fn invalid_response(service: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    pub fn job_failed(service: &'static str, reason: impl Into<String>) -> Self {
        Self::JobFailed {
            service,
            reason: reason.into(),
        }
    }

    /// Transient failures worth another attempt: network errors,
    /// rate limiting and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::ServiceUnavailable { .. } | AiError::Network(_) => true,
            AiError::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

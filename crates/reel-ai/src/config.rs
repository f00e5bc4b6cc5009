//! Service endpoints and client tuning, read once and injected into clients.

use std::time::Duration;

/// Base URL and credential of one remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ServiceEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn from_env(url_var: &str, key_var: &str, default_url: &str) -> Self {
        let base_url = std::env::var(url_var).unwrap_or_else(|_| default_url.to_string());
        let endpoint = Self::new(base_url);
        match std::env::var(key_var).ok().filter(|k| !k.is_empty()) {
            Some(key) => endpoint.with_api_key(key),
            None => endpoint,
        }
    }
}

/// Configuration for every AI service client.
#[derive(Debug, Clone)]
pub struct AiServicesConfig {
    pub image: ServiceEndpoint,
    pub speech: ServiceEndpoint,
    pub transcription: ServiceEndpoint,
    pub lipsync: ServiceEndpoint,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries for retryable failures of a single request
    pub max_retries: u32,
    /// Sleep between status polls of async jobs
    pub poll_interval: Duration,
    /// Poll cap for async jobs; `None` polls until the job settles
    pub max_poll_attempts: Option<u32>,
}

impl Default for AiServicesConfig {
    fn default() -> Self {
        Self {
            image: ServiceEndpoint::new("http://localhost:8101"),
            speech: ServiceEndpoint::new("http://localhost:8102"),
            transcription: ServiceEndpoint::new("http://localhost:8103"),
            lipsync: ServiceEndpoint::new("http://localhost:8104"),
            timeout: Duration::from_secs(120),
            max_retries: 2,
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: Some(360),
        }
    }
}

impl AiServicesConfig {
    /// Create config from environment variables.
    ///
    /// `AI_MAX_POLL_ATTEMPTS=0` disables the poll cap.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            image: ServiceEndpoint::from_env("IMAGE_API_URL", "IMAGE_API_KEY", &defaults.image.base_url),
            speech: ServiceEndpoint::from_env("TTS_API_URL", "TTS_API_KEY", &defaults.speech.base_url),
            transcription: ServiceEndpoint::from_env("ASR_API_URL", "ASR_API_KEY", &defaults.transcription.base_url),
            lipsync: ServiceEndpoint::from_env("LIPSYNC_API_URL", "LIPSYNC_API_KEY", &defaults.lipsync.base_url),
            timeout: Duration::from_secs(
                std::env::var("AI_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_retries: std::env::var("AI_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            poll_interval: Duration::from_secs(
                std::env::var("AI_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            max_poll_attempts: match std::env::var("AI_MAX_POLL_ATTEMPTS").ok().and_then(|s| s.parse::<u32>().ok()) {
                Some(0) => None,
                Some(n) => Some(n),
                None => defaults.max_poll_attempts,
            },
        }
    }
}

//! Narration synthesis.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AiServicesConfig;
use crate::error::{AiError, AiResult};
use crate::http::ServiceClient;

const SERVICE: &str = "tts";

/// Turns a script into a narration track, returning the audio URL.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> AiResult<String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechResponse {
    audio_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpSpeechSynthesizer {
    client: ServiceClient,
}

impl HttpSpeechSynthesizer {
    pub fn new(config: &AiServicesConfig) -> AiResult<Self> {
        Ok(Self {
            client: ServiceClient::new(SERVICE, config.speech.clone(), config.timeout, config.max_retries)?,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> AiResult<String> {
        let response: SpeechResponse = self
            .client
            .post_json("/v1/speech", &SpeechRequest { text, voice_id })
            .await?;
        response
            .audio_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AiError::invalid_response(SERVICE, "missing audioUrl"))
    }
}

//! Speech-to-text with word timestamps.
//!
//! Transcription is an asynchronous job: submit the audio URL, then poll the
//! job until it completes or errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use reel_models::{Transcript, WordTimestamp};

use crate::config::AiServicesConfig;
use crate::error::{AiError, AiResult};
use crate::http::ServiceClient;
use crate::poll::{poll_until_done, PollStatus};

const SERVICE: &str = "asr";

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_url: &str) -> AiResult<Transcript>;
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    word_timestamps: bool,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WordDto {
    text: String,
    start: u64,
    end: u64,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    words: Vec<WordDto>,
    /// Seconds
    #[serde(default)]
    audio_duration: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

impl JobResponse {
    fn into_status(self) -> AiResult<PollStatus<Transcript>> {
        match self.status.to_ascii_lowercase().as_str() {
            "completed" => Ok(PollStatus::Done(self.into_transcript()?)),
            "error" | "failed" => Err(AiError::job_failed(
                SERVICE,
                self.error.unwrap_or_else(|| "transcription failed".to_string()),
            )),
            _ => Ok(PollStatus::Pending),
        }
    }

    fn into_transcript(self) -> AiResult<Transcript> {
        let mut words: Vec<WordTimestamp> = self
            .words
            .into_iter()
            .map(|w| WordTimestamp {
                text: w.text,
                start_ms: w.start,
                end_ms: w.end.max(w.start),
                confidence: w.confidence,
            })
            .collect();
        words.sort_by_key(|w| w.start_ms);

        let last_end_secs = words.last().map(|w| w.end_ms as f64 / 1000.0);
        let audio_duration_secs = self
            .audio_duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .or(last_end_secs)
            .ok_or_else(|| AiError::invalid_response(SERVICE, "transcript has no duration"))?;

        let text = self.text.unwrap_or_else(|| {
            words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ")
        });

        Ok(Transcript {
            text,
            words,
            audio_duration_secs,
        })
    }
}

/// HTTP transcription client.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    client: ServiceClient,
    poll_interval: std::time::Duration,
    max_poll_attempts: Option<u32>,
}

impl HttpTranscriber {
    pub fn new(config: &AiServicesConfig) -> AiResult<Self> {
        Ok(Self {
            client: ServiceClient::new(SERVICE, config.transcription.clone(), config.timeout, config.max_retries)?,
            poll_interval: config.poll_interval,
            max_poll_attempts: config.max_poll_attempts,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio_url: &str) -> AiResult<Transcript> {
        let submitted: SubmitResponse = self
            .client
            .post_json(
                "/v1/transcripts",
                &SubmitRequest {
                    audio_url,
                    word_timestamps: true,
                },
            )
            .await?;
        info!(job_id = %submitted.id, "Transcription submitted");

        let path = format!("/v1/transcripts/{}", submitted.id);
        let (client, path) = (&self.client, path.as_str());
        let transcript = poll_until_done(SERVICE, self.poll_interval, self.max_poll_attempts, move |_| async move {
            let job: JobResponse = client.get_json(path).await?;
            job.into_status()
        })
        .await?;

        info!(
            job_id = %submitted.id,
            words = transcript.words.len(),
            duration_secs = transcript.audio_duration_secs,
            "Transcription completed"
        );
        Ok(transcript)
    }
}

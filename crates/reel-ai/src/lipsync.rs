//! Talking-head lip-sync composition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AiServicesConfig;
use crate::error::{AiError, AiResult};
use crate::http::ServiceClient;
use crate::poll::{poll_until_done, PollStatus};

const SERVICE: &str = "lipsync";

/// Produces a clip of the avatar video speaking the audio, returning its URL.
#[async_trait]
pub trait LipSyncer: Send + Sync {
    async fn lip_sync(&self, video_url: &str, audio_url: &str) -> AiResult<String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    video_url: &'a str,
    audio_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResponse {
    status: String,
    #[serde(default)]
    output_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl JobResponse {
    fn into_status(self) -> AiResult<PollStatus<String>> {
        match self.status.to_ascii_uppercase().as_str() {
            "COMPLETED" => self
                .output_url
                .filter(|u| !u.is_empty())
                .map(PollStatus::Done)
                .ok_or_else(|| AiError::invalid_response(SERVICE, "completed job has no outputUrl")),
            "FAILED" | "REJECTED" | "CANCELED" => Err(AiError::job_failed(
                SERVICE,
                self.error.unwrap_or_else(|| format!("job {}", self.status.to_ascii_lowercase())),
            )),
            _ => Ok(PollStatus::Pending),
        }
    }
}

/// HTTP lip-sync client.
#[derive(Debug, Clone)]
pub struct HttpLipSyncer {
    client: ServiceClient,
    poll_interval: std::time::Duration,
    max_poll_attempts: Option<u32>,
}

impl HttpLipSyncer {
    pub fn new(config: &AiServicesConfig) -> AiResult<Self> {
        Ok(Self {
            client: ServiceClient::new(SERVICE, config.lipsync.clone(), config.timeout, config.max_retries)?,
            poll_interval: config.poll_interval,
            max_poll_attempts: config.max_poll_attempts,
        })
    }
}

#[async_trait]
impl LipSyncer for HttpLipSyncer {
    async fn lip_sync(&self, video_url: &str, audio_url: &str) -> AiResult<String> {
        let submitted: SubmitResponse = self
            .client
            .post_json("/v1/lipsync", &SubmitRequest { video_url, audio_url })
            .await?;
        info!(job_id = %submitted.id, "Lip-sync submitted");

        let path = format!("/v1/lipsync/{}", submitted.id);
        let (client, path) = (&self.client, path.as_str());
        let url = poll_until_done(SERVICE, self.poll_interval, self.max_poll_attempts, move |_| async move {
            let job: JobResponse = client.get_json(path).await?;
            job.into_status()
        })
        .await?;

        info!(job_id = %submitted.id, "Lip-sync completed");
        Ok(url)
    }
}

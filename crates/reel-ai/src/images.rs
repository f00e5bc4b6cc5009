//! Still-image generation.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use reel_models::FrameSize;

use crate::config::AiServicesConfig;
use crate::error::{AiError, AiResult};
use crate::http::ServiceClient;

const SERVICE: &str = "image";

/// Generates one image per prompt, sized to `size`, and returns its URL.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, size: FrameSize) -> AiResult<String>;
}

/// Generate every prompt concurrently and return one URL per prompt.
///
/// Waits for every call to settle. Failures are logged and not retried;
/// only an empty result is an error. A prompt whose generation failed
/// takes the image of its nearest successful neighbour (the earlier one
/// on a tie), so index `i` always belongs to prompt `i` or stands in for it.
pub async fn generate_all(generator: &dyn ImageGenerator, prompts: &[String], size: FrameSize) -> AiResult<Vec<String>> {
    let results = join_all(prompts.iter().map(|prompt| generator.generate(prompt, size))).await;

    let mut slots = Vec::with_capacity(results.len());
    let mut last_error = None;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(url) => slots.push(Some(url)),
            Err(e) => {
                warn!(index, "Image generation failed: {}", e);
                last_error = Some(e);
                slots.push(None);
            }
        }
    }

    let generated = slots.iter().filter(|slot| slot.is_some()).count();
    let Some(urls) = fill_from_neighbours(&slots) else {
        return Err(AiError::AllFailed {
            service: SERVICE,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no prompts".to_string()),
        });
    };

    info!(generated, requested = prompts.len(), "Image generation finished");
    Ok(urls)
}

/// Fill empty slots from the closest filled slot. `None` if every slot is empty.
fn fill_from_neighbours(slots: &[Option<String>]) -> Option<Vec<String>> {
    let filled: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
        .collect();
    if filled.is_empty() {
        return None;
    }

    slots
        .iter()
        .enumerate()
        .map(|(i, slot)| match slot {
            Some(url) => Some(url.clone()),
            None => filled
                .iter()
                .min_by_key(|&&j| (i.abs_diff(j), j))
                .and_then(|&j| slots[j].clone()),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    url: Option<String>,
}

/// HTTP image generation client.
#[derive(Debug, Clone)]
pub struct HttpImageGenerator {
    client: ServiceClient,
}

impl HttpImageGenerator {
    pub fn new(config: &AiServicesConfig) -> AiResult<Self> {
        Ok(Self {
            client: ServiceClient::new(SERVICE, config.image.clone(), config.timeout, config.max_retries)?,
        })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, prompt: &str, size: FrameSize) -> AiResult<String> {
        let request = ImageRequest {
            prompt,
            width: size.width,
            height: size.height,
        };
        let response: ImageResponse = self.client.post_json("/v1/images", &request).await?;
        response
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AiError::invalid_response(SERVICE, "missing image url"))
    }
}

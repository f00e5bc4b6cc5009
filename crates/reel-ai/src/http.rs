//! Shared HTTP plumbing for service clients.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ServiceEndpoint;
use crate::error::{AiError, AiResult};

/// JSON client for one service with bearer auth and bounded retries.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    service: &'static str,
    http: Client,
    endpoint: ServiceEndpoint,
    max_retries: u32,
}

impl ServiceClient {
    pub fn new(service: &'static str, endpoint: ServiceEndpoint, timeout: Duration, max_retries: u32) -> AiResult<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(AiError::Network)?;
        Ok(Self {
            service,
            http,
            endpoint,
            max_retries,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.endpoint.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> AiResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(service = self.service, "POST {}", url);
        let url = url.as_str();
        self.with_retry(move || async move {
            let response = self.authorize(self.http.post(url)).json(body).send().await?;
            self.decode(response).await
        })
        .await
    }

    /// GET and decode the JSON response.
    pub async fn get_json<T>(&self, path: &str) -> AiResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(service = self.service, "GET {}", url);
        let url = url.as_str();
        self.with_retry(move || async move {
            let response = self.authorize(self.http.get(url)).send().await?;
            self.decode(response).await
        })
        .await
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> AiResult<T> {
        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(AiError::ServiceUnavailable {
                service: self.service,
                message: response.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(AiError::RequestFailed {
                service: self.service,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> AiResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = AiResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        service = self.service,
                        "Request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

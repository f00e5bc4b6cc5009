//! Streaming HTTP download of remote assets.

use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Stream `url` to `path`, returning the number of bytes written.
///
/// A partially written file is removed when the transfer fails.
pub async fn download_url(http: &reqwest::Client, url: &str, path: impl AsRef<Path>) -> StorageResult<u64> {
    let path = path.as_ref();
    let parsed = url::Url::parse(url).map_err(|e| StorageError::InvalidUrl(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(StorageError::InvalidUrl(format!("unsupported scheme in {}", url)));
    }

    debug!("Downloading {} to {}", url, path.display());
    let response = http.get(parsed).send().await?;
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(StorageError::not_found(url));
    }
    if !status.is_success() {
        return Err(StorageError::download_failed(format!("{} returned {}", url, status)));
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match write_body(response, path).await {
        Ok(written) => {
            info!("Downloaded {} bytes from {}", written, url);
            Ok(written)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(path).await;
            Err(e)
        }
    }
}

async fn write_body(response: reqwest::Response, path: &Path) -> StorageResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| StorageError::download_failed(e.to_string()))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(StorageError::download_failed("empty response body"));
    }
    Ok(written)
}

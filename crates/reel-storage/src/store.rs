//! Asset store abstraction used by the orchestrator.

use std::path::Path;

use async_trait::async_trait;

use crate::client::R2Client;
use crate::error::StorageResult;

/// Durable storage for run artifacts.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload a local file under `key`, returning its public URL.
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String>;

    /// Download a remote asset to `dest`, returning the byte count.
    async fn download(&self, url: &str, dest: &Path) -> StorageResult<u64>;
}

#[async_trait]
impl AssetStore for R2Client {
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String> {
        R2Client::upload_file(self, path, key, content_type).await?;
        Ok(self.public_url(key))
    }

    async fn download(&self, url: &str, dest: &Path) -> StorageResult<u64> {
        self.download_any(url, dest).await
    }
}

//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - File upload to R2 with public URLs
//! - Download of remote assets (our own objects via the S3 API, anything else over HTTP)
//! - Object key layout for run artifacts

pub mod client;
pub mod download;
pub mod error;
pub mod keys;
pub mod store;

pub use client::{R2Client, R2Config};
pub use download::download_url;
pub use error::{StorageError, StorageResult};
pub use keys::{artifact_key, content_type_for, extension_from_url, new_run_id, ArtifactKind};
pub use store::AssetStore;

//! Object key layout.
//!
//! Every artifact of a run lives under `projects/{project_id}/` and carries
//! the run id so a retried run never overwrites the previous outputs.

use std::path::Path;

use chrono::Utc;
use uuid::Uuid;

use reel_models::ProjectId;

/// Kind of stored artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Slideshow,
    Lipsync,
    Final,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Slideshow => "slideshow",
            ArtifactKind::Lipsync => "lipsync",
            ArtifactKind::Final => "final",
        }
    }
}

/// Sortable run identifier: UTC timestamp plus a random suffix.
pub fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S"), &suffix[..8])
}

/// `projects/{project}/{kind}-{run}.{ext}`
pub fn artifact_key(project_id: &ProjectId, kind: ArtifactKind, run_id: &str, ext: &str) -> String {
    format!(
        "projects/{}/{}-{}.{}",
        project_id.as_str(),
        kind.as_str(),
        run_id,
        ext.trim_start_matches('.')
    )
}

/// MIME type from a file extension.
pub fn content_type_for(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// File extension implied by a URL path, if it has one.
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.last()?.to_string();
    let ext = Path::new(&name).extension()?.to_str()?.to_ascii_lowercase();
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext)
}

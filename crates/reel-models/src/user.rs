//! Owning user and the media references a run needs from them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-user media references.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,

    /// Reference talking-head video used for lip-sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_video_url: Option<String>,

    /// Cloned voice identifier for speech synthesis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            avatar_video_url: None,
            voice_id: None,
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_video_url = Some(url.into());
        self
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    /// Avatar URL, ignoring blank values.
    pub fn avatar(&self) -> Option<&str> {
        self.avatar_video_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// Voice ID, ignoring blank values.
    pub fn voice(&self) -> Option<&str> {
        self.voice_id.as_deref().filter(|s| !s.trim().is_empty())
    }
}

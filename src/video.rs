use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::TranscriptionStatus;

/// Identifier of a stored video
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Per-video settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    /// Overrides the organization setting when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_transcript: Option<bool>,
}

/// Organization-wide settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_transcript: Option<bool>,
}

/// Video record as persisted by the video store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,

    /// Owning user
    pub owner_id: String,

    /// Owning organization, if any
    #[serde(default)]
    pub org_id: Option<String>,

    /// Storage bucket holding the video objects; `None` means the default bucket
    #[serde(default)]
    pub bucket_id: Option<String>,

    #[serde(default)]
    pub settings: VideoSettings,

    #[serde(default)]
    pub transcription_status: TranscriptionStatus,

    /// Last time `transcription_status` was written
    #[serde(default)]
    pub status_updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Video {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: VideoId::new(id),
            owner_id: owner_id.into(),
            org_id: None,
            bucket_id: None,
            settings: VideoSettings::default(),
            transcription_status: TranscriptionStatus::Unset,
            status_updated_at: None,
        }
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_bucket(mut self, bucket_id: impl Into<String>) -> Self {
        self.bucket_id = Some(bucket_id.into());
        self
    }

    pub fn with_transcript_disabled(mut self, disabled: bool) -> Self {
        self.settings.disable_transcript = Some(disabled);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    #[serde(default)]
    pub settings: OrganizationSettings,
}

impl Organization {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            settings: OrganizationSettings::default(),
        }
    }

    pub fn with_transcript_disabled(mut self, disabled: bool) -> Self {
        self.settings.disable_transcript = Some(disabled);
        self
    }
}

/// A storage bucket a video may be assigned to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageBucket {
    pub id: String,
    /// Bucket name at the storage provider
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Everything the pipeline needs about one video, fetched in a single read
#[derive(Debug, Clone)]
pub struct VideoContext {
    pub video: Video,
    pub bucket: Option<StorageBucket>,
    pub organization: Option<Organization>,
}

impl VideoContext {
    /// Video-level setting wins over the organization setting; default is enabled.
    pub fn transcript_disabled(&self) -> bool {
        self.video
            .settings
            .disable_transcript
            .or_else(|| {
                self.organization
                    .as_ref()
                    .and_then(|org| org.settings.disable_transcript)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(video: Option<bool>, org: Option<bool>) -> VideoContext {
        let mut v = Video::new("vid-1", "user-1").with_org("org-1");
        v.settings.disable_transcript = video;
        let mut o = Organization::new("org-1");
        o.settings.disable_transcript = org;
        VideoContext {
            video: v,
            bucket: None,
            organization: Some(o),
        }
    }

    #[test]
    fn test_disable_flag_defaults_to_enabled() {
        assert!(!context(None, None).transcript_disabled());
    }

    #[test]
    fn test_video_setting_overrides_organization() {
        assert!(!context(Some(false), Some(true)).transcript_disabled());
        assert!(context(Some(true), Some(false)).transcript_disabled());
    }

    #[test]
    fn test_organization_setting_applies_when_video_unset() {
        assert!(context(None, Some(true)).transcript_disabled());
    }

    #[test]
    fn test_video_deserializes_with_missing_optional_fields() {
        let video: Video =
            serde_json::from_str(r#"{"id":"abc","owner_id":"u1"}"#).unwrap();
        assert_eq!(video.id.as_str(), "abc");
        assert_eq!(video.transcription_status, TranscriptionStatus::Unset);
        assert!(video.bucket_id.is_none());
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::video::{Organization, StorageBucket, Video, VideoContext, VideoId};

/// Transcription progress persisted on a video
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscriptionStatus {
    /// Never transcribed, or the last attempt failed
    #[default]
    Unset,

    /// Claimed by a running pipeline
    Processing,

    /// Subtitle artifact stored
    Complete,

    /// Transcription disabled by video or organization settings
    Skipped,

    /// The source video carries no audio track
    NoAudio,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptionStatus::Unset => "UNSET",
            TranscriptionStatus::Processing => "PROCESSING",
            TranscriptionStatus::Complete => "COMPLETE",
            TranscriptionStatus::Skipped => "SKIPPED",
            TranscriptionStatus::NoAudio => "NO_AUDIO",
        }
    }

    /// Whether a status write from `self` to `next` is allowed.
    ///
    /// `PROCESSING` and `SKIPPED` may be written over anything (retries and the
    /// policy short-circuit both happen before a claim). Every other state is
    /// only reachable from `PROCESSING`.
    pub fn can_transition_to(&self, next: TranscriptionStatus) -> bool {
        use TranscriptionStatus::*;
        match (self, next) {
            (_, Processing) | (_, Skipped) => true,
            (Processing, Complete) | (Processing, NoAudio) | (Processing, Unset) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TranscriptionStatus::Processing)
    }
}

impl FromStr for TranscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNSET" => Ok(TranscriptionStatus::Unset),
            "PROCESSING" => Ok(TranscriptionStatus::Processing),
            "COMPLETE" => Ok(TranscriptionStatus::Complete),
            "SKIPPED" => Ok(TranscriptionStatus::Skipped),
            "NO_AUDIO" => Ok(TranscriptionStatus::NoAudio),
            _ => Err(format!("Invalid transcription status: {}", s)),
        }
    }
}

impl fmt::Display for TranscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `PROCESSING` claim can be taken over once it is older than `lease`.
pub fn lease_available(
    status: TranscriptionStatus,
    updated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lease: Duration,
) -> bool {
    if status != TranscriptionStatus::Processing {
        return true;
    }
    match updated_at {
        Some(claimed_at) => (now - claimed_at)
            .to_std()
            .map(|elapsed| elapsed >= lease)
            .unwrap_or(false),
        None => true,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("video not found: {0}")]
    VideoNotFound(String),

    #[error("organization not found: {0}")]
    OrganizationNotFound(String),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: TranscriptionStatus,
        to: TranscriptionStatus,
    },
}

/// Video metadata and status persistence used by the pipeline
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Video, its bucket and its organization in one read
    async fn load_context(&self, video_id: &VideoId) -> Result<Option<VideoContext>, StoreError>;

    async fn transcription_status(&self, video_id: &VideoId) -> Result<TranscriptionStatus, StoreError>;

    async fn set_transcription_status(
        &self,
        video_id: &VideoId,
        status: TranscriptionStatus,
    ) -> Result<(), StoreError>;

    /// Conditionally move the video to `PROCESSING`.
    ///
    /// Returns `false` without writing when another run holds a live claim.
    async fn claim_for_processing(&self, video_id: &VideoId, lease: Duration) -> Result<bool, StoreError>;

    /// Conditionally move the video to `SKIPPED`, with the same lease rule as
    /// [`VideoStore::claim_for_processing`].
    async fn mark_skipped(&self, video_id: &VideoId, lease: Duration) -> Result<bool, StoreError>;

    async fn set_video_transcript_disabled(
        &self,
        video_id: &VideoId,
        disabled: Option<bool>,
    ) -> Result<(), StoreError>;

    async fn set_organization_transcript_disabled(
        &self,
        org_id: &str,
        disabled: Option<bool>,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct StoreCache {
    videos: HashMap<VideoId, Video>,
    organizations: HashMap<String, Organization>,
    buckets: HashMap<String, StorageBucket>,
}

/// File-backed video store.
///
/// Layout under `state_dir`: `videos/*.json`, `organizations/*.json`,
/// `buckets/*.json`. Everything is loaded into memory on startup and written
/// through on every mutation.
#[derive(Debug, Clone)]
pub struct JsonVideoStore {
    state_dir: PathBuf,
    cache: Arc<RwLock<StoreCache>>,
}

impl JsonVideoStore {
    pub async fn open(state_dir: PathBuf) -> Result<Self, StoreError> {
        for sub in ["videos", "organizations", "buckets"] {
            fs::create_dir_all(state_dir.join(sub)).await?;
        }

        let store = Self {
            state_dir,
            cache: Arc::new(RwLock::new(StoreCache::default())),
        };
        store.load_existing().await?;

        let cache = store.cache.read().await;
        info!(
            "📊 Video store opened at {} ({} videos, {} organizations, {} buckets)",
            store.state_dir.display(),
            cache.videos.len(),
            cache.organizations.len(),
            cache.buckets.len()
        );
        drop(cache);

        Ok(store)
    }

    async fn load_existing(&self) -> Result<(), StoreError> {
        let videos: Vec<Video> = load_dir(&self.state_dir.join("videos")).await?;
        let organizations: Vec<Organization> = load_dir(&self.state_dir.join("organizations")).await?;
        let buckets: Vec<StorageBucket> = load_dir(&self.state_dir.join("buckets")).await?;

        let mut cache = self.cache.write().await;
        cache.videos = videos.into_iter().map(|v| (v.id.clone(), v)).collect();
        cache.organizations = organizations.into_iter().map(|o| (o.id.clone(), o)).collect();
        cache.buckets = buckets.into_iter().map(|b| (b.id.clone(), b)).collect();
        Ok(())
    }

    pub async fn insert_video(&self, video: Video) -> Result<(), StoreError> {
        self.write_record("videos", video.id.as_str(), &video).await?;
        self.cache.write().await.videos.insert(video.id.clone(), video);
        Ok(())
    }

    pub async fn insert_organization(&self, organization: Organization) -> Result<(), StoreError> {
        self.write_record("organizations", &organization.id, &organization).await?;
        self.cache
            .write()
            .await
            .organizations
            .insert(organization.id.clone(), organization);
        Ok(())
    }

    pub async fn insert_bucket(&self, bucket: StorageBucket) -> Result<(), StoreError> {
        self.write_record("buckets", &bucket.id, &bucket).await?;
        self.cache.write().await.buckets.insert(bucket.id.clone(), bucket);
        Ok(())
    }

    /// Percent-encoded so distinct ids never share a file
    fn record_path(&self, kind: &str, id: &str) -> PathBuf {
        self.state_dir
            .join(kind)
            .join(format!("{}.json", urlencoding::encode(id)))
    }

    async fn write_record<T: Serialize>(&self, kind: &str, id: &str, record: &T) -> Result<(), StoreError> {
        let path = self.record_path(kind, id);
        let json = serde_json::to_string_pretty(record)?;
        // Write to a sibling file and rename so readers never see a torn record.
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &path).await?;
        debug!("💾 Persisted {} record {}", kind, id);
        Ok(())
    }

    async fn write_status(
        &self,
        video: &mut Video,
        status: TranscriptionStatus,
    ) -> Result<(), StoreError> {
        let previous = (video.transcription_status, video.status_updated_at);
        video.transcription_status = status;
        video.status_updated_at = Some(Utc::now());
        if let Err(e) = self.write_record("videos", video.id.as_str(), video).await {
            video.transcription_status = previous.0;
            video.status_updated_at = previous.1;
            return Err(e);
        }
        Ok(())
    }
}

async fn load_dir<T: for<'de> Deserialize<'de>>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let mut records = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "json") {
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str(&content) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Failed to load record {}: {}", path.display(), e),
            }
        }
    }

    Ok(records)
}

#[async_trait]
impl VideoStore for JsonVideoStore {
    async fn load_context(&self, video_id: &VideoId) -> Result<Option<VideoContext>, StoreError> {
        let cache = self.cache.read().await;
        let Some(video) = cache.videos.get(video_id) else {
            return Ok(None);
        };

        let bucket = video
            .bucket_id
            .as_ref()
            .and_then(|id| cache.buckets.get(id))
            .cloned();
        let organization = video
            .org_id
            .as_ref()
            .and_then(|id| cache.organizations.get(id))
            .cloned();

        Ok(Some(VideoContext {
            video: video.clone(),
            bucket,
            organization,
        }))
    }

    async fn transcription_status(&self, video_id: &VideoId) -> Result<TranscriptionStatus, StoreError> {
        self.cache
            .read()
            .await
            .videos
            .get(video_id)
            .map(|v| v.transcription_status)
            .ok_or_else(|| StoreError::VideoNotFound(video_id.to_string()))
    }

    async fn set_transcription_status(
        &self,
        video_id: &VideoId,
        status: TranscriptionStatus,
    ) -> Result<(), StoreError> {
        let mut cache = self.cache.write().await;
        let video = cache
            .videos
            .get_mut(video_id)
            .ok_or_else(|| StoreError::VideoNotFound(video_id.to_string()))?;

        if !video.transcription_status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: video.transcription_status,
                to: status,
            });
        }

        let from = video.transcription_status;
        self.write_status(video, status).await?;
        debug!("🔄 {} transcription status {} -> {}", video_id, from, status);
        Ok(())
    }

    async fn claim_for_processing(&self, video_id: &VideoId, lease: Duration) -> Result<bool, StoreError> {
        let mut cache = self.cache.write().await;
        let video = cache
            .videos
            .get_mut(video_id)
            .ok_or_else(|| StoreError::VideoNotFound(video_id.to_string()))?;

        if !lease_available(video.transcription_status, video.status_updated_at, Utc::now(), lease) {
            return Ok(false);
        }

        if video.transcription_status == TranscriptionStatus::Processing {
            warn!("⏰ Reclaiming expired processing lease for {}", video_id);
        }

        self.write_status(video, TranscriptionStatus::Processing).await?;
        Ok(true)
    }

    async fn mark_skipped(&self, video_id: &VideoId, lease: Duration) -> Result<bool, StoreError> {
        let mut cache = self.cache.write().await;
        let video = cache
            .videos
            .get_mut(video_id)
            .ok_or_else(|| StoreError::VideoNotFound(video_id.to_string()))?;

        if !lease_available(video.transcription_status, video.status_updated_at, Utc::now(), lease) {
            debug!("Not skipping {}: another run holds the claim", video_id);
            return Ok(false);
        }

        self.write_status(video, TranscriptionStatus::Skipped).await?;
        Ok(true)
    }

    async fn set_video_transcript_disabled(
        &self,
        video_id: &VideoId,
        disabled: Option<bool>,
    ) -> Result<(), StoreError> {
        let mut cache = self.cache.write().await;
        let video = cache
            .videos
            .get_mut(video_id)
            .ok_or_else(|| StoreError::VideoNotFound(video_id.to_string()))?;

        let mut updated = video.clone();
        updated.settings.disable_transcript = disabled;
        self.write_record("videos", video_id.as_str(), &updated).await?;
        *video = updated;
        Ok(())
    }

    async fn set_organization_transcript_disabled(
        &self,
        org_id: &str,
        disabled: Option<bool>,
    ) -> Result<(), StoreError> {
        let mut cache = self.cache.write().await;
        let organization = cache
            .organizations
            .get_mut(org_id)
            .ok_or_else(|| StoreError::OrganizationNotFound(org_id.to_string()))?;

        let mut updated = organization.clone();
        updated.settings.disable_transcript = disabled;
        self.write_record("organizations", org_id, &updated).await?;
        *organization = updated;
        Ok(())
    }
}

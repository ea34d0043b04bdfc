//! Audio extraction from stored videos
//!
//! Two strategies are available: a remote media service reached over HTTP, or
//! the local `ffmpeg`/`ffprobe` tools. The strategy is picked once by
//! [`create_extractor`] and then used through the [`AudioExtractor`] trait.

mod local;
mod remote;

pub use local::LocalExtractor;
pub use remote::MediaServiceExtractor;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::config::AudioConfig;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("media service unreachable: {0}")]
    Unreachable(String),

    #[error("media service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("audio extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid extractor response: {0}")]
    InvalidResponse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio pulled out of a video, ready to be staged
#[derive(Debug, Clone)]
pub struct ExtractedAudio {
    pub data: Bytes,
    pub content_type: String,
}

impl ExtractedAudio {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Strategy for checking and extracting a video's audio track
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the video at `video_url` carries at least one audio stream
    async fn has_audio_track(&self, video_url: &Url) -> Result<bool, ExtractionError>;

    /// Full audio track of the video
    async fn extract(&self, video_url: &Url) -> Result<ExtractedAudio, ExtractionError>;
}

/// Pick the extraction strategy: the media service when one is configured, local tools otherwise
pub fn create_extractor(config: &AudioConfig) -> Result<Arc<dyn AudioExtractor>, ExtractionError> {
    match &config.media_server_url {
        Some(url) => {
            let base_url = Url::parse(url)
                .map_err(|e| ExtractionError::InvalidResponse(format!("media server url {}: {}", url, e)))?;
            let extractor = MediaServiceExtractor::new(
                base_url,
                config.media_server_secret.clone(),
                Duration::from_secs(config.request_timeout_secs),
            )?;
            info!("🌐 Using media service for audio extraction: {}", url);
            Ok(Arc::new(extractor))
        }
        None => {
            info!("🎵 Using local {} for audio extraction", config.ffmpeg_path);
            Ok(Arc::new(LocalExtractor::new(config.clone())))
        }
    }
}

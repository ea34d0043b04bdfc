//! vidscribe - single-video speech-to-text pipeline
//!
//! Extracts the audio track of a stored video, sends it to a hosted
//! transcription provider and stores speaker-tagged WebVTT subtitles next to
//! the video, tracking progress in the video's transcription status.

pub mod audio;
pub mod config;
pub mod generation;
pub mod processing;
pub mod state;
pub mod storage;
pub mod transcription;
pub mod video;

use crate::audio::ExtractionError;
use crate::state::StoreError;
use crate::storage::StorageError;
use crate::transcription::TranscriptionError;
use crate::video::VideoId;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder};
pub use crate::processing::{PipelineDeps, PipelineOutcome, TranscriptionPipeline};
pub use crate::state::{JsonVideoStore, TranscriptionStatus, VideoStore};
pub use crate::transcription::{Transcript, Utterance};

/// Why a pipeline run failed
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("transcription provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("audio extraction error: {0}")]
    Extraction(ExtractionError),

    #[error("video store error: {0}")]
    Store(StoreError),

    #[error("video {0} is already being transcribed")]
    AlreadyProcessing(VideoId),
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => PipelineError::NotFound(format!("source object {}", key)),
            StorageError::Unreachable(msg) => PipelineError::Unreachable(msg),
            StorageError::Configuration(msg) => PipelineError::Config(msg),
            other => PipelineError::Storage(other),
        }
    }
}

impl From<TranscriptionError> for PipelineError {
    fn from(err: TranscriptionError) -> Self {
        match err {
            TranscriptionError::MissingCredential => PipelineError::Config(err.to_string()),
            TranscriptionError::Unreachable(msg) => PipelineError::Unreachable(msg),
            TranscriptionError::Timeout { .. } => PipelineError::Timeout(err.to_string()),
            other => PipelineError::Provider(other.to_string()),
        }
    }
}

impl From<ExtractionError> for PipelineError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Unreachable(msg) => PipelineError::Unreachable(msg),
            ExtractionError::Timeout(_) => PipelineError::Timeout(err.to_string()),
            other => PipelineError::Extraction(other),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VideoNotFound(id) => PipelineError::NotFound(format!("video {}", id)),
            other => PipelineError::Store(other),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::audio::{self, AudioExtractor};
use crate::config::{Config, PipelineConfig};
use crate::generation::{self, GenerationTrigger};
use crate::state::{TranscriptionStatus, VideoStore};
use crate::storage::{
    ConfiguredStorageResolver, ObjectKey, ObjectStorage, StorageResolver, VideoObjectKeys,
    SUBTITLE_CONTENT_TYPE,
};
use crate::transcription::{vtt, AssemblyAiClient, Transcriber};
use crate::video::{VideoContext, VideoId};
use crate::PipelineError;

/// Result of one pipeline run, as reported to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub success: bool,
    pub message: String,
    /// Status left on the video; `None` when the run never touched it
    pub status: Option<TranscriptionStatus>,
}

impl PipelineOutcome {
    fn finished(status: TranscriptionStatus) -> Self {
        let message = match status {
            TranscriptionStatus::Skipped => "Transcription disabled for this video",
            TranscriptionStatus::NoAudio => "Video has no audio track",
            _ => "Transcription completed",
        };
        Self {
            success: true,
            message: message.to_string(),
            status: Some(status),
        }
    }

    fn failed(error: &PipelineError, status: Option<TranscriptionStatus>) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            status,
        }
    }
}

/// Collaborators of the pipeline
#[derive(Clone)]
pub struct PipelineDeps {
    pub store: Arc<dyn VideoStore>,
    pub storage: Arc<dyn StorageResolver>,
    pub extractor: Arc<dyn AudioExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub generation: Arc<dyn GenerationTrigger>,
}

/// Run failure, remembering whether the video had been claimed
struct RunFailure {
    error: PipelineError,
    claimed: bool,
}

impl RunFailure {
    fn before_claim(error: PipelineError) -> Self {
        Self { error, claimed: false }
    }

    fn after_claim(error: PipelineError) -> Self {
        Self { error, claimed: true }
    }
}

/// Transcribes one video per `run` call
pub struct TranscriptionPipeline {
    deps: PipelineDeps,
    config: PipelineConfig,
    background: Mutex<JoinSet<()>>,
}

impl TranscriptionPipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        Self {
            deps,
            config,
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Wire up the configured collaborators around an opened store
    pub fn from_config(config: &Config, store: Arc<dyn VideoStore>) -> Result<Self, PipelineError> {
        let extractor = audio::create_extractor(&config.audio)?;
        let transcriber = AssemblyAiClient::from_config(&config.transcription)?;
        let generation = generation::create_trigger(&config.generation)
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let deps = PipelineDeps {
            store,
            storage: Arc::new(ConfiguredStorageResolver::new(config.storage.clone())),
            extractor,
            transcriber: Arc::new(transcriber),
            generation,
        };

        Ok(Self::new(deps, config.pipeline.clone()))
    }

    /// Transcribe a video and store its subtitles.
    ///
    /// Never fails: errors are reported through the outcome, and a claimed
    /// video is reset to `UNSET` before returning.
    pub async fn run(&self, video_id: &VideoId, user_id: &str, ai_generation_enabled: bool) -> PipelineOutcome {
        let span = info_span!("transcription", video_id = %video_id, user_id = %user_id);

        async move {
            let start_time = Instant::now();
            info!("🚀 Starting transcription");

            match self.execute(video_id, user_id, ai_generation_enabled).await {
                Ok(status) => {
                    info!(
                        "✅ Transcription run finished: {} in {:.1}s",
                        status,
                        start_time.elapsed().as_secs_f64()
                    );
                    PipelineOutcome::finished(status)
                }
                Err(failure) => {
                    error!(error = %failure.error, "❌ Transcription failed");
                    let status = if failure.claimed {
                        self.reset_status(video_id).await
                    } else {
                        None
                    };
                    PipelineOutcome::failed(&failure.error, status)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Wait for spawned follow-on work (AI generation triggers)
    pub async fn drain_background(&self) -> usize {
        let mut background = self.background.lock().await;
        let mut drained = 0;
        while let Some(joined) = background.join_next().await {
            if let Err(e) = joined {
                warn!("Background task ended abnormally: {}", e);
            }
            drained += 1;
        }
        drained
    }

    /// Spawned follow-on tasks not yet reaped
    pub async fn pending_background(&self) -> usize {
        self.background.lock().await.len()
    }

    async fn execute(
        &self,
        video_id: &VideoId,
        user_id: &str,
        ai_generation_enabled: bool,
    ) -> Result<TranscriptionStatus, RunFailure> {
        let Some(context) = self.claim(video_id).await.map_err(RunFailure::before_claim)? else {
            return Ok(TranscriptionStatus::Skipped);
        };

        let status = self
            .process_claimed(&context, user_id)
            .await
            .map_err(RunFailure::after_claim)?;

        if status == TranscriptionStatus::Complete && ai_generation_enabled {
            self.spawn_generation(video_id, user_id).await;
        }

        Ok(status)
    }

    /// Load the video and take the processing claim; `None` when transcription is disabled
    async fn claim(&self, video_id: &VideoId) -> Result<Option<VideoContext>, PipelineError> {
        let context = self
            .deps
            .store
            .load_context(video_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("video {}", video_id)))?;

        if context.video.owner_id.trim().is_empty() {
            return Err(PipelineError::NotFound(format!("owner of video {}", video_id)));
        }

        if context.transcript_disabled() {
            info!("⏭️  Transcription disabled, marking video as skipped");
            if !self
                .deps
                .store
                .mark_skipped(video_id, self.config.processing_lease())
                .await?
            {
                return Err(PipelineError::AlreadyProcessing(video_id.clone()));
            }
            return Ok(None);
        }

        self.deps.transcriber.ensure_ready()?;

        if !self
            .deps
            .store
            .claim_for_processing(video_id, self.config.processing_lease())
            .await?
        {
            return Err(PipelineError::AlreadyProcessing(video_id.clone()));
        }
        debug!("Claimed video for processing");

        Ok(Some(context))
    }

    async fn process_claimed(
        &self,
        context: &VideoContext,
        user_id: &str,
    ) -> Result<TranscriptionStatus, PipelineError> {
        let video_id = &context.video.id;
        let keys = VideoObjectKeys::new(user_id, video_id, &self.config.source_object);

        let storage = self.deps.storage.resolve(context.bucket.as_ref()).await?;
        storage.probe(&keys.source).await?;
        let video_url = storage
            .signed_url(&keys.source, self.config.signed_url_ttl())
            .await?;

        let extractor = &self.deps.extractor;
        if !extractor.has_audio_track(&video_url).await? {
            info!("🔇 No audio track found");
            self.deps
                .store
                .set_transcription_status(video_id, TranscriptionStatus::NoAudio)
                .await?;
            return Ok(TranscriptionStatus::NoAudio);
        }

        let audio = extractor.extract(&video_url).await?;
        info!("🎵 Extracted {} bytes of audio via {}", audio.len(), extractor.name());

        storage
            .put_object(&keys.staged_audio, audio.data, &audio.content_type)
            .await?;

        let result = self.transcribe_staged(context, storage.as_ref(), &keys).await;
        self.cleanup_staged(storage.as_ref(), &keys.staged_audio).await;
        result
    }

    async fn transcribe_staged(
        &self,
        context: &VideoContext,
        storage: &dyn ObjectStorage,
        keys: &VideoObjectKeys,
    ) -> Result<TranscriptionStatus, PipelineError> {
        let audio_url = storage
            .signed_url(&keys.staged_audio, self.config.signed_url_ttl())
            .await?;

        let transcript = self.deps.transcriber.transcribe(&audio_url).await?;
        let subtitles = vtt::format_transcript(&transcript);

        storage
            .put_object(&keys.transcription, subtitles.into_bytes().into(), SUBTITLE_CONTENT_TYPE)
            .await?;
        info!("📝 Subtitles stored at {}/{}", storage.bucket_name(), keys.transcription);

        self.deps
            .store
            .set_transcription_status(&context.video.id, TranscriptionStatus::Complete)
            .await?;

        Ok(TranscriptionStatus::Complete)
    }

    async fn cleanup_staged(&self, storage: &dyn ObjectStorage, key: &ObjectKey) {
        match storage.delete_object(key).await {
            Ok(()) => debug!("🧹 Removed staged audio {}", key),
            Err(e) => warn!(key = %key, error = %e, "⚠️  Failed to remove staged audio"),
        }
    }

    async fn reset_status(&self, video_id: &VideoId) -> Option<TranscriptionStatus> {
        match self
            .deps
            .store
            .set_transcription_status(video_id, TranscriptionStatus::Unset)
            .await
        {
            Ok(()) => Some(TranscriptionStatus::Unset),
            Err(e) => {
                error!(error = %e, "Failed to reset transcription status");
                self.deps.store.transcription_status(video_id).await.ok()
            }
        }
    }

    async fn spawn_generation(&self, video_id: &VideoId, user_id: &str) {
        let trigger = Arc::clone(&self.deps.generation);
        let video_id = video_id.clone();
        let user_id = user_id.to_string();

        let task = async move {
            if let Err(e) = trigger.start_generation(&video_id, &user_id).await {
                warn!(error = %e, "⚠️  AI generation trigger failed");
            }
        }
        .in_current_span();

        let mut background = self.background.lock().await;
        while let Some(finished) = background.try_join_next() {
            if let Err(e) = finished {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        background.spawn(task);
        debug!("Spawned AI generation trigger ({} pending)", background.len());
    }
}

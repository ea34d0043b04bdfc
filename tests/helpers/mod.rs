#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

use vidscribe::audio::{AudioExtractor, ExtractedAudio, ExtractionError};
use vidscribe::config::PipelineConfig;
use vidscribe::generation::{GenerationTrigger, TriggerError};
use vidscribe::storage::{ObjectKey, ObjectStorage, StorageError, StorageResolver};
use vidscribe::transcription::{Transcriber, TranscriptionError};
use vidscribe::video::{StorageBucket, Video, VideoId};
use vidscribe::{JsonVideoStore, PipelineDeps, Transcript, TranscriptionPipeline, Utterance};

pub const USER_ID: &str = "user-1";
pub const VIDEO_ID: &str = "video-1";

/// Object storage kept in a map, with switches for failure injection
#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, (Bytes, String)>>,
    pub fail_deletes: bool,
    pub deletes: AtomicUsize,
}

impl MemoryStorage {
    pub fn with_source(user_id: &str, video_id: &str) -> Self {
        let storage = Self::default();
        storage.insert(&format!("{}/{}/result.mp4", user_id, video_id), b"\x00\x00\x00\x18ftypmp42", "video/mp4");
        storage
    }

    pub fn insert(&self, key: &str, data: &[u8], content_type: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (Bytes::copy_from_slice(data), content_type.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<(Bytes, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).map(|(data, _)| String::from_utf8_lossy(&data).into_owned())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn bucket_name(&self) -> &str {
        "memory"
    }

    async fn signed_url(&self, key: &ObjectKey, _expires_in: Duration) -> Result<Url, StorageError> {
        Url::parse(&format!("https://storage.test/{}", key)).map_err(|e| StorageError::Signing(e.to_string()))
    }

    async fn put_object(&self, key: &ObjectKey, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, key: &ObjectKey) -> Result<(), StorageError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes {
            return Err(StorageError::DeleteFailed(key.to_string()));
        }
        self.objects.lock().unwrap().remove(key.as_str());
        Ok(())
    }

    async fn probe(&self, key: &ObjectKey) -> Result<(), StorageError> {
        if self.contains(key.as_str()) {
            Ok(())
        } else {
            Err(StorageError::NotFound(key.to_string()))
        }
    }
}

/// Resolves every bucket to the same storage and records what was asked for
pub struct FixedResolver {
    pub storage: Arc<MemoryStorage>,
    pub resolved: Mutex<Vec<Option<String>>>,
}

impl FixedResolver {
    pub fn new(storage: Arc<MemoryStorage>) -> Self {
        Self {
            storage,
            resolved: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.resolved.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageResolver for FixedResolver {
    async fn resolve(&self, bucket: Option<&StorageBucket>) -> Result<Arc<dyn ObjectStorage>, StorageError> {
        self.resolved
            .lock()
            .unwrap()
            .push(bucket.map(|b| b.name.clone()));
        Ok(self.storage.clone())
    }
}

pub struct FakeExtractor {
    pub has_audio: bool,
    pub checks: AtomicUsize,
    pub extractions: AtomicUsize,
}

impl FakeExtractor {
    pub fn new(has_audio: bool) -> Self {
        Self {
            has_audio,
            checks: AtomicUsize::new(0),
            extractions: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AudioExtractor for FakeExtractor {
    fn name(&self) -> &str {
        "fake"
    }

    async fn has_audio_track(&self, _video_url: &Url) -> Result<bool, ExtractionError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.has_audio)
    }

    async fn extract(&self, _video_url: &Url) -> Result<ExtractedAudio, ExtractionError> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        Ok(ExtractedAudio {
            data: Bytes::from_static(b"ID3\x04fake-mp3-frames"),
            content_type: "audio/mpeg".to_string(),
        })
    }
}

pub enum TranscriberBehavior {
    Succeed(Transcript),
    FailJob(String),
    TimeOut,
}

pub struct FakeTranscriber {
    pub behavior: TranscriberBehavior,
    pub has_credential: bool,
    pub calls: AtomicUsize,
    pub audio_urls: Mutex<Vec<Url>>,
}

impl FakeTranscriber {
    pub fn new(behavior: TranscriberBehavior) -> Self {
        Self {
            behavior,
            has_credential: true,
            calls: AtomicUsize::new(0),
            audio_urls: Mutex::new(Vec::new()),
        }
    }

    pub fn without_credential(mut self) -> Self {
        self.has_credential = false;
        self
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    fn ensure_ready(&self) -> Result<(), TranscriptionError> {
        if self.has_credential {
            Ok(())
        } else {
            Err(TranscriptionError::MissingCredential)
        }
    }

    async fn transcribe(&self, audio_url: &Url) -> Result<Transcript, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.audio_urls.lock().unwrap().push(audio_url.clone());
        match &self.behavior {
            TranscriberBehavior::Succeed(transcript) => Ok(transcript.clone()),
            TranscriberBehavior::FailJob(message) => Err(TranscriptionError::JobFailed {
                id: "job-1".to_string(),
                message: message.clone(),
            }),
            TranscriberBehavior::TimeOut => Err(TranscriptionError::Timeout {
                id: "job-1".to_string(),
                status: vidscribe::transcription::JobStatus::Processing,
                attempts: 3,
            }),
        }
    }
}

#[derive(Default)]
pub struct RecordingTrigger {
    pub fail: bool,
    pub calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl GenerationTrigger for RecordingTrigger {
    async fn start_generation(&self, video_id: &VideoId, user_id: &str) -> Result<(), TriggerError> {
        self.calls
            .lock()
            .unwrap()
            .push((video_id.to_string(), user_id.to_string()));
        if self.fail {
            return Err(TriggerError::Unreachable("generation service down".to_string()));
        }
        Ok(())
    }
}

pub fn two_speaker_transcript() -> Transcript {
    Transcript {
        id: "job-1".to_string(),
        text: Some("hi bye".to_string()),
        utterances: vec![
            Utterance {
                speaker: "A".to_string(),
                text: "hi".to_string(),
                start_ms: 0,
                end_ms: 1000,
            },
            Utterance {
                speaker: "B".to_string(),
                text: "bye".to_string(),
                start_ms: 1000,
                end_ms: 2500,
            },
        ],
        audio_duration_ms: Some(2500),
    }
}

/// A pipeline over a temporary store and in-memory collaborators
pub struct TestHarness {
    pub store: Arc<JsonVideoStore>,
    pub storage: Arc<MemoryStorage>,
    pub resolver: Arc<FixedResolver>,
    pub extractor: Arc<FakeExtractor>,
    pub transcriber: Arc<FakeTranscriber>,
    pub trigger: Arc<RecordingTrigger>,
    pub pipeline_config: PipelineConfig,
    _state_dir: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_parts(
            MemoryStorage::with_source(USER_ID, VIDEO_ID),
            FakeExtractor::new(true),
            FakeTranscriber::new(TranscriberBehavior::Succeed(two_speaker_transcript())),
            RecordingTrigger::default(),
        )
        .await
    }

    pub async fn with_parts(
        storage: MemoryStorage,
        extractor: FakeExtractor,
        transcriber: FakeTranscriber,
        trigger: RecordingTrigger,
    ) -> Self {
        let state_dir = TempDir::new().unwrap();
        let store = Arc::new(JsonVideoStore::open(state_dir.path().to_path_buf()).await.unwrap());
        store.insert_video(Video::new(VIDEO_ID, USER_ID)).await.unwrap();

        let storage = Arc::new(storage);
        Self {
            store,
            resolver: Arc::new(FixedResolver::new(storage.clone())),
            storage,
            extractor: Arc::new(extractor),
            transcriber: Arc::new(transcriber),
            trigger: Arc::new(trigger),
            pipeline_config: PipelineConfig::default(),
            _state_dir: state_dir,
        }
    }

    pub fn pipeline(&self) -> TranscriptionPipeline {
        let deps = PipelineDeps {
            store: self.store.clone(),
            storage: self.resolver.clone(),
            extractor: self.extractor.clone(),
            transcriber: self.transcriber.clone(),
            generation: self.trigger.clone(),
        };
        TranscriptionPipeline::new(deps, self.pipeline_config.clone())
    }

    pub fn video_id(&self) -> VideoId {
        VideoId::new(VIDEO_ID)
    }

    pub fn staged_key(&self) -> String {
        format!("{}/{}/audio-temp", USER_ID, VIDEO_ID)
    }

    pub fn transcription_key(&self) -> String {
        format!("{}/{}/transcription", USER_ID, VIDEO_ID)
    }
}

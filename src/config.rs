use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the transcription pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Video metadata store
    pub store: StoreConfig,

    /// Object storage buckets
    pub storage: StorageConfig,

    /// Audio extraction settings
    pub audio: AudioConfig,

    /// Transcription provider settings
    pub transcription: TranscriptionConfig,

    /// Downstream AI generation trigger
    pub generation: GenerationConfig,

    /// Orchestration settings
    pub pipeline: PipelineConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding video, organization and bucket records
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub provider: StorageProvider,

    /// Bucket used for videos without an assigned bucket
    pub default_bucket: String,

    /// Root directory for the local provider; each bucket is a subdirectory
    pub local_root: PathBuf,

    /// Public URL prefix for local buckets, so remote services can fetch objects
    pub public_base_url: Option<String>,

    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,

    pub access_key_id: Option<String>,

    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Remote media service; when set it replaces local ffmpeg extraction
    pub media_server_url: Option<String>,

    /// Bearer secret sent to the media service
    pub media_server_secret: Option<String>,

    pub ffmpeg_path: String,

    pub ffprobe_path: String,

    /// Target sample rate for transcription
    pub target_sample_rate: u32,

    pub channels: u32,

    /// Target audio format
    pub target_format: String,

    /// Upper bound for one local extraction (seconds)
    pub extraction_timeout_secs: u64,

    /// Directory for extraction scratch files; system temp dir when unset
    pub temp_dir: Option<PathBuf>,

    /// Request timeout for media service calls (seconds)
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// API key for the transcription provider
    pub api_key: Option<String>,

    /// API base URL of the transcription provider
    pub base_url: String,

    /// Request speaker-separated utterances
    pub speaker_labels: bool,

    /// Language hint; provider auto-detects when unset
    pub language_code: Option<String>,

    /// Delay between job status polls (seconds)
    pub poll_interval_secs: u64,

    /// Polls before giving up on a job
    pub max_poll_attempts: u32,

    /// Timeout for a single provider request (seconds)
    pub request_timeout_secs: u64,

    /// Cue length used when the provider returns text without timings
    pub fallback_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Webhook that starts AI generation for a video; disabled when unset
    pub endpoint: Option<String>,

    pub secret: Option<String>,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the source video object under `{user}/{video}/`
    pub source_object: String,

    /// Lifetime of URLs handed to the extractor and the provider (seconds)
    pub signed_url_ttl_secs: u64,

    /// Age after which a PROCESSING claim may be taken over (seconds)
    pub processing_lease_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level / filter directive
    pub level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./data/state"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            default_bucket: "vidscribe".to_string(),
            local_root: PathBuf::from("./data/objects"),
            public_base_url: None,
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            media_server_url: None,
            media_server_secret: None,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            target_sample_rate: 16000, // Plenty for speech
            channels: 1,
            target_format: "mp3".to_string(),
            extraction_timeout_secs: 1800,
            temp_dir: None,
            request_timeout_secs: 300,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.assemblyai.com/v2".to_string(),
            speaker_labels: true,
            language_code: None,
            poll_interval_secs: 3,
            max_poll_attempts: 1200, // one hour at the default interval
            request_timeout_secs: 30,
            fallback_window_ms: 10_000,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            secret: None,
            timeout_secs: 30,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_object: "result.mp4".to_string(),
            signed_url_ttl_secs: 3600,
            processing_lease_secs: 7200,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AudioConfig {
    /// MIME type of the extracted audio
    pub fn content_type(&self) -> &'static str {
        match self.target_format.as_str() {
            "mp3" => "audio/mpeg",
            "wav" => "audio/wav",
            "ogg" | "opus" => "audio/ogg",
            "m4a" | "aac" => "audio/mp4",
            "flac" => "audio/flac",
            _ => "application/octet-stream",
        }
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }
}

impl TranscriptionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl PipelineConfig {
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }

    pub fn processing_lease(&self) -> Duration {
        Duration::from_secs(self.processing_lease_secs)
    }
}

impl Config {
    /// Load configuration from the first default location that exists.
    ///
    /// `Ok(None)` when no file is present; a file that exists but does not
    /// parse is an error rather than a silent fallback to defaults.
    pub fn load() -> Result<Option<Self>> {
        let config_paths = [
            Path::new("vidscribe.toml"),
            Path::new("config/vidscribe.toml"),
            Path::new("/etc/vidscribe/config.toml"),
        ];
        Self::load_from(&config_paths)
    }

    pub fn load_from(paths: &[&Path]) -> Result<Option<Self>> {
        match paths.iter().find(|path| path.exists()) {
            Some(path) => Self::from_file(path).map(Some),
            None => Ok(None),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&config_str).with_context(|| format!("parsing {}", path.display()))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override values from `VIDSCRIBE_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("VIDSCRIBE_STATE_DIR") {
            self.store.state_dir = PathBuf::from(dir);
        }

        if let Some(provider) = lookup("VIDSCRIBE_STORAGE_PROVIDER") {
            match provider.to_lowercase().as_str() {
                "local" => self.storage.provider = StorageProvider::Local,
                "s3" => self.storage.provider = StorageProvider::S3,
                other => tracing::warn!("Ignoring unknown storage provider: {}", other),
            }
        }
        if let Some(bucket) = lookup("VIDSCRIBE_DEFAULT_BUCKET") {
            self.storage.default_bucket = bucket;
        }
        if let Some(root) = lookup("VIDSCRIBE_STORAGE_ROOT") {
            self.storage.local_root = PathBuf::from(root);
        }
        if let Some(base) = lookup("VIDSCRIBE_PUBLIC_BASE_URL") {
            self.storage.public_base_url = Some(base);
        }
        if let Some(region) = lookup("VIDSCRIBE_S3_REGION") {
            self.storage.region = Some(region);
        }
        if let Some(endpoint) = lookup("VIDSCRIBE_S3_ENDPOINT") {
            self.storage.endpoint = Some(endpoint);
        }
        if let Some(key_id) = lookup("VIDSCRIBE_S3_ACCESS_KEY_ID") {
            self.storage.access_key_id = Some(key_id);
        }
        if let Some(secret) = lookup("VIDSCRIBE_S3_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Some(secret);
        }

        if let Some(url) = lookup("VIDSCRIBE_MEDIA_SERVER_URL") {
            self.audio.media_server_url = Some(url);
        }
        if let Some(secret) = lookup("VIDSCRIBE_MEDIA_SERVER_SECRET") {
            self.audio.media_server_secret = Some(secret);
        }

        if let Some(api_key) =
            lookup("VIDSCRIBE_TRANSCRIPTION_API_KEY").or_else(|| lookup("ASSEMBLYAI_API_KEY"))
        {
            self.transcription.api_key = Some(api_key);
        }
        if let Some(base_url) = lookup("VIDSCRIBE_TRANSCRIPTION_BASE_URL") {
            self.transcription.base_url = base_url;
        }

        if let Some(endpoint) = lookup("VIDSCRIBE_GENERATION_ENDPOINT") {
            self.generation.endpoint = Some(endpoint);
        }
        if let Some(secret) = lookup("VIDSCRIBE_GENERATION_SECRET") {
            self.generation.secret = Some(secret);
        }

        if let Some(level) = lookup("VIDSCRIBE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.transcription.poll_interval_secs == 0 {
            return Err(anyhow!("transcription.poll_interval_secs must be greater than 0"));
        }
        if self.transcription.max_poll_attempts == 0 {
            return Err(anyhow!("transcription.max_poll_attempts must be greater than 0"));
        }
        url::Url::parse(&self.transcription.base_url)
            .with_context(|| format!("invalid transcription.base_url: {}", self.transcription.base_url))?;

        if self.audio.target_sample_rate == 0 {
            return Err(anyhow!("audio.target_sample_rate must be greater than 0"));
        }
        if let Some(url) = &self.audio.media_server_url {
            url::Url::parse(url).with_context(|| format!("invalid audio.media_server_url: {}", url))?;
        }

        if let Some(endpoint) = &self.generation.endpoint {
            url::Url::parse(endpoint)
                .with_context(|| format!("invalid generation.endpoint: {}", endpoint))?;
        }

        if self.storage.default_bucket.trim().is_empty() {
            return Err(anyhow!("storage.default_bucket must not be empty"));
        }
        if self.storage.provider == StorageProvider::S3
            && self.storage.region.is_none()
            && self.storage.endpoint.is_none()
        {
            return Err(anyhow!("S3 storage requires storage.region or storage.endpoint"));
        }

        // Remote services cannot fetch file:// URLs
        let needs_fetchable_urls =
            self.transcription.api_key.is_some() || self.audio.media_server_url.is_some();
        if self.storage.provider == StorageProvider::Local
            && self.storage.public_base_url.is_none()
            && needs_fetchable_urls
        {
            return Err(anyhow!(
                "local storage needs storage.public_base_url when a transcription provider or media service is configured"
            ));
        }
        if let Some(base) = &self.storage.public_base_url {
            url::Url::parse(base).with_context(|| format!("invalid storage.public_base_url: {}", base))?;
        }

        if self.pipeline.source_object.contains('/') {
            return Err(anyhow!("pipeline.source_object must be a single path segment"));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "vidscribe configuration:\n\
            - State directory: {}\n\
            - Storage: {:?} (default bucket {})\n\
            - Audio extraction: {}\n\
            - Transcription provider: {} (key {})\n\
            - Poll policy: every {}s, at most {} attempts\n\
            - AI generation trigger: {}",
            self.store.state_dir.display(),
            self.storage.provider,
            self.storage.default_bucket,
            match &self.audio.media_server_url {
                Some(url) => format!("media service at {}", url),
                None => format!("local {}", self.audio.ffmpeg_path),
            },
            self.transcription.base_url,
            if self.transcription.api_key.is_some() { "set" } else { "missing" },
            self.transcription.poll_interval_secs,
            self.transcription.max_poll_attempts,
            self.generation.endpoint.as_deref().unwrap_or("disabled"),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_state_dir(mut self, dir: PathBuf) -> Self {
        self.config.store.state_dir = dir;
        self
    }

    pub fn with_storage_root(mut self, root: PathBuf) -> Self {
        self.config.storage.local_root = root;
        self
    }

    pub fn with_default_bucket(mut self, bucket: &str) -> Self {
        self.config.storage.default_bucket = bucket.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.transcription.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_transcription_base_url(mut self, base_url: &str) -> Self {
        self.config.transcription.base_url = base_url.to_string();
        self
    }

    pub fn with_media_server(mut self, url: &str) -> Self {
        self.config.audio.media_server_url = Some(url.to_string());
        self
    }

    pub fn with_poll_policy(mut self, interval_secs: u64, max_attempts: u32) -> Self {
        self.config.transcription.poll_interval_secs = interval_secs;
        self.config.transcription.max_poll_attempts = max_attempts;
        self
    }

    pub fn with_generation_endpoint(mut self, endpoint: &str) -> Self {
        self.config.generation.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

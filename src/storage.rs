use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as StorePath;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{StorageConfig, StorageProvider};
use crate::video::{StorageBucket, VideoId};

pub const STAGED_AUDIO_OBJECT: &str = "audio-temp";
pub const TRANSCRIPTION_OBJECT: &str = "transcription";
pub const SUBTITLE_CONTENT_TYPE: &str = "text/vtt";

/// Key of an object inside a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `{user_id}/{video_id}/{name}`
    pub fn for_video(user_id: &str, video_id: &VideoId, name: &str) -> Self {
        Self(format!("{}/{}/{}", user_id, video_id, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object keys the pipeline touches for one video
#[derive(Debug, Clone)]
pub struct VideoObjectKeys {
    pub source: ObjectKey,
    pub staged_audio: ObjectKey,
    pub transcription: ObjectKey,
}

impl VideoObjectKeys {
    pub fn new(user_id: &str, video_id: &VideoId, source_object: &str) -> Self {
        Self {
            source: ObjectKey::for_video(user_id, video_id, source_object),
            staged_audio: ObjectKey::for_video(user_id, video_id, STAGED_AUDIO_OBJECT),
            transcription: ObjectKey::for_video(user_id, video_id, TRANSCRIPTION_OBJECT),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object unreachable: {0}")]
    Unreachable(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    #[error("url signing failed: {0}")]
    Signing(String),

    #[error("storage configuration error: {0}")]
    Configuration(String),
}

/// Access to one storage bucket
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn bucket_name(&self) -> &str;

    /// URL an external service can fetch the object from
    async fn signed_url(&self, key: &ObjectKey, expires_in: Duration) -> Result<Url, StorageError>;

    async fn put_object(&self, key: &ObjectKey, body: Bytes, content_type: &str) -> Result<(), StorageError>;

    async fn delete_object(&self, key: &ObjectKey) -> Result<(), StorageError>;

    /// Minimal range read proving the object exists and is readable
    async fn probe(&self, key: &ObjectKey) -> Result<(), StorageError>;
}

/// Maps a video's bucket assignment to a storage handle
#[async_trait]
pub trait StorageResolver: Send + Sync {
    async fn resolve(&self, bucket: Option<&StorageBucket>) -> Result<Arc<dyn ObjectStorage>, StorageError>;
}

/// How URLs for objects in a bucket are produced
#[derive(Clone)]
pub enum UrlStrategy {
    /// Provider-side presigned GET URLs
    Presigned(Arc<dyn Signer>),
    /// Objects are served publicly under a base URL
    PublicBase(Url),
    /// `file://` URLs into a local directory, only usable by local tools
    LocalPath(PathBuf),
}

/// `ObjectStorage` on top of any `object_store` backend
pub struct BucketStorage {
    name: String,
    inner: Arc<dyn ObjectStore>,
    urls: UrlStrategy,
    /// LocalFileSystem rejects object attributes such as content type
    supports_attributes: bool,
}

impl BucketStorage {
    pub fn new(name: impl Into<String>, inner: Arc<dyn ObjectStore>, urls: UrlStrategy) -> Self {
        Self {
            name: name.into(),
            inner,
            urls,
            supports_attributes: true,
        }
    }

    /// Bucket backed by a directory on local disk
    pub fn local(
        name: impl Into<String>,
        root: PathBuf,
        public_base_url: Option<Url>,
    ) -> Result<Self, StorageError> {
        let name = name.into();
        let bucket_dir = root.join(&name);
        std::fs::create_dir_all(&bucket_dir)
            .map_err(|e| StorageError::Configuration(format!("{}: {}", bucket_dir.display(), e)))?;
        let bucket_dir = std::fs::canonicalize(&bucket_dir)
            .map_err(|e| StorageError::Configuration(format!("{}: {}", bucket_dir.display(), e)))?;
        let fs = LocalFileSystem::new_with_prefix(&bucket_dir)
            .map_err(|e| StorageError::Configuration(e.to_string()))?;

        let urls = match public_base_url {
            Some(base) => UrlStrategy::PublicBase(base),
            None => UrlStrategy::LocalPath(bucket_dir),
        };

        Ok(Self {
            name,
            inner: Arc::new(fs),
            urls,
            supports_attributes: false,
        })
    }

    /// In-process bucket, mostly useful for tests and dry runs
    pub fn in_memory(name: impl Into<String>, public_base_url: Url) -> Self {
        Self::new(name, Arc::new(InMemory::new()), UrlStrategy::PublicBase(public_base_url))
    }

    /// S3 or S3-compatible bucket with presigned URLs
    pub fn s3(
        name: impl Into<String>,
        region: Option<&str>,
        endpoint: Option<&str>,
        config: &StorageConfig,
    ) -> Result<Self, StorageError> {
        let name = name.into();
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&name);

        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"))
                .with_virtual_hosted_style_request(false);
        }
        if let Some(key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        let s3 = Arc::new(
            builder
                .build()
                .map_err(|e| StorageError::Configuration(e.to_string()))?,
        );

        Ok(Self::new(name, s3.clone(), UrlStrategy::Presigned(s3)))
    }

    fn store_path(key: &ObjectKey) -> StorePath {
        StorePath::from(key.as_str())
    }
}

fn classify(key: &ObjectKey, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound(key.to_string()),
        other => StorageError::Unreachable(format!("{}: {}", key, other)),
    }
}

#[async_trait]
impl ObjectStorage for BucketStorage {
    fn bucket_name(&self) -> &str {
        &self.name
    }

    async fn signed_url(&self, key: &ObjectKey, expires_in: Duration) -> Result<Url, StorageError> {
        match &self.urls {
            UrlStrategy::Presigned(signer) => signer
                .signed_url(reqwest::Method::GET, &Self::store_path(key), expires_in)
                .await
                .map_err(|e| StorageError::Signing(e.to_string())),
            UrlStrategy::PublicBase(base) => {
                let encoded: Vec<String> = key
                    .as_str()
                    .split('/')
                    .map(|segment| urlencoding::encode(segment).into_owned())
                    .collect();
                let mut joined = base.as_str().trim_end_matches('/').to_string();
                joined.push('/');
                joined.push_str(&encoded.join("/"));
                Url::parse(&joined).map_err(|e| StorageError::Signing(e.to_string()))
            }
            UrlStrategy::LocalPath(dir) => Url::from_file_path(dir.join(key.as_str()))
                .map_err(|_| StorageError::Signing(format!("not an absolute path: {}", dir.display()))),
        }
    }

    async fn put_object(&self, key: &ObjectKey, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        let size = body.len();
        let mut opts = PutOptions::default();
        if self.supports_attributes {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            opts.attributes = attributes;
        }

        self.inner
            .put_opts(&Self::store_path(key), PutPayload::from(body), opts)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", key, e)))?;

        debug!("⬆️  Stored {} bytes at {}/{} ({})", size, self.name, key, content_type);
        Ok(())
    }

    async fn delete_object(&self, key: &ObjectKey) -> Result<(), StorageError> {
        self.inner
            .delete(&Self::store_path(key))
            .await
            .map_err(|e| StorageError::DeleteFailed(format!("{}: {}", key, e)))
    }

    async fn probe(&self, key: &ObjectKey) -> Result<(), StorageError> {
        self.inner
            .get_range(&Self::store_path(key), 0..1)
            .await
            .map(|_| ())
            .map_err(|e| classify(key, e))
    }
}

/// Builds bucket handles from the storage section of the configuration
pub struct ConfiguredStorageResolver {
    config: StorageConfig,
}

impl ConfiguredStorageResolver {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StorageResolver for ConfiguredStorageResolver {
    async fn resolve(&self, bucket: Option<&StorageBucket>) -> Result<Arc<dyn ObjectStorage>, StorageError> {
        let name = bucket
            .map(|b| b.name.clone())
            .unwrap_or_else(|| self.config.default_bucket.clone());

        let storage: Arc<dyn ObjectStorage> = match self.config.provider {
            StorageProvider::Local => {
                let public_base = self
                    .config
                    .public_base_url
                    .as_deref()
                    .map(|base| Url::parse(&format!("{}/{}", base.trim_end_matches('/'), name)))
                    .transpose()
                    .map_err(|e| StorageError::Configuration(format!("public_base_url: {}", e)))?;
                Arc::new(BucketStorage::local(name, self.config.local_root.clone(), public_base)?)
            }
            StorageProvider::S3 => {
                let region = bucket
                    .and_then(|b| b.region.as_deref())
                    .or(self.config.region.as_deref());
                let endpoint = bucket
                    .and_then(|b| b.endpoint.as_deref())
                    .or(self.config.endpoint.as_deref());
                Arc::new(BucketStorage::s3(name, region, endpoint, &self.config)?)
            }
        };

        debug!("🪣 Resolved storage bucket {}", storage.bucket_name());
        Ok(storage)
    }
}

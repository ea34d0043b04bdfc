use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{AudioExtractor, ExtractedAudio, ExtractionError};

const DEFAULT_AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoRequest<'a> {
    video_url: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckResponse {
    has_audio: bool,
}

/// Extraction delegated to a media service over HTTP
pub struct MediaServiceExtractor {
    client: Client,
    base_url: Url,
    secret: Option<String>,
}

impl MediaServiceExtractor {
    pub fn new(base_url: Url, secret: Option<String>, timeout: Duration) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            secret,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn post(&self, path: &str, video_url: &Url) -> RequestBuilder {
        let request = self.client.post(self.endpoint(path)).json(&VideoRequest {
            video_url: video_url.as_str(),
        });

        match &self.secret {
            Some(secret) => request.bearer_auth(secret),
            None => request,
        }
    }

    async fn send(&self, path: &str, video_url: &Url) -> Result<reqwest::Response, ExtractionError> {
        let response = self
            .post(path, video_url)
            .send()
            .await
            .map_err(|e| ExtractionError::Unreachable(format!("{}: {}", self.endpoint(path), e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Service {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl AudioExtractor for MediaServiceExtractor {
    fn name(&self) -> &str {
        "media-service"
    }

    async fn has_audio_track(&self, video_url: &Url) -> Result<bool, ExtractionError> {
        let response = self.send("audio/check", video_url).await?;
        let check: CheckResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::InvalidResponse(format!("audio check: {}", e)))?;

        debug!("Media service reports has_audio={}", check.has_audio);
        Ok(check.has_audio)
    }

    async fn extract(&self, video_url: &Url) -> Result<ExtractedAudio, ExtractionError> {
        info!("🌐 Requesting audio from media service");

        let response = self.send("audio/extract", video_url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| value.starts_with("audio/"))
            .unwrap_or(DEFAULT_AUDIO_CONTENT_TYPE)
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| ExtractionError::Unreachable(format!("reading audio body: {}", e)))?;

        if data.is_empty() {
            return Err(ExtractionError::InvalidResponse("empty audio payload".to_string()));
        }

        info!("✅ Received {} bytes of audio ({})", data.len(), content_type);
        Ok(ExtractedAudio { data, content_type })
    }
}

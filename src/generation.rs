use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::video::VideoId;

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("generation endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("generation endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Follow-on AI generation for a transcribed video
#[async_trait]
pub trait GenerationTrigger: Send + Sync {
    async fn start_generation(&self, video_id: &VideoId, user_id: &str) -> Result<(), TriggerError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationRequest<'a> {
    video_id: &'a str,
    user_id: &'a str,
}

/// Posts `{"videoId","userId"}` to a webhook
pub struct HttpGenerationTrigger {
    client: Client,
    endpoint: String,
    secret: Option<String>,
}

impl HttpGenerationTrigger {
    pub fn new(endpoint: impl Into<String>, secret: Option<String>, timeout: Duration) -> Result<Self, TriggerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TriggerError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            secret,
        })
    }
}

#[async_trait]
impl GenerationTrigger for HttpGenerationTrigger {
    async fn start_generation(&self, video_id: &VideoId, user_id: &str) -> Result<(), TriggerError> {
        let mut request = self.client.post(&self.endpoint).json(&GenerationRequest {
            video_id: video_id.as_str(),
            user_id,
        });
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TriggerError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TriggerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("🤖 AI generation started for video {}", video_id);
        Ok(())
    }
}

/// Used when no generation endpoint is configured
pub struct NoopGenerationTrigger;

#[async_trait]
impl GenerationTrigger for NoopGenerationTrigger {
    async fn start_generation(&self, video_id: &VideoId, _user_id: &str) -> Result<(), TriggerError> {
        debug!("No generation endpoint configured, skipping AI generation for {}", video_id);
        Ok(())
    }
}

pub fn create_trigger(config: &GenerationConfig) -> Result<Arc<dyn GenerationTrigger>, TriggerError> {
    match &config.endpoint {
        Some(endpoint) => Ok(Arc::new(HttpGenerationTrigger::new(
            endpoint.clone(),
            config.secret.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(NoopGenerationTrigger)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_trigger_succeeds() {
        let trigger = create_trigger(&GenerationConfig::default()).unwrap();
        assert!(trigger
            .start_generation(&VideoId::new("v1"), "u1")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let trigger = HttpGenerationTrigger::new(
            "http://127.0.0.1:9/generate",
            None,
            Duration::from_secs(2),
        )
        .unwrap();

        let result = trigger.start_generation(&VideoId::new("v1"), "u1").await;
        assert!(matches!(result, Err(TriggerError::Unreachable(_))));
    }
}

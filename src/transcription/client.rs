use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{Transcript, Utterance};
use crate::config::TranscriptionConfig;

/// Label given to the single utterance built from untimed text
const FALLBACK_SPEAKER: &str = "A";

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("transcription API key is not configured")]
    MissingCredential,

    #[error("transcription provider unreachable: {0}")]
    Unreachable(String),

    #[error("transcript submission failed ({status}): {body}")]
    Submission { status: u16, body: String },

    #[error("transcript poll failed ({status}): {body}")]
    Poll { status: u16, body: String },

    #[error("transcription job {id} failed: {message}")]
    JobFailed { id: String, message: String },

    #[error("transcription job {id} still {status} after {attempts} polls")]
    Timeout {
        id: String,
        status: JobStatus,
        attempts: u32,
    },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Provider-side job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long to wait for a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn from_config(config: &TranscriptionConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
        }
    }

    /// Longest time a job is waited for
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&TranscriptionConfig::default())
    }
}

/// Speech-to-text provider
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Fail early when the provider cannot be used at all
    fn ensure_ready(&self) -> Result<(), TranscriptionError>;

    /// Transcribe the audio at a URL the provider can fetch
    async fn transcribe(&self, audio_url: &Url) -> Result<Transcript, TranscriptionError>;
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    speaker_labels: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
struct WireUtterance {
    #[serde(default)]
    speaker: Option<String>,
    text: String,
    start: u64,
    end: u64,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: JobStatus,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    utterances: Option<Vec<WireUtterance>>,
    /// Seconds
    #[serde(default)]
    audio_duration: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for AssemblyAI-compatible transcript APIs
pub struct AssemblyAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    speaker_labels: bool,
    language_code: Option<String>,
    policy: PollPolicy,
    fallback_window_ms: u64,
}

impl AssemblyAiClient {
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self, TranscriptionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TranscriptionError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            speaker_labels: config.speaker_labels,
            language_code: config.language_code.clone(),
            policy: PollPolicy::from_config(config),
            fallback_window_ms: config.fallback_window_ms,
        })
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    fn api_key(&self) -> Result<&str, TranscriptionError> {
        self.api_key.as_deref().ok_or(TranscriptionError::MissingCredential)
    }

    async fn submit(&self, audio_url: &Url) -> Result<SubmitResponse, TranscriptionError> {
        let request = SubmitRequest {
            audio_url: audio_url.as_str(),
            speaker_labels: self.speaker_labels,
            language_code: self.language_code.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/transcript", self.base_url))
            .header(AUTHORIZATION, self.api_key()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| TranscriptionError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Submission {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| TranscriptionError::InvalidResponse(format!("submit: {}", e)))
    }

    async fn fetch(&self, job_id: &str) -> Result<TranscriptResponse, TranscriptionError> {
        let response = self
            .client
            .get(format!("{}/transcript/{}", self.base_url, job_id))
            .header(AUTHORIZATION, self.api_key()?)
            .send()
            .await
            .map_err(|e| TranscriptionError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Poll {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| TranscriptionError::InvalidResponse(format!("poll: {}", e)))
    }

    fn into_transcript(&self, response: TranscriptResponse) -> Transcript {
        let audio_duration_ms = response
            .audio_duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| (secs * 1000.0).round() as u64);

        let mut utterances: Vec<Utterance> = response
            .utterances
            .unwrap_or_default()
            .into_iter()
            .map(|u| Utterance {
                speaker: u.speaker.unwrap_or_else(|| FALLBACK_SPEAKER.to_string()),
                text: u.text,
                start_ms: u.start,
                end_ms: u.end,
            })
            .collect();

        // Text without timings becomes one utterance over the whole audio
        if utterances.is_empty() {
            if let Some(text) = response.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                utterances.push(Utterance {
                    speaker: FALLBACK_SPEAKER.to_string(),
                    text: text.to_string(),
                    start_ms: 0,
                    end_ms: audio_duration_ms.unwrap_or(self.fallback_window_ms),
                });
            }
        }

        Transcript {
            id: response.id,
            text: response.text,
            utterances,
            audio_duration_ms,
        }
    }
}

#[async_trait]
impl Transcriber for AssemblyAiClient {
    fn ensure_ready(&self) -> Result<(), TranscriptionError> {
        self.api_key().map(|_| ())
    }

    async fn transcribe(&self, audio_url: &Url) -> Result<Transcript, TranscriptionError> {
        let job = self.submit(audio_url).await?;
        info!("📤 Submitted transcription job {} ({})", job.id, job.status);

        let mut last_status = job.status;
        for attempt in 1..=self.policy.max_attempts {
            let response = self.fetch(&job.id).await?;
            debug!("Job {} poll {}: {}", job.id, attempt, response.status);

            match response.status {
                JobStatus::Completed => {
                    let transcript = self.into_transcript(response);
                    info!(
                        "✅ Transcription completed: {} utterances, {} speakers",
                        transcript.utterances.len(),
                        transcript.speakers().len()
                    );
                    return Ok(transcript);
                }
                JobStatus::Error => {
                    return Err(TranscriptionError::JobFailed {
                        id: response.id,
                        message: response.error.unwrap_or_else(|| "unknown error".to_string()),
                    });
                }
                status => last_status = status,
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        Err(TranscriptionError::Timeout {
            id: job.id,
            status: last_status,
            attempts: self.policy.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AssemblyAiClient {
        let config = TranscriptionConfig {
            api_key: Some("test-key".to_string()),
            ..TranscriptionConfig::default()
        };
        AssemblyAiClient::from_config(&config).unwrap()
    }

    fn response(json: &str) -> TranscriptResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_missing_credential() {
        let client = AssemblyAiClient::from_config(&TranscriptionConfig::default()).unwrap();
        assert!(matches!(client.ensure_ready(), Err(TranscriptionError::MissingCredential)));

        let blank = TranscriptionConfig {
            api_key: Some("  ".to_string()),
            ..TranscriptionConfig::default()
        };
        let client = AssemblyAiClient::from_config(&blank).unwrap();
        assert!(client.ensure_ready().is_err());
    }

    #[test]
    fn test_utterances_are_mapped() {
        let transcript = client().into_transcript(response(
            r#"{"id":"t1","status":"completed","text":"hi bye",
                "utterances":[{"speaker":"A","text":"hi","start":0,"end":1000},
                              {"speaker":"B","text":"bye","start":1000,"end":2500}]}"#,
        ));

        assert_eq!(transcript.utterances.len(), 2);
        assert_eq!(transcript.utterances[1].speaker, "B");
        assert_eq!(transcript.utterances[1].end_ms, 2500);
        assert_eq!(transcript.speakers(), vec!["A", "B"]);
    }

    #[test]
    fn test_plain_text_spans_audio_duration() {
        let transcript = client().into_transcript(response(
            r#"{"id":"t2","status":"completed","text":"just words","audio_duration":42.5}"#,
        ));

        assert_eq!(transcript.utterances.len(), 1);
        assert_eq!(transcript.utterances[0].speaker, "A");
        assert_eq!(transcript.utterances[0].end_ms, 42_500);
    }

    #[test]
    fn test_plain_text_without_duration_uses_default_window() {
        let transcript = client().into_transcript(response(
            r#"{"id":"t3","status":"completed","text":"just words","utterances":null}"#,
        ));
        assert_eq!(transcript.utterances[0].end_ms, 10_000);
    }

    #[test]
    fn test_empty_result() {
        let transcript = client().into_transcript(response(
            r#"{"id":"t4","status":"completed","text":"","utterances":[]}"#,
        ));
        assert!(transcript.utterances.is_empty());
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_poll_policy_budget() {
        let policy = PollPolicy {
            interval: Duration::from_secs(3),
            max_attempts: 1200,
        };
        assert_eq!(policy.budget(), Duration::from_secs(3600));
        assert_eq!(PollPolicy::default(), policy);
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert_eq!(JobStatus::Processing.to_string(), "processing");
    }
}

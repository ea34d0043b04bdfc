use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

use vidscribe::config::TranscriptionConfig;
use vidscribe::transcription::{AssemblyAiClient, JobStatus, PollPolicy, Transcriber, TranscriptionError};

/// Scripted provider: submit answers with `submit`, polls pop `polls` (the last one repeats)
struct MockProvider {
    submit: (u16, String),
    polls: Mutex<VecDeque<String>>,
    poll_count: Mutex<u32>,
    seen_auth: Mutex<Option<String>>,
    seen_submit: Mutex<Option<serde_json::Value>>,
}

impl MockProvider {
    fn new(submit: (u16, &str), polls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            submit: (submit.0, submit.1.to_string()),
            polls: Mutex::new(polls.iter().map(|p| p.to_string()).collect()),
            poll_count: Mutex::new(0),
            seen_auth: Mutex::new(None),
            seen_submit: Mutex::new(None),
        })
    }
}

async fn submit_handler(
    State(provider): State<Arc<MockProvider>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    *provider.seen_auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *provider.seen_submit.lock().unwrap() = Some(body);

    let status = StatusCode::from_u16(provider.submit.0).unwrap();
    (status, provider.submit.1.clone()).into_response()
}

async fn poll_handler(State(provider): State<Arc<MockProvider>>) -> impl IntoResponse {
    *provider.poll_count.lock().unwrap() += 1;
    let mut polls = provider.polls.lock().unwrap();
    let body = if polls.len() > 1 {
        polls.pop_front().unwrap_or_default()
    } else {
        polls.front().cloned().unwrap_or_default()
    };
    (StatusCode::OK, body).into_response()
}

async fn start_mock_provider_server(provider: Arc<MockProvider>) -> (String, oneshot::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = Router::new()
        .route("/v2/transcript", post(submit_handler))
        .route("/v2/transcript/:id", get(poll_handler))
        .with_state(provider);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}/v2", addr);

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .ok();
    });

    (base_url, shutdown_tx)
}

fn client(base_url: &str, max_attempts: u32) -> AssemblyAiClient {
    let config = TranscriptionConfig {
        api_key: Some("test-key".to_string()),
        base_url: base_url.to_string(),
        ..TranscriptionConfig::default()
    };
    AssemblyAiClient::from_config(&config)
        .unwrap()
        .with_poll_policy(PollPolicy {
            interval: Duration::from_millis(10),
            max_attempts,
        })
}

fn audio_url() -> Url {
    Url::parse("https://storage.test/user-1/video-1/audio-temp").unwrap()
}

const SUBMITTED: &str = r#"{"id":"job-42","status":"queued"}"#;

#[tokio::test]
async fn given_job_completes_after_processing_when_transcribing_then_returns_utterances() {
    let provider = MockProvider::new(
        (200, SUBMITTED),
        &[
            r#"{"id":"job-42","status":"queued"}"#,
            r#"{"id":"job-42","status":"processing"}"#,
            r#"{"id":"job-42","status":"completed","text":"hi bye","audio_duration":3,
                "utterances":[{"speaker":"A","text":"hi","start":0,"end":1000},
                              {"speaker":"B","text":"bye","start":1000,"end":2500}]}"#,
        ],
    );
    let (base_url, shutdown_tx) = start_mock_provider_server(provider.clone()).await;

    let transcript = client(&base_url, 10).transcribe(&audio_url()).await.unwrap();

    assert_eq!(transcript.id, "job-42");
    assert_eq!(transcript.utterances.len(), 2);
    assert_eq!(transcript.utterances[0].text, "hi");
    assert_eq!(transcript.utterances[1].speaker, "B");
    assert_eq!(transcript.audio_duration_ms, Some(3000));
    assert_eq!(*provider.poll_count.lock().unwrap(), 3);

    assert_eq!(provider.seen_auth.lock().unwrap().as_deref(), Some("test-key"));
    let submitted = provider.seen_submit.lock().unwrap().clone().unwrap();
    assert_eq!(submitted["audio_url"], "https://storage.test/user-1/video-1/audio-temp");
    assert_eq!(submitted["speaker_labels"], true);
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_job_ends_in_error_when_transcribing_then_returns_job_failed() {
    let provider = MockProvider::new(
        (200, SUBMITTED),
        &[r#"{"id":"job-42","status":"error","error":"Audio file is too short"}"#],
    );
    let (base_url, shutdown_tx) = start_mock_provider_server(provider).await;

    let result = client(&base_url, 10).transcribe(&audio_url()).await;

    match result {
        Err(TranscriptionError::JobFailed { id, message }) => {
            assert_eq!(id, "job-42");
            assert_eq!(message, "Audio file is too short");
        }
        other => panic!("expected job failure, got {:?}", other.map(|t| t.id)),
    }
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_job_never_finishes_when_transcribing_then_times_out_after_max_attempts() {
    let provider = MockProvider::new((200, SUBMITTED), &[r#"{"id":"job-42","status":"processing"}"#]);
    let (base_url, shutdown_tx) = start_mock_provider_server(provider.clone()).await;

    let result = client(&base_url, 3).transcribe(&audio_url()).await;

    assert!(matches!(
        result,
        Err(TranscriptionError::Timeout {
            status: JobStatus::Processing,
            attempts: 3,
            ..
        })
    ));
    assert_eq!(*provider.poll_count.lock().unwrap(), 3);
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_submission_rejected_when_transcribing_then_returns_submission_error() {
    let provider = MockProvider::new((401, r#"{"error":"Authentication error"}"#), &[]);
    let (base_url, shutdown_tx) = start_mock_provider_server(provider.clone()).await;

    let result = client(&base_url, 3).transcribe(&audio_url()).await;

    match result {
        Err(TranscriptionError::Submission { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("Authentication error"));
        }
        other => panic!("expected submission error, got {:?}", other.map(|t| t.id)),
    }
    assert_eq!(*provider.poll_count.lock().unwrap(), 0);
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_text_without_utterances_when_transcribing_then_returns_single_utterance() {
    let provider = MockProvider::new(
        (200, SUBMITTED),
        &[r#"{"id":"job-42","status":"completed","text":"one long monologue","audio_duration":61.2}"#],
    );
    let (base_url, shutdown_tx) = start_mock_provider_server(provider).await;

    let transcript = client(&base_url, 3).transcribe(&audio_url()).await.unwrap();

    assert_eq!(transcript.utterances.len(), 1);
    assert_eq!(transcript.utterances[0].speaker, "A");
    assert_eq!(transcript.utterances[0].start_ms, 0);
    assert_eq!(transcript.utterances[0].end_ms, 61_200);
    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn given_provider_not_listening_when_transcribing_then_returns_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = client(&format!("http://{}/v2", addr), 3)
        .transcribe(&audio_url())
        .await;

    assert!(matches!(result, Err(TranscriptionError::Unreachable(_))));
}

#[tokio::test]
async fn given_no_api_key_when_transcribing_then_fails_without_request() {
    let config = TranscriptionConfig {
        base_url: "http://127.0.0.1:9/v2".to_string(),
        ..TranscriptionConfig::default()
    };
    let client = AssemblyAiClient::from_config(&config).unwrap();

    let result = client.transcribe(&audio_url()).await;

    assert!(matches!(result, Err(TranscriptionError::MissingCredential)));
}

pub mod client;
pub mod vtt;

pub use client::{AssemblyAiClient, JobStatus, PollPolicy, Transcriber, TranscriptionError};
pub use vtt::{format_timestamp, format_transcript, VttCue, VttParseError};

use serde::{Deserialize, Serialize};

/// A stretch of speech attributed to one speaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    /// Provider speaker label, e.g. "A"
    pub speaker: String,
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Result of a finished transcription job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    /// Provider job id
    pub id: String,
    /// Full plain text, when the provider returned it
    pub text: Option<String>,
    /// Speaker-separated utterances in playback order
    pub utterances: Vec<Utterance>,
    pub audio_duration_ms: Option<u64>,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
            && self.text.as_deref().map(str::trim).unwrap_or_default().is_empty()
    }

    /// Distinct speaker labels in order of first appearance
    pub fn speakers(&self) -> Vec<&str> {
        let mut speakers: Vec<&str> = Vec::new();
        for utterance in &self.utterances {
            if !speakers.contains(&utterance.speaker.as_str()) {
                speakers.push(&utterance.speaker);
            }
        }
        speakers
    }
}

//! WebVTT subtitle rendering with speaker voice tags

use regex::Regex;
use std::fmt;

use super::{Transcript, Utterance};

/// End of the single cue written when there is nothing to time
pub const EMPTY_CUE_END_MS: u64 = 10_000;

const HEADER: &str = "WEBVTT";
const TIMING_PATTERN: &str =
    r"^(\d{2,}):(\d{2}):(\d{2})\.(\d{3}) --> (\d{2,}):(\d{2}):(\d{2})\.(\d{3})";
const VOICE_PATTERN: &str = r"(?s)^<v Speaker ([^>]*)>(.*)$";

#[derive(Debug, thiserror::Error)]
pub enum VttParseError {
    #[error("missing WEBVTT header")]
    MissingHeader,

    #[error("invalid cue timing: {0}")]
    InvalidTiming(String),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// One subtitle cue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VttCue {
    pub start_ms: u64,
    pub end_ms: u64,
    /// Speaker label from the `<v Speaker X>` tag, if any
    pub speaker: Option<String>,
    pub text: String,
}

impl VttCue {
    pub fn from_utterance(utterance: &Utterance) -> Self {
        Self {
            start_ms: utterance.start_ms,
            end_ms: utterance.end_ms,
            speaker: Some(utterance.speaker.clone()),
            text: utterance.text.clone(),
        }
    }
}

impl fmt::Display for VttCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} --> {}",
            format_timestamp(self.start_ms),
            format_timestamp(self.end_ms)
        )?;
        let text = escape_cue_text(&self.text);
        match &self.speaker {
            Some(speaker) => writeln!(f, "<v Speaker {}>{}", speaker, text),
            None => writeln!(f, "{}", text),
        }
    }
}

/// Cue payload safe to embed: blank lines dropped, markup characters escaped.
///
/// A blank line would end the cue and a literal `-->` would read as a timing
/// line, so neither may survive into the document.
fn escape_cue_text(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_cue_text(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// `HH:MM:SS.mmm`; hours grow past two digits when needed
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1000) % 60;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Render utterances as a WebVTT document.
///
/// With no utterances a single ten second cue holds `fallback_text`.
pub fn format(utterances: &[Utterance], fallback_text: Option<&str>) -> String {
    let cues: Vec<VttCue> = if utterances.is_empty() {
        vec![VttCue {
            start_ms: 0,
            end_ms: EMPTY_CUE_END_MS,
            speaker: None,
            text: fallback_text.unwrap_or_default().to_string(),
        }]
    } else {
        utterances.iter().map(VttCue::from_utterance).collect()
    };

    let mut vtt = String::from(HEADER);
    vtt.push_str("\n\n");
    for cue in &cues {
        vtt.push_str(&cue.to_string());
        vtt.push('\n');
    }
    vtt
}

pub fn format_transcript(transcript: &Transcript) -> String {
    format(&transcript.utterances, transcript.text.as_deref())
}

fn timestamp_ms(caps: &regex::Captures<'_>, first: usize) -> Option<u64> {
    let part = |i: usize| caps.get(first + i).and_then(|m| m.as_str().parse::<u64>().ok());
    Some(part(0)? * 3_600_000 + part(1)? * 60_000 + part(2)? * 1000 + part(3)?)
}

/// Read cues back out of a WebVTT document produced by [`format`]
pub fn parse(content: &str) -> Result<Vec<VttCue>, VttParseError> {
    let timing = Regex::new(TIMING_PATTERN)?;
    let voice = Regex::new(VOICE_PATTERN)?;

    let normalized = content.replace("\r\n", "\n");
    let mut blocks = normalized.split("\n\n");

    match blocks.next() {
        Some(first) if first.starts_with(HEADER) => {}
        _ => return Err(VttParseError::MissingHeader),
    }

    let mut cues = Vec::new();
    for block in blocks {
        let mut lines = block.lines().skip_while(|line| !line.contains("-->"));
        let Some(timing_line) = lines.next() else {
            continue; // Comments, trailing whitespace
        };

        let caps = timing
            .captures(timing_line)
            .ok_or_else(|| VttParseError::InvalidTiming(timing_line.to_string()))?;
        let start_ms = timestamp_ms(&caps, 1)
            .ok_or_else(|| VttParseError::InvalidTiming(timing_line.to_string()))?;
        let end_ms = timestamp_ms(&caps, 5)
            .ok_or_else(|| VttParseError::InvalidTiming(timing_line.to_string()))?;

        let payload = lines.collect::<Vec<_>>().join("\n");
        let (speaker, text) = match voice.captures(&payload) {
            Some(v) => (Some(v[1].to_string()), unescape_cue_text(&v[2])),
            None => (None, unescape_cue_text(&payload)),
        };

        cues.push(VttCue {
            start_ms,
            end_ms,
            speaker,
            text,
        });
    }

    Ok(cues)
}

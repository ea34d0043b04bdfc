use async_trait::async_trait;
use bytes::Bytes;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use super::{AudioExtractor, ExtractedAudio, ExtractionError};
use crate::config::AudioConfig;

const TEMP_PREFIX: &str = "vidscribe-audio-";

/// Extraction through local `ffprobe` and `ffmpeg` binaries
#[derive(Debug, Clone)]
pub struct LocalExtractor {
    config: AudioConfig,
}

impl LocalExtractor {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    /// Run a tool to completion, killing it when the timeout fires
    async fn run_tool(&self, tool: &str, args: &[String]) -> Result<Output, ExtractionError> {
        debug!("Running {} {}", tool, args.join(" "));

        let child = Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExtractionError::Tool {
                tool: tool.to_string(),
                message: format!("could not start: {}", e),
            })?;

        let timeout = self.config.extraction_timeout();
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ExtractionError::Timeout(timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Tool {
                tool: tool.to_string(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(output)
    }
}

/// ffmpeg input argument; `file://` URLs become plain paths
pub(crate) fn input_arg(url: &Url) -> String {
    if url.scheme() == "file" {
        if let Ok(path) = url.to_file_path() {
            return path.to_string_lossy().into_owned();
        }
    }
    url.to_string()
}

/// Audio codec for the target container
pub(crate) fn codec_for(format: &str) -> &'static str {
    match format {
        "mp3" => "libmp3lame",
        "wav" => "pcm_s16le",
        "flac" => "flac",
        "ogg" | "opus" => "libopus",
        _ => "aac",
    }
}

/// ffmpeg muxer name for the target format
fn muxer_for(format: &str) -> &str {
    match format {
        "m4a" | "aac" => "ipod",
        other => other,
    }
}

/// True when an ffprobe JSON listing contains at least one stream
pub(crate) fn probe_lists_streams(ffprobe_json: &[u8]) -> Result<bool, ExtractionError> {
    let data: serde_json::Value = serde_json::from_slice(ffprobe_json)
        .map_err(|e| ExtractionError::InvalidResponse(format!("ffprobe output: {}", e)))?;

    Ok(data["streams"]
        .as_array()
        .map(|streams| !streams.is_empty())
        .unwrap_or(false))
}

#[async_trait]
impl AudioExtractor for LocalExtractor {
    fn name(&self) -> &str {
        "local"
    }

    async fn has_audio_track(&self, video_url: &Url) -> Result<bool, ExtractionError> {
        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            "-select_streams".to_string(),
            "a".to_string(), // Audio streams only
            input_arg(video_url),
        ];

        let output = self.run_tool(&self.config.ffprobe_path, &args).await?;
        probe_lists_streams(&output.stdout)
    }

    async fn extract(&self, video_url: &Url) -> Result<ExtractedAudio, ExtractionError> {
        let format = self.config.target_format.as_str();

        // Removed when dropped, on every exit path
        let suffix = format!(".{}", format);
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX).suffix(&suffix);
        let temp_file = match &self.config.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        info!("🎵 Extracting audio: {}", video_url);

        let args = vec![
            "-i".to_string(),
            input_arg(video_url),
            "-vn".to_string(), // No video stream
            "-acodec".to_string(),
            codec_for(format).to_string(),
            "-ar".to_string(),
            self.config.target_sample_rate.to_string(),
            "-ac".to_string(),
            self.config.channels.to_string(),
            "-f".to_string(),
            muxer_for(format).to_string(),
            "-y".to_string(), // Overwrite the empty temp file
            temp_file.path().to_string_lossy().into_owned(),
        ];

        self.run_tool(&self.config.ffmpeg_path, &args).await?;

        let data = tokio::fs::read(temp_file.path()).await?;
        if data.is_empty() {
            return Err(ExtractionError::Tool {
                tool: self.config.ffmpeg_path.clone(),
                message: "produced no audio".to_string(),
            });
        }

        info!(
            "✅ Audio extracted: {:.1} MB ({}Hz, {})",
            data.len() as f64 / 1_048_576.0,
            self.config.target_sample_rate,
            format
        );

        Ok(ExtractedAudio {
            data: Bytes::from(data),
            content_type: self.config.content_type().to_string(),
        })
    }
}

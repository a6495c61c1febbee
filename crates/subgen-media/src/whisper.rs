//! Whisper CLI transcriber.
//!
//! Invokes the `whisper` command-line tool with JSON output and parses
//! the segment list. English output uses Whisper's translate task, so a
//! Korean source still yields English subtitles; every other language
//! is a plain transcription pass.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use subgen_models::{LanguageCode, TranscriptSegment};

use crate::error::{MediaError, MediaResult};
use crate::transcribe::Transcriber;

/// Default Whisper model size.
const DEFAULT_MODEL: &str = "medium";

/// Transcriber backed by the `whisper` CLI.
#[derive(Debug, Clone)]
pub struct WhisperCliTranscriber {
    binary: PathBuf,
    model: String,
}

impl WhisperCliTranscriber {
    /// Locate the `whisper` binary on PATH.
    pub fn new() -> MediaResult<Self> {
        let binary = which::which("whisper").map_err(|_| MediaError::WhisperNotFound)?;
        Ok(Self {
            binary,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Use a specific model size (tiny/base/small/medium/large).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Locate the binary and take the model size from `WHISPER_MODEL`.
    pub fn from_env() -> MediaResult<Self> {
        let transcriber = Self::new()?;
        Ok(match std::env::var("WHISPER_MODEL") {
            Ok(model) if !model.trim().is_empty() => transcriber.with_model(model),
            _ => transcriber,
        })
    }

    fn classify_failure(stderr: &str) -> MediaError {
        let lower = stderr.to_lowercase();
        let transient = lower.contains("out of memory")
            || lower.contains("cuda")
            || lower.contains("resource temporarily unavailable")
            || lower.contains("cannot allocate");
        let message = stderr.lines().last().unwrap_or("whisper failed").to_string();
        MediaError::model(message, transient)
    }
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(
        &self,
        audio: &Path,
        language: &LanguageCode,
    ) -> MediaResult<Vec<TranscriptSegment>> {
        let out_dir = std::env::temp_dir().join(format!("subgen-whisper-{}", Uuid::new_v4()));
        fs::create_dir_all(&out_dir).await?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg(audio)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_format")
            .arg("json")
            .arg("--output_dir")
            .arg(&out_dir);

        // English is produced via Whisper's translate task; other
        // targets are direct transcription in that language.
        if language.as_str() == "en" {
            cmd.arg("--task").arg("translate");
        } else {
            cmd.arg("--language").arg(language.as_str());
        }

        debug!(audio = %audio.display(), language = %language, "invoking whisper");
        let output = cmd.output().await?;

        let result = if output.status.success() {
            let stem = audio
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| MediaError::InvalidFilename(audio.display().to_string()))?;
            let json_path = out_dir.join(format!("{}.json", stem));
            let bytes = fs::read(&json_path).await?;
            let parsed: WhisperOutput = serde_json::from_slice(&bytes)?;
            Ok(parsed
                .segments
                .into_iter()
                .map(|s| TranscriptSegment::new(s.start, s.end, s.text))
                .collect())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Self::classify_failure(&stderr))
        };

        if let Err(e) = fs::remove_dir_all(&out_dir).await {
            warn!(dir = %out_dir.display(), "failed to clean whisper output dir: {}", e);
        }
        result
    }
}

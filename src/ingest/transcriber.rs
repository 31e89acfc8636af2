//! Whisper transcription backend.
//!
//! Shells out to ffmpeg (to get 16 kHz mono WAV) and to the whisper.cpp CLI.
//! The model is resolved lazily on first use and downloaded if a model type is
//! configured but the file is missing.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;

/// Substituted whenever transcription fails
pub const SENTINEL_TRANSCRIPT: &str = "[Transcription failed]";

/// Returned when no model could be loaded
pub const MODEL_UNAVAILABLE: &str = "[Transcription unavailable: Whisper model not loaded]";

/// Returned when whisper ran but produced no text
pub const NO_TEXT: &str = "[Transcription failed: no text extracted]";

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// True for the fixed placeholder strings, which are never echoed back to chat
pub fn is_placeholder(transcript: &str) -> bool {
    [SENTINEL_TRANSCRIPT, MODEL_UNAVAILABLE, NO_TEXT].contains(&transcript)
}

/// Speech-to-text collaborator. Never fails: errors become placeholder text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> String;
}

/// Whisper settings
#[derive(Debug, Clone)]
pub struct WhisperSettings {
    /// whisper.cpp CLI binary
    pub binary: String,
    /// ffmpeg binary used for audio conversion
    pub ffmpeg: String,
    /// Local model file
    pub model_path: PathBuf,
    /// Model to download when `model_path` is missing
    pub model_type: Option<String>,
    /// Spoken language hint
    pub language: String,
}

impl Default for WhisperSettings {
    fn default() -> Self {
        Self {
            binary: "whisper-cli".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            model_path: PathBuf::from("ggml-base.bin"),
            model_type: None,
            language: "ru".to_string(),
        }
    }
}

/// Transcriber backed by the whisper.cpp CLI
pub struct WhisperTranscriber {
    settings: WhisperSettings,
    /// Resolved model path, `None` once initialisation has failed
    model: OnceCell<Option<PathBuf>>,
    client: reqwest::Client,
}

impl WhisperTranscriber {
    pub fn new(settings: WhisperSettings) -> Self {
        Self {
            settings,
            model: OnceCell::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn settings(&self) -> &WhisperSettings {
        &self.settings
    }

    /// Resolve the model once; later calls reuse the outcome
    async fn model(&self) -> Option<&Path> {
        self.model
            .get_or_init(|| async {
                match self.ensure_model().await {
                    Ok(path) => {
                        tracing::info!(model = %path.display(), "Whisper model ready");
                        Some(path)
                    }
                    Err(e) => {
                        tracing::warn!(error = %format!("{:#}", e), "Whisper model unavailable");
                        None
                    }
                }
            })
            .await
            .as_deref()
    }

    async fn ensure_model(&self) -> Result<PathBuf> {
        let path = &self.settings.model_path;
        if path.exists() {
            return Ok(path.clone());
        }

        let model_type = self.settings.model_type.as_deref().with_context(|| {
            format!(
                "Whisper model not found at {} and no model type configured",
                path.display()
            )
        })?;

        download_model(&self.client, model_type, path).await?;
        Ok(path.clone())
    }

    async fn run(&self, model: &Path, audio_path: &Path) -> Result<String> {
        if !audio_path.exists() {
            anyhow::bail!("Audio file not found: {}", audio_path.display());
        }

        // Create temp dir for intermediate files
        let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;
        let wav_path = temp_dir.path().join("input.wav");
        let output_base = temp_dir.path().join("transcript");

        let convert = Command::new(&self.settings.ffmpeg)
            .arg("-nostdin")
            .arg("-y")
            .arg("-i")
            .arg(audio_path)
            .args(["-ar", "16000", "-ac", "1", "-c:a", "pcm_s16le"])
            .arg(&wav_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run ffmpeg")?;

        if !convert.status.success() {
            let stderr = String::from_utf8_lossy(&convert.stderr);
            anyhow::bail!("ffmpeg failed: {}", stderr.trim());
        }

        let output = Command::new(&self.settings.binary)
            .arg("-m")
            .arg(model)
            .arg("-l")
            .arg(&self.settings.language)
            .arg("-f")
            .arg(&wav_path)
            .arg("-otxt")
            .arg("-of")
            .arg(&output_base)
            .arg("-np")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run whisper")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Whisper failed: {}", stderr.trim());
        }

        let text = tokio::fs::read_to_string(output_base.with_extension("txt"))
            .await
            .context("Failed to read whisper output")?;

        Ok(normalize_transcript(&text))
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> String {
        let Some(model) = self.model().await else {
            return MODEL_UNAVAILABLE.to_string();
        };

        tracing::info!(path = %audio_path.display(), "Transcribing audio");

        match self.run(model, audio_path).await {
            Ok(text) if text.is_empty() => NO_TEXT.to_string(),
            Ok(text) => {
                tracing::info!(chars = text.chars().count(), "Transcription complete");
                text
            }
            Err(e) => {
                tracing::error!(path = %audio_path.display(), error = %format!("{:#}", e), "Transcription failed");
                SENTINEL_TRANSCRIPT.to_string()
            }
        }
    }
}

/// Join whisper's per-segment lines into one paragraph
fn normalize_transcript(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Download `ggml-<model_type>.bin` into `dest`, writing to a temp file first
async fn download_model(client: &reqwest::Client, model_type: &str, dest: &Path) -> Result<()> {
    let url = format!("{}/ggml-{}.bin", MODEL_BASE_URL, model_type.to_lowercase());
    tracing::info!(%url, dest = %dest.display(), "Downloading Whisper model");

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create model directory: {}", parent.display()))?;
    }

    let mut response = client
        .get(&url)
        .send()
        .await
        .context("Failed to request Whisper model")?
        .error_for_status()
        .context("Whisper model download was rejected")?;

    let partial = dest.with_extension("bin.part");
    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.context("Model download interrupted")? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&partial, dest)
        .await
        .with_context(|| format!("Failed to move model into place: {}", dest.display()))?;

    tracing::info!(bytes = written, "Whisper model downloaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_placeholders_are_recognised() {
        assert!(is_placeholder(SENTINEL_TRANSCRIPT));
        assert!(is_placeholder(MODEL_UNAVAILABLE));
        assert!(is_placeholder(NO_TEXT));
        assert!(!is_placeholder("buy milk"));
    }

    #[test]
    fn test_normalize_transcript_joins_segments() {
        assert_eq!(
            normalize_transcript("  first part\n\n second part \n"),
            "first part second part"
        );
        assert_eq!(normalize_transcript("\n \n"), "");
    }

    #[tokio::test]
    async fn test_missing_model_without_type_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let audio = temp.path().join("voice.ogg");
        tokio::fs::write(&audio, b"ogg").await.unwrap();

        let transcriber = WhisperTranscriber::new(WhisperSettings {
            model_path: temp.path().join("missing.bin"),
            model_type: None,
            ..Default::default()
        });

        assert_eq!(transcriber.transcribe(&audio).await, MODEL_UNAVAILABLE);
        // The failed initialisation is cached
        assert_eq!(transcriber.transcribe(&audio).await, MODEL_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_broken_binary_yields_sentinel() {
        let temp = TempDir::new().unwrap();
        let model = temp.path().join("ggml-base.bin");
        tokio::fs::write(&model, b"model").await.unwrap();
        let audio = temp.path().join("voice.ogg");
        tokio::fs::write(&audio, b"ogg").await.unwrap();

        let transcriber = WhisperTranscriber::new(WhisperSettings {
            ffmpeg: temp.path().join("no-such-ffmpeg").display().to_string(),
            model_path: model,
            ..Default::default()
        });

        assert_eq!(transcriber.transcribe(&audio).await, SENTINEL_TRANSCRIPT);
    }
}

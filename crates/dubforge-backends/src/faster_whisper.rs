//! faster-whisper speech-to-text backend.
//!
//! Drives the `whisper-ctranslate2` command line, which writes openai-whisper
//! style JSON (`text`, `segments[]`, `language`) into an output directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dubforge_av::ToolCommand;
use dubforge_core::config::FasterWhisperConfig;
use dubforge_core::media::has_extension;
use dubforge_core::{
    Backend, BackendInfo, Error, QualityTier, Result, Segment, SpeechToText, Transcript,
};
use serde::Deserialize;

const SUPPORTED_AUDIO: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a"];

#[derive(Debug, Clone)]
pub struct FasterWhisperStt {
    binary: String,
    model: String,
    device: Option<String>,
    compute_type: Option<String>,
    timeout: Duration,
}

impl FasterWhisperStt {
    pub const NAME: &'static str = "faster_whisper";

    pub fn new(config: &FasterWhisperConfig, timeout: Duration) -> Self {
        Self {
            binary: config.binary.clone(),
            model: config.model.clone(),
            device: config.device.clone(),
            compute_type: config.compute_type.clone(),
            timeout,
        }
    }

    fn build_args(&self, audio: &Path, output_dir: &Path, language: Option<&str>) -> Vec<String> {
        let mut args = vec![
            audio.display().to_string(),
            "--model".to_owned(),
            self.model.clone(),
            "--output_dir".to_owned(),
            output_dir.display().to_string(),
            "--output_format".to_owned(),
            "json".to_owned(),
        ];
        if let Some(language) = language {
            args.push("--language".to_owned());
            args.push(language.to_owned());
        }
        if let Some(device) = &self.device {
            args.push("--device".to_owned());
            args.push(device.clone());
        }
        if let Some(compute_type) = &self.compute_type {
            args.push("--compute_type".to_owned());
            args.push(compute_type.clone());
        }
        args
    }
}

impl Backend for FasterWhisperStt {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn info(&self) -> BackendInfo {
        BackendInfo::new(format!(
            "faster-whisper (CTranslate2) speech recognition, model {}",
            self.model
        ))
        .with_quality_tiers(QualityTier::ALL)
        .with_requirement(format!("{} on PATH", self.binary))
    }

    fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }
}

#[async_trait]
impl SpeechToText for FasterWhisperStt {
    async fn transcribe(&self, audio: &Path, language_hint: Option<&str>) -> Result<Transcript> {
        if !has_extension(audio, SUPPORTED_AUDIO) {
            return Err(Error::UnsupportedFormat(format!(
                "{} is not one of {}",
                audio.display(),
                SUPPORTED_AUDIO.join(", ")
            )));
        }

        let scratch = tempfile::Builder::new()
            .prefix("dubforge-faster-whisper")
            .tempdir()
            .map_err(|e| Error::tool(Self::NAME, format!("cannot create output dir: {e}")))?;

        tracing::info!(
            audio = %audio.display(),
            model = %self.model,
            language = ?language_hint,
            "transcribing with faster-whisper"
        );

        ToolCommand::new(&self.binary)
            .timeout(self.timeout)
            .args(self.build_args(audio, scratch.path(), language_hint))
            .execute()
            .await?;

        let json_path = json_output(scratch.path(), audio);
        let raw = tokio::fs::read_to_string(&json_path).await.map_err(|e| {
            Error::tool(
                Self::NAME,
                format!("missing JSON output {}: {e}", json_path.display()),
            )
        })?;
        if let Err(e) = scratch.close() {
            tracing::debug!(error = %e, "could not remove faster-whisper output dir");
        }

        let transcript = parse_faster_whisper_json(&raw, language_hint)?;
        tracing::debug!(
            segments = transcript.segments.len(),
            language = ?transcript.language,
            confidence = transcript.confidence,
            "faster-whisper transcription finished"
        );
        Ok(transcript)
    }
}

/// `<output_dir>/<audio stem>.json`
fn json_output(output_dir: &Path, audio: &Path) -> PathBuf {
    let stem = audio
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".into());
    output_dir.join(format!("{stem}.json"))
}

#[derive(Debug, Deserialize)]
struct FasterWhisperOutput {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<FasterWhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct FasterWhisperSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
    avg_logprob: Option<f64>,
}

/// Map whisper-style JSON to a [`Transcript`]. Segment confidence is
/// `exp(avg_logprob)`, clamped to `0..=1`.
pub fn parse_faster_whisper_json(raw: &str, language_hint: Option<&str>) -> Result<Transcript> {
    let output: FasterWhisperOutput =
        serde_json::from_str(raw).map_err(|e| Error::parse("faster-whisper JSON", e))?;

    let segments = output
        .segments
        .into_iter()
        .map(|s| Segment {
            start: s.start,
            end: s.end,
            text: s.text.trim().to_string(),
            confidence: s.avg_logprob.map(|lp| lp.exp().clamp(0.0, 1.0)),
        })
        .collect();

    let language = output
        .language
        .or_else(|| language_hint.map(str::to_string));

    Ok(Transcript::from_segments(segments, language))
}

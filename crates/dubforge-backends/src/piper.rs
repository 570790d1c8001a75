//! Piper text-to-speech backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dubforge_av::ToolCommand;
use dubforge_core::config::PiperConfig;
use dubforge_core::{
    Backend, BackendInfo, CapabilityKind, Error, QualityTier, Result, SynthesisRequest,
    TextToSpeech,
};

/// Piper synthesizes one voice model per language; text goes in on stdin.
#[derive(Debug, Clone)]
pub struct PiperTts {
    binary: String,
    voices: BTreeMap<String, PathBuf>,
    speaker: Option<u32>,
    timeout: Duration,
}

impl PiperTts {
    pub const NAME: &'static str = "piper";

    pub fn new(config: &PiperConfig, timeout: Duration) -> Self {
        Self {
            binary: config.binary.clone(),
            voices: config.voices.clone(),
            speaker: config.speaker,
            timeout,
        }
    }

    /// Voice model for a request: an explicit `.onnx` path, a voice map key,
    /// or the voice registered for the target language.
    fn resolve_voice(&self, language: &str, hint: Option<&str>) -> Result<PathBuf> {
        if let Some(hint) = hint {
            let as_path = Path::new(hint);
            if as_path.extension().is_some_and(|e| e == "onnx") {
                return Ok(as_path.to_path_buf());
            }
            if let Some(model) = self.voices.get(hint) {
                return Ok(model.clone());
            }
            tracing::warn!(voice = hint, "unknown piper voice hint, using language default");
        }

        self.voices
            .get(language)
            .cloned()
            .ok_or_else(|| Error::UnsupportedLanguage {
                backend: Self::NAME.to_string(),
                language: language.to_string(),
            })
    }

    /// Piper exposes speaking rate rather than quality; higher tiers speak
    /// slightly slower for clarity.
    fn length_scale(quality: QualityTier) -> &'static str {
        match quality {
            QualityTier::Low => "0.9",
            QualityTier::Medium => "1.0",
            QualityTier::High => "1.1",
        }
    }
}

impl Backend for PiperTts {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn info(&self) -> BackendInfo {
        BackendInfo::new("Piper neural text-to-speech (local ONNX voices)")
            .with_languages(self.voices.keys().cloned())
            .with_quality_tiers(QualityTier::ALL)
            .with_requirement(format!("{} on PATH", self.binary))
            .with_requirement("one .onnx voice per language")
    }

    fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok() && self.voices.values().any(|v| v.exists())
    }
}

#[async_trait]
impl TextToSpeech for PiperTts {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<PathBuf> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(Error::EmptyInput("no text to synthesize".into()));
        }

        let voice = self.resolve_voice(request.language, request.voice)?;
        if !voice.exists() {
            return Err(Error::backend_unavailable(CapabilityKind::TextToSpeech, Self::NAME));
        }

        tracing::info!(
            output = %request.output.display(),
            language = request.language,
            voice = %voice.display(),
            chars = text.len(),
            "synthesizing with piper"
        );

        let mut cmd = ToolCommand::new(&self.binary);
        cmd.timeout(self.timeout)
            .arg("--model")
            .path_arg(&voice)
            .arg("--output_file")
            .path_arg(request.output)
            .args(["--length_scale", Self::length_scale(request.quality)]);
        if let Some(speaker) = self.speaker {
            cmd.arg("--speaker").arg(speaker.to_string());
        }
        cmd.stdin(text.as_bytes().to_vec());
        cmd.execute().await?;

        if !request.output.exists() {
            return Err(Error::tool(
                "piper",
                format!("no audio written to {}", request.output.display()),
            ));
        }
        Ok(request.output.to_path_buf())
    }
}

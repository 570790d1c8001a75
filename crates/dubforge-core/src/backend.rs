//! Collaborator contracts consumed by the dubbing pipeline.
//!
//! Each capability kind has one trait. Concrete engines implement exactly one
//! of them and are handed to the registry wrapped in a [`BackendHandle`], the
//! tagged variant that carries backend identity without subclassing.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::{CapabilityKind, QualityTier};
use crate::error::{Error, Result};
use crate::media::MediaInfo;
use crate::transcript::Transcript;

/// Admissible voice reference duration in seconds.
pub const DEFAULT_REFERENCE_RANGE: RangeInclusive<f64> = 5.0..=300.0;

/// Static metadata a backend publishes to the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendInfo {
    pub description: String,
    /// Supported language codes. Empty means language-agnostic.
    pub languages: BTreeSet<String>,
    /// Supported quality tiers. Empty means every tier.
    pub quality_tiers: BTreeSet<QualityTier>,
    /// Human-readable runtime requirements (tools, model files).
    pub requirements: Vec<String>,
}

impl BackendInfo {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_quality_tiers(mut self, tiers: impl IntoIterator<Item = QualityTier>) -> Self {
        self.quality_tiers = tiers.into_iter().collect();
        self
    }

    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    pub fn supports_language(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.contains(language)
    }

    pub fn supports_quality(&self, quality: QualityTier) -> bool {
        self.quality_tiers.is_empty() || self.quality_tiers.contains(&quality)
    }
}

/// Behaviour shared by every backend regardless of kind.
pub trait Backend: Send + Sync {
    /// Registered name, unique within the capability kind.
    fn name(&self) -> &str;

    fn info(&self) -> BackendInfo;

    /// Cheap probe of the runtime environment. Re-evaluated on every call.
    fn is_available(&self) -> bool;
}

#[async_trait]
pub trait SpeechToText: Backend {
    async fn transcribe(&self, audio: &Path, language_hint: Option<&str>) -> Result<Transcript>;
}

/// Arguments to [`TextToSpeech::synthesize`].
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub output: &'a Path,
    pub language: &'a str,
    pub voice: Option<&'a str>,
    pub quality: QualityTier,
}

#[async_trait]
pub trait TextToSpeech: Backend {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<PathBuf>;
}

/// Handle to a trained voice model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceModel {
    pub name: String,
    pub path: PathBuf,
    pub references: Vec<PathBuf>,
}

#[async_trait]
pub trait VoiceCloner: Backend {
    async fn clone_voice(&self, source: &Path, reference: &Path, output: &Path) -> Result<PathBuf>;

    async fn train_voice_model(&self, references: &[PathBuf], name: &str) -> Result<VoiceModel>;

    fn reference_duration_range(&self) -> RangeInclusive<f64> {
        DEFAULT_REFERENCE_RANGE
    }

    fn reference_formats(&self) -> &'static [&'static str] {
        &["wav", "mp3", "flac"]
    }
}

#[async_trait]
pub trait LipSyncer: Backend {
    async fn sync_lips(&self, video: &Path, audio: &Path, output: &Path) -> Result<PathBuf>;

    fn video_formats(&self) -> &'static [&'static str] {
        &["mp4", "avi", "mov", "mkv"]
    }

    fn audio_formats(&self) -> &'static [&'static str] {
        &["wav", "mp3", "flac"]
    }
}

/// Optional translation collaborator.
#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(&self, text: &str, source: Option<&str>, target: &str) -> Result<String>;
}

/// Wrapper over the external media-processing tool.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Extract a mono speech track from `video` into `output`.
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<PathBuf>;

    /// Copy the video stream of `video` and mux in `audio` as the only audio track.
    async fn replace_audio_track(&self, video: &Path, audio: &Path, output: &Path)
        -> Result<PathBuf>;

    /// Transcode `audio` into the container implied by `output`'s extension.
    async fn export_audio(&self, audio: &Path, output: &Path) -> Result<PathBuf>;

    async fn get_duration(&self, path: &Path) -> Result<f64>;

    async fn get_media_info(&self, path: &Path) -> Result<MediaInfo>;
}

// ---------------------------------------------------------------------------
// BackendHandle
// ---------------------------------------------------------------------------

/// A backend of any capability kind.
#[derive(Clone)]
pub enum BackendHandle {
    SpeechToText(Arc<dyn SpeechToText>),
    TextToSpeech(Arc<dyn TextToSpeech>),
    VoiceCloning(Arc<dyn VoiceCloner>),
    LipSync(Arc<dyn LipSyncer>),
}

impl BackendHandle {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            BackendHandle::SpeechToText(_) => CapabilityKind::SpeechToText,
            BackendHandle::TextToSpeech(_) => CapabilityKind::TextToSpeech,
            BackendHandle::VoiceCloning(_) => CapabilityKind::VoiceCloning,
            BackendHandle::LipSync(_) => CapabilityKind::LipSync,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BackendHandle::SpeechToText(b) => b.name(),
            BackendHandle::TextToSpeech(b) => b.name(),
            BackendHandle::VoiceCloning(b) => b.name(),
            BackendHandle::LipSync(b) => b.name(),
        }
    }

    pub fn info(&self) -> BackendInfo {
        match self {
            BackendHandle::SpeechToText(b) => b.info(),
            BackendHandle::TextToSpeech(b) => b.info(),
            BackendHandle::VoiceCloning(b) => b.info(),
            BackendHandle::LipSync(b) => b.info(),
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            BackendHandle::SpeechToText(b) => b.is_available(),
            BackendHandle::TextToSpeech(b) => b.is_available(),
            BackendHandle::VoiceCloning(b) => b.is_available(),
            BackendHandle::LipSync(b) => b.is_available(),
        }
    }

    pub fn as_speech_to_text(&self) -> Option<Arc<dyn SpeechToText>> {
        match self {
            BackendHandle::SpeechToText(b) => Some(Arc::clone(b)),
            _ => None,
        }
    }

    pub fn as_text_to_speech(&self) -> Option<Arc<dyn TextToSpeech>> {
        match self {
            BackendHandle::TextToSpeech(b) => Some(Arc::clone(b)),
            _ => None,
        }
    }

    pub fn as_voice_cloner(&self) -> Option<Arc<dyn VoiceCloner>> {
        match self {
            BackendHandle::VoiceCloning(b) => Some(Arc::clone(b)),
            _ => None,
        }
    }

    pub fn as_lip_syncer(&self) -> Option<Arc<dyn LipSyncer>> {
        match self {
            BackendHandle::LipSync(b) => Some(Arc::clone(b)),
            _ => None,
        }
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

/// Check a reference clip duration against the admissible range.
pub fn validate_reference_duration(duration: f64, range: &RangeInclusive<f64>) -> Result<()> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(Error::ReferenceAudioInvalid(format!(
            "could not determine a positive duration (got {duration})"
        )));
    }
    if duration < *range.start() {
        return Err(Error::ReferenceAudioInvalid(format!(
            "reference is {duration:.1}s, shorter than the {:.0}s minimum",
            range.start()
        )));
    }
    if duration > *range.end() {
        return Err(Error::ReferenceAudioInvalid(format!(
            "reference is {duration:.1}s, longer than the {:.0}s maximum",
            range.end()
        )));
    }
    Ok(())
}

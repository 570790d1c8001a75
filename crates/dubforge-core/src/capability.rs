//! Capability kinds and quality tiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One kind of swappable media-transformation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    SpeechToText,
    TextToSpeech,
    VoiceCloning,
    LipSync,
}

impl CapabilityKind {
    /// All kinds, in pipeline order.
    pub const ALL: [CapabilityKind; 4] = [
        CapabilityKind::SpeechToText,
        CapabilityKind::TextToSpeech,
        CapabilityKind::VoiceCloning,
        CapabilityKind::LipSync,
    ];

    /// Short identifier used in config files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::SpeechToText => "stt",
            CapabilityKind::TextToSpeech => "tts",
            CapabilityKind::VoiceCloning => "voice_cloning",
            CapabilityKind::LipSync => "lip_sync",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            CapabilityKind::SpeechToText => "speech-to-text",
            CapabilityKind::TextToSpeech => "text-to-speech",
            CapabilityKind::VoiceCloning => "voice cloning",
            CapabilityKind::LipSync => "lip sync",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CapabilityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "stt" | "speech_to_text" => Ok(CapabilityKind::SpeechToText),
            "tts" | "text_to_speech" => Ok(CapabilityKind::TextToSpeech),
            "vc" | "voice_cloning" | "voice_clone" => Ok(CapabilityKind::VoiceCloning),
            "lip_sync" | "lipsync" => Ok(CapabilityKind::LipSync),
            other => Err(Error::Validation(format!(
                "unknown capability kind '{other}' (expected stt, tts, voice_cloning or lip_sync)"
            ))),
        }
    }
}

/// Output quality tier requested for a task.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    pub const ALL: [QualityTier; 3] = [QualityTier::Low, QualityTier::Medium, QualityTier::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(Error::Validation(format!(
                "unknown quality tier '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML by the binary and
//! carries every sub-config the pipeline and backends need. Every section
//! defaults sensibly so a completely empty file is valid.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityKind;
use crate::media::VIDEO_EXTENSIONS;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub paths: PathsConfig,
    pub preferences: PreferencesConfig,
    pub batch: BatchConfig,
    pub quality: QualityConfig,
    pub backends: BackendsConfig,
}

impl Config {
    /// Return a list of validation warnings (non-fatal issues).
    ///
    /// Fatal problems are reported by [`Config::fatal_errors`].
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(ref dir) = self.paths.work_dir {
            if !dir.exists() {
                warnings.push(format!(
                    "paths.work_dir {} does not exist; it will be created on first use",
                    dir.display()
                ));
            }
        }

        for kind in CapabilityKind::ALL {
            if self.preferences.for_kind(kind).is_empty() {
                warnings.push(format!(
                    "preferences.{} is empty; selection falls back to registration order",
                    kind.as_str()
                ));
            }
        }

        if self.batch.extensions.is_empty() {
            warnings.push("batch.extensions is empty; directory batches will find nothing".into());
        }

        if self.quality.min_output_bytes == 0 {
            warnings.push("quality.min_output_bytes is 0; empty outputs are still invalid".into());
        }

        if self.backends.whisper_cpp.model.is_none() {
            warnings.push("backends.whisper_cpp.model is not set; whisper-cli default is used".into());
        }

        if self.backends.piper.voices.is_empty() {
            warnings.push("backends.piper.voices is empty; piper will be unavailable".into());
        }

        if self.backends.voice_clone.program.is_some() && self.backends.voice_clone.args.is_empty() {
            warnings.push("backends.voice_clone.program is set but args is empty".into());
        }

        if self.backends.wav2lip.checkpoint.is_none() {
            warnings.push("backends.wav2lip.checkpoint is not set; lip sync is disabled".into());
        }

        warnings
    }

    /// Problems that make the configuration unusable.
    pub fn fatal_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.batch.max_concurrency == 0 {
            errors.push("batch.max_concurrency must be at least 1".into());
        }

        let q = &self.quality;
        if !(q.advisory_duration_ratio >= 0.0 && q.issue_duration_ratio >= 0.0) {
            errors.push("quality duration ratios must be non-negative".into());
        } else if q.advisory_duration_ratio > q.issue_duration_ratio {
            errors.push(format!(
                "quality.advisory_duration_ratio ({}) exceeds quality.issue_duration_ratio ({})",
                q.advisory_duration_ratio, q.issue_duration_ratio
            ));
        }

        if !self.backends.speaches.base_url.starts_with("http://")
            && !self.backends.speaches.base_url.starts_with("https://")
        {
            errors.push(format!(
                "backends.speaches.base_url must be an http(s) URL, got '{}'",
                self.backends.speaches.base_url
            ));
        }

        if self.tools.timeout_secs == 0 {
            errors.push("tools.timeout_secs must be at least 1".into());
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external media tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Upper bound for a single external tool invocation.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            timeout_secs: 3600,
        }
    }
}

/// Where intermediates are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Shared directory for intermediates. Unset means next to each output.
    pub work_dir: Option<PathBuf>,
}

/// Ranked backend names per capability kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    pub stt: Vec<String>,
    pub tts: Vec<String>,
    pub voice_cloning: Vec<String>,
    pub lip_sync: Vec<String>,
}

impl PreferencesConfig {
    pub fn for_kind(&self, kind: CapabilityKind) -> &[String] {
        match kind {
            CapabilityKind::SpeechToText => &self.stt,
            CapabilityKind::TextToSpeech => &self.tts,
            CapabilityKind::VoiceCloning => &self.voice_cloning,
            CapabilityKind::LipSync => &self.lip_sync,
        }
    }
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            stt: vec!["whisper_cpp".into(), "faster_whisper".into()],
            tts: vec!["piper".into(), "speaches".into()],
            voice_cloning: vec!["voice_clone".into()],
            lip_sync: vec!["wav2lip".into()],
        }
    }
}

/// Batch scheduling defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    /// Video extensions picked up when enumerating a directory.
    pub extensions: Vec<String>,
    /// Appended to each input stem to form the output file name.
    pub output_suffix: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            extensions: VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            output_suffix: "_dubbed".into(),
        }
    }
}

/// Thresholds for post-hoc quality checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Relative duration difference above which the output is invalid.
    pub issue_duration_ratio: f64,
    /// Relative duration difference above which a recommendation is made.
    pub advisory_duration_ratio: f64,
    pub min_output_bytes: u64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            issue_duration_ratio: 0.10,
            advisory_duration_ratio: 0.05,
            min_output_bytes: 1024,
        }
    }
}

/// Per-backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub whisper_cpp: WhisperCppConfig,
    pub faster_whisper: FasterWhisperConfig,
    pub piper: PiperConfig,
    pub speaches: SpeachesConfig,
    pub voice_clone: VoiceCloneConfig,
    pub wav2lip: Wav2LipConfig,
}

/// whisper.cpp command-line settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperCppConfig {
    pub binary: String,
    pub model: Option<PathBuf>,
    pub threads: Option<u32>,
}

impl Default for WhisperCppConfig {
    fn default() -> Self {
        Self {
            binary: "whisper-cli".into(),
            model: None,
            threads: None,
        }
    }
}

/// faster-whisper through the `whisper-ctranslate2` command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FasterWhisperConfig {
    pub binary: String,
    /// Model size or path (`tiny`, `base`, `small`, `large-v3`, ...).
    pub model: String,
    pub device: Option<String>,
    pub compute_type: Option<String>,
}

impl Default for FasterWhisperConfig {
    fn default() -> Self {
        Self {
            binary: "whisper-ctranslate2".into(),
            model: "base".into(),
            device: None,
            compute_type: None,
        }
    }
}

/// Speaches HTTP text-to-speech server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeachesConfig {
    pub base_url: String,
    /// Language code to voice id. Unlisted languages pick from the server's
    /// voice list.
    pub voices: BTreeMap<String, String>,
    pub languages: Vec<String>,
    pub speed: f64,
}

impl Default for SpeachesConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            voices: BTreeMap::new(),
            languages: [
                "en", "es", "fr", "de", "it", "pt", "ru", "ja", "ko", "zh", "ar", "hi", "tr", "pl",
                "nl", "sv", "da", "no", "fi",
            ]
            .iter()
            .map(|l| l.to_string())
            .collect(),
            speed: 1.0,
        }
    }
}

/// Piper TTS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PiperConfig {
    pub binary: String,
    /// Language code to `.onnx` voice model.
    pub voices: BTreeMap<String, PathBuf>,
    pub speaker: Option<u32>,
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            binary: "piper".into(),
            voices: BTreeMap::new(),
            speaker: None,
        }
    }
}

/// Generic command-template voice cloner.
///
/// `args` may use `{source}`, `{reference}` and `{output}`; `train_args` may
/// use `{references}`, `{name}` and `{model_dir}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceCloneConfig {
    pub program: Option<String>,
    pub args: Vec<String>,
    pub train_args: Vec<String>,
    pub model_dir: PathBuf,
    pub min_reference_secs: f64,
    pub max_reference_secs: f64,
}

impl Default for VoiceCloneConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            train_args: Vec::new(),
            model_dir: PathBuf::from("./voice_models"),
            min_reference_secs: 5.0,
            max_reference_secs: 300.0,
        }
    }
}

/// Wav2Lip inference settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Wav2LipConfig {
    pub python: String,
    pub repo_dir: PathBuf,
    pub checkpoint: Option<PathBuf>,
}

impl Default for Wav2LipConfig {
    fn default() -> Self {
        Self {
            python: "python3".into(),
            repo_dir: PathBuf::from("./Wav2Lip"),
            checkpoint: None,
        }
    }
}

//! Dubbing task input and the per-task result record.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::QualityTier;

/// Immutable description of one dubbing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DubbingTask {
    pub input: PathBuf,
    pub output: PathBuf,
    pub target_language: String,
    /// `None` means auto-detect (resolved by the speech-to-text backend).
    pub source_language: Option<String>,
    /// Reference audio for voice cloning.
    pub voice_reference: Option<PathBuf>,
    pub stt_backend: String,
    pub tts_backend: String,
    /// Explicit voice-cloning backend; selected by preference when absent.
    pub voice_cloning_backend: Option<String>,
    /// Explicit lip-sync backend; selected by preference when absent.
    pub lip_sync_backend: Option<String>,
    pub lip_sync: bool,
    pub quality: QualityTier,
}

impl DubbingTask {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        target_language: impl Into<String>,
        stt_backend: impl Into<String>,
        tts_backend: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            target_language: target_language.into(),
            source_language: None,
            voice_reference: None,
            stt_backend: stt_backend.into(),
            tts_backend: tts_backend.into(),
            voice_cloning_backend: None,
            lip_sync_backend: None,
            lip_sync: true,
            quality: QualityTier::default(),
        }
    }

    pub fn with_source_language(mut self, language: Option<String>) -> Self {
        self.source_language = language;
        self
    }

    pub fn with_voice_reference(mut self, reference: Option<PathBuf>) -> Self {
        self.voice_reference = reference;
        self
    }

    pub fn with_voice_cloning_backend(mut self, name: Option<String>) -> Self {
        self.voice_cloning_backend = name;
        self
    }

    pub fn with_lip_sync_backend(mut self, name: Option<String>) -> Self {
        self.lip_sync_backend = name;
        self
    }

    pub fn with_lip_sync(mut self, enabled: bool) -> Self {
        self.lip_sync = enabled;
        self
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    /// Copy of this task with the input and output paths substituted.
    pub fn retarget(&self, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..self.clone()
        }
    }

    /// Translation is attempted unless the source language is known and equal
    /// to the target language.
    pub fn needs_translation(&self) -> bool {
        self.source_language.as_deref() != Some(self.target_language.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// One step of the fixed dubbing topology, declared in execution order.
///
/// `LipSync` and `ReplaceAudioTrack` are mutually exclusive final stages and
/// share the same position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExtractAudio,
    Transcribe,
    Translate,
    Synthesize,
    CloneVoice,
    LipSync,
    ReplaceAudioTrack,
}

impl Stage {
    /// Position in the topology; the two final branches share position 5.
    pub fn position(&self) -> u8 {
        match self {
            Stage::ExtractAudio => 0,
            Stage::Transcribe => 1,
            Stage::Translate => 2,
            Stage::Synthesize => 3,
            Stage::CloneVoice => 4,
            Stage::LipSync | Stage::ReplaceAudioTrack => 5,
        }
    }

    /// Mandatory stages fail the task; optional stages degrade by skipping.
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, Stage::CloneVoice | Stage::LipSync)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractAudio => "extract_audio",
            Stage::Transcribe => "transcribe",
            Stage::Translate => "translate",
            Stage::Synthesize => "synthesize",
            Stage::CloneVoice => "clone_voice",
            Stage::LipSync => "lip_sync",
            Stage::ReplaceAudioTrack => "replace_audio_track",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Skipped,
    Failed,
}

/// Provenance of one attempted stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub backend: Option<String>,
    pub output: Option<PathBuf>,
    pub detail: Option<String>,
}

impl StageRecord {
    pub fn completed(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            backend: None,
            output: None,
            detail: None,
        }
    }

    pub fn skipped(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            backend: None,
            output: None,
            detail: Some(reason.into()),
        }
    }

    pub fn failed(stage: Stage, error: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            backend: None,
            output: None,
            detail: Some(error.into()),
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// TaskResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Completed,
    Failed,
}

/// Outcome of running one [`DubbingTask`].
///
/// Once the status leaves [`TaskStatus::Processing`] the result is terminal
/// and every mutator becomes a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: Uuid,
    pub task: DubbingTask,
    pub status: TaskStatus,
    pub stages: Vec<StageRecord>,
    pub intermediate_files: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskResult {
    pub fn new(task: DubbingTask) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            status: TaskStatus::Processing,
            stages: Vec::new(),
            intermediate_files: Vec::new(),
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TaskStatus::Processing
    }

    /// Append a stage record.
    pub fn record(&mut self, record: StageRecord) {
        if self.guard_terminal("record") {
            return;
        }
        self.stages.push(record);
    }

    /// Remember an intermediate artifact for later cleanup.
    pub fn add_intermediate(&mut self, path: impl Into<PathBuf>) {
        if self.guard_terminal("add_intermediate") {
            return;
        }
        let path = path.into();
        if !self.intermediate_files.contains(&path) {
            self.intermediate_files.push(path);
        }
    }

    pub fn complete(&mut self, output: impl Into<PathBuf>) {
        if self.guard_terminal("complete") {
            return;
        }
        self.status = TaskStatus::Completed;
        self.output = Some(output.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.guard_terminal("fail") {
            return;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Record for `stage`, if that stage was attempted.
    pub fn stage(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn last_stage(&self) -> Option<&StageRecord> {
        self.stages.last()
    }

    pub fn input(&self) -> &Path {
        &self.task.input
    }

    /// Wall-clock processing time in seconds, once terminal.
    pub fn processing_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }

    fn guard_terminal(&self, op: &str) -> bool {
        if self.is_terminal() {
            tracing::warn!(task = %self.id, op, "ignoring mutation of terminal task result");
            return true;
        }
        false
    }
}

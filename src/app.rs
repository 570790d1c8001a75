//! Wiring between configuration, built-in backends and the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dubforge_av::{FfmpegMedia, ToolRegistry};
use dubforge_core::{CapabilityKind, Config, DubbingTask, MediaTool, QualityTier};
use dubforge_pipeline::{
    BatchScheduler, CapabilityRegistry, QualityValidator, Reporter, SelectionConstraints,
    StageOrchestrator,
};

/// Everything a command needs, built once from the loaded config.
pub struct App {
    pub config: Config,
    pub tools: ToolRegistry,
    pub registry: Arc<CapabilityRegistry>,
}

/// Per-task choices collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub target_language: String,
    pub source_language: Option<String>,
    pub voice_reference: Option<PathBuf>,
    pub stt: Option<String>,
    pub tts: Option<String>,
    pub voice_cloning: Option<String>,
    pub lip_sync_backend: Option<String>,
    pub lip_sync: bool,
    pub quality: QualityTier,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let registry = build_registry(&config)?;
        let tools = discover_tools(&config);
        Ok(Self {
            config,
            tools,
            registry: Arc::new(registry),
        })
    }

    /// ffmpeg-backed media collaborator.
    ///
    /// Missing tools are not fatal here: the stage that needs them fails
    /// with an external tool error instead.
    pub fn media(&self) -> Arc<dyn MediaTool> {
        match FfmpegMedia::from_registry(&self.tools) {
            Ok(media) => Arc::new(media),
            Err(e) => {
                tracing::warn!(error = %e, "media tools missing, media stages will fail");
                let cfg = &self.config.tools;
                Arc::new(FfmpegMedia::new(
                    cfg.ffmpeg_path.clone().unwrap_or_else(|| "ffmpeg".into()),
                    cfg.ffprobe_path.clone().unwrap_or_else(|| "ffprobe".into()),
                    Duration::from_secs(cfg.timeout_secs.max(1)),
                ))
            }
        }
    }

    pub fn orchestrator(&self, reporter: Arc<Reporter>) -> StageOrchestrator {
        StageOrchestrator::new(self.registry.clone(), self.media())
            .with_preferences(self.config.preferences.clone())
            .with_work_dir(self.config.paths.work_dir.clone())
            .with_reporter(reporter)
    }

    pub fn scheduler(
        &self,
        reporter: Arc<Reporter>,
        max_concurrency: Option<usize>,
    ) -> Result<BatchScheduler> {
        let mut batch = self.config.batch.clone();
        if let Some(max) = max_concurrency {
            batch.max_concurrency = max;
        }
        let orchestrator = Arc::new(self.orchestrator(reporter.clone()));
        Ok(BatchScheduler::from_config(orchestrator, &batch)?.with_reporter(reporter))
    }

    pub fn validator(&self) -> QualityValidator {
        QualityValidator::new(self.media()).with_thresholds(self.config.quality.clone())
    }

    /// The named backend, or the best available one by configured preference.
    pub fn resolve_backend(
        &self,
        kind: CapabilityKind,
        requested: Option<&str>,
        constraints: &SelectionConstraints,
    ) -> Result<String> {
        if let Some(name) = requested {
            return Ok(name.to_string());
        }
        let name = self
            .registry
            .select(kind, self.config.preferences.for_kind(kind), constraints)
            .with_context(|| format!("cannot choose a {kind} backend"))?;
        tracing::info!(kind = kind.as_str(), backend = %name, "selected backend");
        Ok(name)
    }

    /// Build a task, auto-selecting speech-to-text and text-to-speech when
    /// they were not named.
    pub fn build_task(&self, input: &Path, output: &Path, opts: &TaskOptions) -> Result<DubbingTask> {
        let stt_constraints = SelectionConstraints {
            language: opts.source_language.clone(),
            quality: None,
        };
        let stt = self.resolve_backend(CapabilityKind::SpeechToText, opts.stt.as_deref(), &stt_constraints)?;

        let tts_constraints = SelectionConstraints::new()
            .language(&opts.target_language)
            .quality(opts.quality);
        let tts = self.resolve_backend(CapabilityKind::TextToSpeech, opts.tts.as_deref(), &tts_constraints)?;

        Ok(DubbingTask::new(input, output, &opts.target_language, stt, tts)
            .with_source_language(opts.source_language.clone())
            .with_voice_reference(opts.voice_reference.clone())
            .with_voice_cloning_backend(opts.voice_cloning.clone())
            .with_lip_sync_backend(opts.lip_sync_backend.clone())
            .with_lip_sync(opts.lip_sync)
            .with_quality(opts.quality))
    }

    /// `<dir of input>/<stem><suffix><ext>`
    pub fn default_output(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".into());
        let ext = input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        input.with_file_name(format!("{stem}{}{ext}", self.config.batch.output_suffix))
    }
}

/// Register every built-in backend in its fixed order.
pub fn build_registry(config: &Config) -> Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    for handle in dubforge_backends::builtin(config) {
        let name = handle.name().to_string();
        registry
            .register_handle(handle)
            .with_context(|| format!("failed to register backend {name}"))?;
    }
    Ok(registry)
}

/// ffmpeg/ffprobe plus every engine binary the built-in backends call.
pub fn discover_tools(config: &Config) -> ToolRegistry {
    let backends = &config.backends;
    let mut tools = ToolRegistry::discover(&config.tools)
        .with_tool("whisper_cpp", &backends.whisper_cpp.binary)
        .with_tool("faster_whisper", &backends.faster_whisper.binary)
        .with_tool("piper", &backends.piper.binary)
        .with_tool("wav2lip", &backends.wav2lip.python);
    if let Some(program) = &backends.voice_clone.program {
        tools = tools.with_tool("voice_clone", program);
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_follows_builtin_order() {
        let registry = build_registry(&Config::default()).unwrap();
        let names = |kind: CapabilityKind| -> Vec<String> {
            registry.list(kind).iter().map(|d| d.name().to_string()).collect()
        };
        assert_eq!(names(CapabilityKind::SpeechToText), ["whisper_cpp", "faster_whisper"]);
        assert_eq!(names(CapabilityKind::TextToSpeech), ["piper", "speaches"]);
        assert_eq!(names(CapabilityKind::VoiceCloning), ["voice_clone"]);
        assert_eq!(names(CapabilityKind::LipSync), ["wav2lip"]);
    }

    #[test]
    fn default_output_uses_suffix() {
        let app = App::new(Config::default()).unwrap();
        assert_eq!(
            app.default_output(Path::new("/videos/talk.mp4")),
            PathBuf::from("/videos/talk_dubbed.mp4")
        );
    }

    #[test]
    fn named_backends_are_used_verbatim() {
        let app = App::new(Config::default()).unwrap();
        let opts = TaskOptions {
            target_language: "es".into(),
            stt: Some("whisper_cpp".into()),
            tts: Some("piper".into()),
            lip_sync: true,
            ..Default::default()
        };
        let task = app
            .build_task(Path::new("a.mp4"), Path::new("b.mp4"), &opts)
            .unwrap();
        assert_eq!(task.stt_backend, "whisper_cpp");
        assert_eq!(task.tts_backend, "piper");
        assert!(task.lip_sync);
        assert_eq!(task.target_language, "es");
    }
}

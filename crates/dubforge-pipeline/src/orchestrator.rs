//! Stage orchestrator: drives one [`DubbingTask`] through the fixed stage
//! sequence and records what happened at every step.
//!
//! ```text
//! ExtractAudio -> Transcribe -> Translate -> Synthesize -> CloneVoice -> LipSync | ReplaceAudioTrack
//! ```
//!
//! Every attempted stage appends exactly one [`StageRecord`]. Mandatory stages
//! end the task on any error; CloneVoice and LipSync recover from
//! [`Error::is_recoverable`] errors by skipping.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dubforge_av::TaskWorkspace;
use dubforge_core::config::PreferencesConfig;
use dubforge_core::{
    validate_reference_duration, CapabilityKind, DubbingTask, Error, LipSyncer, MediaKind,
    MediaTool, Result, Stage, StageRecord, SynthesisRequest, TaskResult, Transcript,
    Translator, VoiceCloner,
};

use crate::registry::{CapabilityRegistry, SelectionConstraints};
use crate::report::{ProgressEvent, Reporter};

/// Fatal error at a mandatory stage (or a non-recoverable one at an optional stage).
#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    backend: Option<String>,
    error: Error,
}

impl StageFailure {
    fn new(stage: Stage, error: Error) -> Self {
        Self {
            stage,
            backend: None,
            error,
        }
    }

    fn with_backend(stage: Stage, backend: impl Into<String>, error: Error) -> Self {
        Self {
            stage,
            backend: Some(backend.into()),
            error,
        }
    }
}

type StageResult<T> = std::result::Result<T, StageFailure>;

/// Runs dubbing tasks against a shared, read-only [`CapabilityRegistry`].
pub struct StageOrchestrator {
    registry: Arc<CapabilityRegistry>,
    media: Arc<dyn MediaTool>,
    translator: Option<Arc<dyn Translator>>,
    reporter: Arc<Reporter>,
    preferences: PreferencesConfig,
    work_dir: Option<PathBuf>,
}

impl StageOrchestrator {
    pub fn new(registry: Arc<CapabilityRegistry>, media: Arc<dyn MediaTool>) -> Self {
        Self {
            registry,
            media,
            translator: None,
            reporter: Arc::new(Reporter::noop()),
            preferences: PreferencesConfig::default(),
            work_dir: None,
        }
    }

    /// Attach a translation collaborator. Without one Translate is skipped.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Ranked backend names used when a task leaves an optional backend unnamed.
    pub fn with_preferences(mut self, preferences: PreferencesConfig) -> Self {
        self.preferences = preferences;
        self
    }

    /// Put intermediates in `dir` instead of next to each task's output.
    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn media(&self) -> &Arc<dyn MediaTool> {
        &self.media
    }

    /// Run `task` to a terminal [`TaskResult`].
    ///
    /// Failures never escape as errors: they are recorded on the result along
    /// with the stage history up to the failing stage.
    pub async fn run(&self, task: DubbingTask) -> TaskResult {
        let mut result = TaskResult::new(task);
        let input = result.task.input.clone();

        tracing::info!(
            task = %result.id,
            input = %input.display(),
            output = %result.task.output.display(),
            target = %result.task.target_language,
            "starting dubbing task"
        );
        self.reporter.send(ProgressEvent::TaskStarted {
            input: input.clone(),
        });

        match self.execute(&mut result).await {
            Ok(output) => {
                tracing::info!(task = %result.id, output = %output.display(), "dubbing task completed");
                result.complete(output);
            }
            Err(failure) => {
                let message = format!("{}: {}", failure.stage, failure.error);
                let mut record = StageRecord::failed(failure.stage, failure.error.to_string());
                if let Some(backend) = failure.backend {
                    record = record.with_backend(backend);
                }
                self.push(&mut result, record);
                tracing::error!(task = %result.id, input = %input.display(), error = %message, "dubbing task failed");
                result.fail(message);
            }
        }

        self.reporter.send(ProgressEvent::TaskFinished {
            input,
            status: result.status,
            error: result.error.clone(),
        });
        result
    }

    async fn execute(&self, result: &mut TaskResult) -> StageResult<PathBuf> {
        let task = result.task.clone();
        let ws = TaskWorkspace::for_output(&task.output, self.work_dir.as_deref());

        // Setup problems surface as the first stage.
        self.prepare(&task, &ws)
            .await
            .map_err(|e| StageFailure::new(Stage::ExtractAudio, e))?;

        let audio = self.extract_audio(&task, &ws, result).await?;
        let transcript = self.transcribe(&task, &audio, result).await?;
        let text = self.translate(&task, &transcript, result).await?;
        let speech = self.synthesize(&task, &text, &ws, result).await?;
        let speech = self.clone_voice(&task, speech, &ws, result).await?;
        self.finish(&task, &speech, result).await
    }

    async fn prepare(&self, task: &DubbingTask, ws: &TaskWorkspace) -> Result<()> {
        if !tokio::fs::try_exists(&task.input).await? {
            return Err(Error::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("input {} does not exist", task.input.display()),
                ),
            });
        }
        ws.ensure_dir().await?;
        if let Some(parent) = task.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    // -- Stages ---------------------------------------------------------------

    async fn extract_audio(
        &self,
        task: &DubbingTask,
        ws: &TaskWorkspace,
        result: &mut TaskResult,
    ) -> StageResult<PathBuf> {
        match MediaKind::of(&task.input) {
            MediaKind::Audio => {
                self.push(result, StageRecord::skipped(Stage::ExtractAudio, "input is already audio"));
                Ok(task.input.clone())
            }
            MediaKind::Video => {
                let target = ws.artifact("extracted", "wav");
                result.add_intermediate(&target);
                let audio = self
                    .media
                    .extract_audio(&task.input, &target)
                    .await
                    .map_err(|e| StageFailure::new(Stage::ExtractAudio, e))?;
                result.add_intermediate(&audio);
                self.push(result, StageRecord::completed(Stage::ExtractAudio).with_output(&audio));
                Ok(audio)
            }
            MediaKind::Unknown => Err(StageFailure::new(
                Stage::ExtractAudio,
                Error::UnsupportedFormat(task.input.display().to_string()),
            )),
        }
    }

    async fn transcribe(
        &self,
        task: &DubbingTask,
        audio: &Path,
        result: &mut TaskResult,
    ) -> StageResult<Transcript> {
        let name = task.stt_backend.clone();
        let backend = self
            .lookup({
                let name = name.clone();
                move |r| r.speech_to_text(&name)
            })
            .await
            .map_err(|e| StageFailure::with_backend(Stage::Transcribe, &name, e))?;

        let transcript = backend
            .transcribe(audio, task.source_language.as_deref())
            .await
            .map_err(|e| StageFailure::with_backend(Stage::Transcribe, &name, e))?;

        let detail = format!(
            "{} segments, language {}",
            transcript.segments.len(),
            transcript.language.as_deref().unwrap_or("unknown")
        );
        self.push(
            result,
            StageRecord::completed(Stage::Transcribe)
                .with_backend(&name)
                .with_detail(detail),
        );
        Ok(transcript)
    }

    async fn translate(
        &self,
        task: &DubbingTask,
        transcript: &Transcript,
        result: &mut TaskResult,
    ) -> StageResult<String> {
        // Only a declared source language can make translation unnecessary;
        // the detected one is passed along as a hint.
        if !task.needs_translation() {
            self.push(result, StageRecord::skipped(Stage::Translate, "source and target language match"));
            return Ok(transcript.text.clone());
        }
        let source = task
            .source_language
            .as_deref()
            .or(transcript.language.as_deref());

        let Some(translator) = &self.translator else {
            self.push(
                result,
                StageRecord::skipped(Stage::Translate, "no translation collaborator configured"),
            );
            return Ok(transcript.text.clone());
        };

        let translated = translator
            .translate(&transcript.text, source, &task.target_language)
            .await
            .map_err(|e| StageFailure::with_backend(Stage::Translate, translator.name(), e))?;

        self.push(
            result,
            StageRecord::completed(Stage::Translate)
                .with_backend(translator.name())
                .with_detail(format!(
                    "{} -> {}",
                    source.unwrap_or("auto"),
                    task.target_language
                )),
        );
        Ok(translated)
    }

    async fn synthesize(
        &self,
        task: &DubbingTask,
        text: &str,
        ws: &TaskWorkspace,
        result: &mut TaskResult,
    ) -> StageResult<PathBuf> {
        let name = task.tts_backend.clone();
        let backend = self
            .lookup({
                let name = name.clone();
                move |r| r.text_to_speech(&name)
            })
            .await
            .map_err(|e| StageFailure::with_backend(Stage::Synthesize, &name, e))?;

        let target = ws.artifact("tts", "wav");
        result.add_intermediate(&target);
        let speech = backend
            .synthesize(SynthesisRequest {
                text,
                output: &target,
                language: &task.target_language,
                voice: None,
                quality: task.quality,
            })
            .await
            .map_err(|e| StageFailure::with_backend(Stage::Synthesize, &name, e))?;

        result.add_intermediate(&speech);
        self.push(
            result,
            StageRecord::completed(Stage::Synthesize)
                .with_backend(&name)
                .with_output(&speech),
        );
        Ok(speech)
    }

    /// Returns the audio to use downstream: the cloned track, or `speech`
    /// unchanged when cloning is skipped.
    async fn clone_voice(
        &self,
        task: &DubbingTask,
        speech: PathBuf,
        ws: &TaskWorkspace,
        result: &mut TaskResult,
    ) -> StageResult<PathBuf> {
        let Some(reference) = task.voice_reference.clone() else {
            self.push(result, StageRecord::skipped(Stage::CloneVoice, "no voice reference requested"));
            return Ok(speech);
        };

        let (name, cloner) = match self
            .resolve_optional(
                CapabilityKind::VoiceCloning,
                task.voice_cloning_backend.clone(),
                &task.target_language,
                |r, name| r.voice_cloner(name),
            )
            .await
        {
            Ok(found) => found,
            Err((backend, e)) => return self.skip_or_fail(Stage::CloneVoice, backend, e, speech, result),
        };

        let target = ws.artifact("cloned", "wav");
        result.add_intermediate(&target);
        match self.run_clone(cloner.as_ref(), &speech, &reference, &target).await {
            Ok(cloned) => {
                result.add_intermediate(&cloned);
                self.push(
                    result,
                    StageRecord::completed(Stage::CloneVoice)
                        .with_backend(&name)
                        .with_output(&cloned),
                );
                Ok(cloned)
            }
            Err(e) => self.skip_or_fail(Stage::CloneVoice, Some(name), e, speech, result),
        }
    }

    async fn run_clone(
        &self,
        cloner: &dyn VoiceCloner,
        speech: &Path,
        reference: &Path,
        target: &Path,
    ) -> Result<PathBuf> {
        let duration = self
            .media
            .get_duration(reference)
            .await
            .map_err(|e| Error::ReferenceAudioInvalid(format!("{}: {e}", reference.display())))?;
        validate_reference_duration(duration, &cloner.reference_duration_range())?;
        cloner.clone_voice(speech, reference, target).await
    }

    /// LipSync when requested and possible, otherwise ReplaceAudioTrack.
    async fn finish(
        &self,
        task: &DubbingTask,
        speech: &Path,
        result: &mut TaskResult,
    ) -> StageResult<PathBuf> {
        let is_video = MediaKind::is_video(&task.input);

        let fallback_reason = if !task.lip_sync {
            "lip sync disabled".to_string()
        } else if !is_video {
            "input is audio, lip sync not applicable".to_string()
        } else {
            match self.lip_sync(task, speech).await {
                Ok((name, output)) => {
                    self.push(
                        result,
                        StageRecord::completed(Stage::LipSync)
                            .with_backend(name)
                            .with_output(&output),
                    );
                    return Ok(output);
                }
                Err((backend, e)) if e.is_recoverable() => {
                    tracing::warn!(
                        input = %task.input.display(),
                        backend = backend.as_deref().unwrap_or("-"),
                        error = %e,
                        "lip sync unavailable, replacing audio track instead"
                    );
                    format!("lip sync fallback: {e}")
                }
                Err((backend, e)) => {
                    return Err(StageFailure {
                        stage: Stage::LipSync,
                        backend,
                        error: e,
                    })
                }
            }
        };

        let output = if is_video {
            self.media
                .replace_audio_track(&task.input, speech, &task.output)
                .await
        } else {
            self.media.export_audio(speech, &task.output).await
        }
        .map_err(|e| StageFailure::new(Stage::ReplaceAudioTrack, e))?;

        self.push(
            result,
            StageRecord::completed(Stage::ReplaceAudioTrack)
                .with_output(&output)
                .with_detail(fallback_reason),
        );
        Ok(output)
    }

    async fn lip_sync(
        &self,
        task: &DubbingTask,
        speech: &Path,
    ) -> std::result::Result<(String, PathBuf), (Option<String>, Error)> {
        let (name, syncer): (String, Arc<dyn LipSyncer>) = self
            .resolve_optional(
                CapabilityKind::LipSync,
                task.lip_sync_backend.clone(),
                &task.target_language,
                |r, name| r.lip_syncer(name),
            )
            .await?;

        match syncer.sync_lips(&task.input, speech, &task.output).await {
            Ok(output) => Ok((name, output)),
            Err(e) => Err((Some(name), e)),
        }
    }

    // -- Helpers --------------------------------------------------------------

    /// Append `record` and publish it.
    fn push(&self, result: &mut TaskResult, record: StageRecord) {
        tracing::debug!(
            task = %result.id,
            stage = %record.stage,
            status = ?record.status,
            backend = record.backend.as_deref().unwrap_or("-"),
            "stage finished"
        );
        self.reporter.send(ProgressEvent::StageFinished {
            input: result.task.input.clone(),
            record: record.clone(),
        });
        result.record(record);
    }

    /// Record a skip for a recoverable error at an optional stage, or fail.
    fn skip_or_fail(
        &self,
        stage: Stage,
        backend: Option<String>,
        error: Error,
        passthrough: PathBuf,
        result: &mut TaskResult,
    ) -> StageResult<PathBuf> {
        if stage.is_mandatory() || !error.is_recoverable() {
            return Err(StageFailure {
                stage,
                backend,
                error,
            });
        }
        tracing::warn!(
            task = %result.id,
            stage = %stage,
            backend = backend.as_deref().unwrap_or("-"),
            error = %error,
            "optional stage skipped"
        );
        let mut record = StageRecord::skipped(stage, error.to_string());
        if let Some(backend) = backend {
            record = record.with_backend(backend);
        }
        self.push(result, record);
        Ok(passthrough)
    }

    /// Resolve an optional-stage backend: the explicitly named one, or the
    /// best available by preference for the target language.
    async fn resolve_optional<T, F>(
        &self,
        kind: CapabilityKind,
        explicit: Option<String>,
        language: &str,
        resolve: F,
    ) -> std::result::Result<(String, T), (Option<String>, Error)>
    where
        T: Send + 'static,
        F: FnOnce(&CapabilityRegistry, &str) -> Result<T> + Send + 'static,
    {
        let preferences = self.preferences.for_kind(kind).to_vec();
        let constraints = SelectionConstraints::new().language(language);
        let requested = explicit.clone();

        self.lookup(move |r| {
            let name = match explicit {
                Some(name) => name,
                None => r.select(kind, &preferences, &constraints)?,
            };
            let backend = resolve(r, &name)?;
            Ok((name, backend))
        })
        .await
        .map_err(|e| (requested, e))
    }

    /// Registry probes may touch the filesystem; run them off the async workers.
    async fn lookup<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&CapabilityRegistry) -> Result<T> + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || f(&registry))
            .await
            .map_err(|e| Error::Io {
                source: std::io::Error::other(e),
            })?
    }
}

impl std::fmt::Debug for StageOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageOrchestrator")
            .field("registry", &self.registry)
            .field("translator", &self.translator.as_ref().map(|t| t.name().to_string()))
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

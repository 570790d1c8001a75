//! Shared fakes for pipeline integration tests.
//!
//! Every fake writes small real files so the orchestrator's artifact
//! bookkeeping and cleanup can be checked on disk.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use dubforge_core::{
    Backend, BackendHandle, BackendInfo, CapabilityKind, Error, LipSyncer, MediaInfo, MediaTool,
    Result, Segment, SpeechToText, Stage, StageStatus, SynthesisRequest, TaskResult,
    TextToSpeech, Transcript, Translator, VideoStreamInfo, VoiceCloner, VoiceModel,
};
use dubforge_pipeline::{CapabilityDescriptor, CapabilityRegistry, StageOrchestrator};

pub const STT: &str = "fake_stt";
pub const TTS: &str = "fake_tts";
pub const CLONER: &str = "fake_clone";
pub const LIPS: &str = "fake_lips";

// -- Helpers ------------------------------------------------------------------

pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"media").unwrap();
    path
}

/// `(stage, status)` pairs in record order.
pub fn stages(result: &TaskResult) -> Vec<(Stage, StageStatus)> {
    result.stages.iter().map(|r| (r.stage, r.status)).collect()
}

/// Stage positions strictly increase: no reordering, no repeats.
pub fn assert_topology(result: &TaskResult) {
    assert!(!result.stages.is_empty(), "no stage records");
    for pair in result.stages.windows(2) {
        assert!(
            pair[0].stage.position() < pair[1].stage.position(),
            "{} recorded before {}",
            pair[0].stage,
            pair[1].stage
        );
    }
}

/// Tracks how many instrumented calls are in flight at once.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Availability switch shared between a fake and its test.
#[derive(Debug, Clone)]
pub struct Switch(Arc<AtomicBool>);

impl Switch {
    pub fn new(on: bool) -> Self {
        Self(Arc::new(AtomicBool::new(on)))
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// -- Fake backends ------------------------------------------------------------

pub struct FakeStt {
    pub name: String,
    pub available: Switch,
    /// Detected language reported in transcripts.
    pub language: Option<String>,
    /// Fail when the audio file name contains this marker.
    pub fail_marker: Option<String>,
    pub delay: Duration,
    pub gauge: Arc<Gauge>,
}

impl FakeStt {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            available: Switch::new(true),
            language: Some("en".into()),
            fail_marker: None,
            delay: Duration::ZERO,
            gauge: Arc::new(Gauge::default()),
        }
    }
}

impl Backend for FakeStt {
    fn name(&self) -> &str {
        &self.name
    }
    fn info(&self) -> BackendInfo {
        BackendInfo::new("fake speech-to-text")
    }
    fn is_available(&self) -> bool {
        self.available.get()
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe(&self, audio: &Path, language_hint: Option<&str>) -> Result<Transcript> {
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.leave();

        let file_name = audio.file_name().unwrap_or_default().to_string_lossy();
        if let Some(marker) = &self.fail_marker {
            if file_name.contains(marker.as_str()) {
                return Err(Error::backend_unavailable(CapabilityKind::SpeechToText, &self.name));
            }
        }

        let language = language_hint.map(str::to_string).or_else(|| self.language.clone());
        Ok(Transcript::from_segments(
            vec![
                Segment {
                    start: 0.0,
                    end: 1.5,
                    text: "Hello there.".into(),
                    confidence: Some(0.9),
                },
                Segment {
                    start: 1.5,
                    end: 3.0,
                    text: "General Kenobi.".into(),
                    confidence: Some(0.7),
                },
            ],
            language,
        ))
    }
}

pub struct FakeTts {
    pub name: String,
    pub available: Switch,
    pub languages: Vec<String>,
}

impl FakeTts {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            available: Switch::new(true),
            languages: Vec::new(),
        }
    }
}

impl Backend for FakeTts {
    fn name(&self) -> &str {
        &self.name
    }
    fn info(&self) -> BackendInfo {
        BackendInfo::new("fake text-to-speech").with_languages(self.languages.clone())
    }
    fn is_available(&self) -> bool {
        self.available.get()
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<PathBuf> {
        if request.text.trim().is_empty() {
            return Err(Error::EmptyInput("no text".into()));
        }
        tokio::fs::write(request.output, request.text).await?;
        Ok(request.output.to_path_buf())
    }
}

pub struct FakeCloner {
    pub name: String,
    pub available: Switch,
}

impl FakeCloner {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            available: Switch::new(true),
        }
    }
}

impl Backend for FakeCloner {
    fn name(&self) -> &str {
        &self.name
    }
    fn info(&self) -> BackendInfo {
        BackendInfo::new("fake voice cloning")
    }
    fn is_available(&self) -> bool {
        self.available.get()
    }
}

#[async_trait]
impl VoiceCloner for FakeCloner {
    async fn clone_voice(&self, source: &Path, _reference: &Path, output: &Path) -> Result<PathBuf> {
        tokio::fs::copy(source, output).await?;
        Ok(output.to_path_buf())
    }

    async fn train_voice_model(&self, references: &[PathBuf], name: &str) -> Result<VoiceModel> {
        Ok(VoiceModel {
            name: name.into(),
            path: PathBuf::from(name),
            references: references.to_vec(),
        })
    }
}

pub struct FakeLipSync {
    pub name: String,
    pub available: Switch,
    pub calls: AtomicUsize,
}

impl FakeLipSync {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            available: Switch::new(true),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Backend for FakeLipSync {
    fn name(&self) -> &str {
        &self.name
    }
    fn info(&self) -> BackendInfo {
        BackendInfo::new("fake lip sync")
    }
    fn is_available(&self) -> bool {
        self.available.get()
    }
}

#[async_trait]
impl LipSyncer for FakeLipSync {
    async fn sync_lips(&self, _video: &Path, audio: &Path, output: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::copy(audio, output).await?;
        Ok(output.to_path_buf())
    }
}

pub struct PrefixTranslator;

#[async_trait]
impl Translator for PrefixTranslator {
    fn name(&self) -> &str {
        "prefix"
    }

    async fn translate(&self, text: &str, _source: Option<&str>, target: &str) -> Result<String> {
        Ok(format!("[{target}] {text}"))
    }
}

// -- Fake media tool ----------------------------------------------------------

/// Media collaborator that writes placeholder files and answers durations
/// from a table (30 s by default).
#[derive(Default)]
pub struct FakeMedia {
    pub durations: Mutex<HashMap<PathBuf, f64>>,
    pub fail_replace: AtomicBool,
}

impl FakeMedia {
    pub fn set_duration(&self, path: &Path, secs: f64) {
        self.durations.lock().insert(path.to_path_buf(), secs);
    }
}

#[async_trait]
impl MediaTool for FakeMedia {
    async fn extract_audio(&self, _video: &Path, output: &Path) -> Result<PathBuf> {
        tokio::fs::write(output, b"pcm").await?;
        Ok(output.to_path_buf())
    }

    async fn replace_audio_track(&self, _video: &Path, audio: &Path, output: &Path) -> Result<PathBuf> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(Error::tool("ffmpeg", "muxing failed"));
        }
        tokio::fs::copy(audio, output).await?;
        Ok(output.to_path_buf())
    }

    async fn export_audio(&self, audio: &Path, output: &Path) -> Result<PathBuf> {
        tokio::fs::copy(audio, output).await?;
        Ok(output.to_path_buf())
    }

    async fn get_duration(&self, path: &Path) -> Result<f64> {
        Ok(self.durations.lock().get(path).copied().unwrap_or(30.0))
    }

    async fn get_media_info(&self, path: &Path) -> Result<MediaInfo> {
        Ok(MediaInfo {
            path: path.to_path_buf(),
            format_name: "mov,mp4".into(),
            duration: Some(30.0),
            size: 0,
            video: Some(VideoStreamInfo {
                codec: "h264".into(),
                width: 1280,
                height: 720,
                frame_rate: Some(25.0),
            }),
            audio_streams: 1,
        })
    }
}

// -- Fixture ------------------------------------------------------------------

/// One fake per capability kind, each with a handle kept for the test.
pub struct Fixture {
    pub stt: Arc<FakeStt>,
    pub tts: Arc<FakeTts>,
    pub cloner: Arc<FakeCloner>,
    pub lips: Arc<FakeLipSync>,
    pub media: Arc<FakeMedia>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_stt(FakeStt::new(STT))
    }

    pub fn with_stt(stt: FakeStt) -> Self {
        Self {
            stt: Arc::new(stt),
            tts: Arc::new(FakeTts::new(TTS)),
            cloner: Arc::new(FakeCloner::new(CLONER)),
            lips: Arc::new(FakeLipSync::new(LIPS)),
            media: Arc::new(FakeMedia::default()),
        }
    }

    pub fn registry(&self) -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        for handle in [
            BackendHandle::SpeechToText(self.stt.clone()),
            BackendHandle::TextToSpeech(self.tts.clone()),
            BackendHandle::VoiceCloning(self.cloner.clone()),
            BackendHandle::LipSync(self.lips.clone()),
        ] {
            registry.register_handle(handle).unwrap();
        }
        registry
    }

    pub fn orchestrator(&self) -> StageOrchestrator {
        StageOrchestrator::new(Arc::new(self.registry()), self.media.clone())
    }
}

/// Descriptor for a fake speech-to-text backend with a fixed availability.
pub fn stt_descriptor(name: &str, available: bool) -> CapabilityDescriptor {
    CapabilityDescriptor::new(BackendHandle::SpeechToText(Arc::new(FakeStt::new(name))))
        .with_availability(move || available)
}

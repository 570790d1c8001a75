mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use dubforge_av::ArtifactCleaner;
use dubforge_core::config::PreferencesConfig;
use dubforge_core::{DubbingTask, Stage, StageStatus, TaskStatus};
use dubforge_pipeline::{ProgressEvent, Reporter};

use common::*;

fn task(input: &std::path::Path, output: &std::path::Path) -> DubbingTask {
    DubbingTask::new(input, output, "es", STT, TTS).with_source_language(Some("en".into()))
}

// -- Tests --------------------------------------------------------------------

#[tokio::test]
async fn video_without_lip_sync_backend_replaces_audio_track() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let output = tmp.path().join("out/clip_es.mp4");

    let fixture = Fixture::new();
    fixture.lips.available.set(false);

    let result = fixture.orchestrator().run(task(&input, &output)).await;

    assert_eq!(result.status, TaskStatus::Completed, "error: {:?}", result.error);
    assert_eq!(
        stages(&result),
        vec![
            (Stage::ExtractAudio, StageStatus::Completed),
            (Stage::Transcribe, StageStatus::Completed),
            (Stage::Translate, StageStatus::Skipped),
            (Stage::Synthesize, StageStatus::Completed),
            (Stage::CloneVoice, StageStatus::Skipped),
            (Stage::ReplaceAudioTrack, StageStatus::Completed),
        ]
    );
    assert_topology(&result);
    assert_eq!(result.output.as_deref(), Some(output.as_path()));
    assert!(output.exists());
    assert!(result.error.is_none());
    assert_eq!(fixture.lips.calls.load(Ordering::SeqCst), 0);

    let transcribe = result.stage(Stage::Transcribe).unwrap();
    assert_eq!(transcribe.backend.as_deref(), Some(STT));
    let clone = result.stage(Stage::CloneVoice).unwrap();
    assert_eq!(clone.detail.as_deref(), Some("no voice reference requested"));
}

#[tokio::test]
async fn available_lip_sync_is_the_final_stage() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let output = tmp.path().join("clip_es.mp4");

    let fixture = Fixture::new();
    let result = fixture.orchestrator().run(task(&input, &output)).await;

    assert_eq!(result.status, TaskStatus::Completed);
    let last = result.last_stage().unwrap();
    assert_eq!(last.stage, Stage::LipSync);
    assert_eq!(last.backend.as_deref(), Some(LIPS));
    assert!(result.stage(Stage::ReplaceAudioTrack).is_none());
    assert_eq!(fixture.lips.calls.load(Ordering::SeqCst), 1);
    assert_topology(&result);
}

#[tokio::test]
async fn disabled_lip_sync_never_calls_backend() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let output = tmp.path().join("clip_es.mp4");

    let fixture = Fixture::new();
    let result = fixture
        .orchestrator()
        .run(task(&input, &output).with_lip_sync(false))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    let last = result.last_stage().unwrap();
    assert_eq!(last.stage, Stage::ReplaceAudioTrack);
    assert_eq!(last.detail.as_deref(), Some("lip sync disabled"));
    assert_eq!(fixture.lips.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_explicit_lip_sync_backend_falls_back() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mkv");
    let output = tmp.path().join("clip_es.mkv");

    let fixture = Fixture::new();
    let result = fixture
        .orchestrator()
        .run(task(&input, &output).with_lip_sync_backend(Some("sadtalker".into())))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    let last = result.last_stage().unwrap();
    assert_eq!(last.stage, Stage::ReplaceAudioTrack);
    assert!(last.detail.as_deref().unwrap().contains("sadtalker"));
}

#[tokio::test]
async fn matching_languages_skip_translation() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let output = tmp.path().join("clip_es.mp4");

    let fixture = Fixture::new();
    let orchestrator = fixture
        .orchestrator()
        .with_translator(Arc::new(PrefixTranslator));
    let result = orchestrator
        .run(task(&input, &output).with_source_language(Some("es".into())))
        .await;

    let translate = result.stage(Stage::Translate).unwrap();
    assert_eq!(translate.status, StageStatus::Skipped);
    assert_eq!(translate.detail.as_deref(), Some("source and target language match"));
}

#[tokio::test]
async fn detected_language_is_only_a_hint_when_source_unknown() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let output = tmp.path().join("clip_es.mp4");

    let mut stt = FakeStt::new(STT);
    stt.language = Some("es".into());
    let fixture = Fixture::with_stt(stt);
    let result = fixture
        .orchestrator()
        .with_translator(Arc::new(PrefixTranslator))
        .run(task(&input, &output).with_source_language(None))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    let translate = result.stage(Stage::Translate).unwrap();
    assert_eq!(translate.status, StageStatus::Completed);
    assert_eq!(translate.backend.as_deref(), Some("prefix"));
    assert_eq!(translate.detail.as_deref(), Some("es -> es"));
}

#[tokio::test]
async fn translator_output_is_synthesized() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "talk.wav");
    let output = tmp.path().join("talk_es.wav");

    let fixture = Fixture::new();
    let result = fixture
        .orchestrator()
        .with_translator(Arc::new(PrefixTranslator))
        .run(task(&input, &output))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    let translate = result.stage(Stage::Translate).unwrap();
    assert_eq!(translate.status, StageStatus::Completed);
    assert_eq!(translate.backend.as_deref(), Some("prefix"));

    let spoken = std::fs::read_to_string(&output).unwrap();
    assert_eq!(spoken, "[es] Hello there. General Kenobi.");
}

#[tokio::test]
async fn audio_input_skips_extraction_and_exports() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "podcast.mp3");
    let output = tmp.path().join("podcast_es.wav");

    let fixture = Fixture::new();
    let result = fixture.orchestrator().run(task(&input, &output)).await;

    assert_eq!(result.status, TaskStatus::Completed);
    let extract = result.stage(Stage::ExtractAudio).unwrap();
    assert_eq!(extract.status, StageStatus::Skipped);
    let last = result.last_stage().unwrap();
    assert_eq!(last.stage, Stage::ReplaceAudioTrack);
    assert_eq!(fixture.lips.calls.load(Ordering::SeqCst), 0);
    assert!(!result.intermediate_files.contains(&input));
}

#[tokio::test]
async fn unavailable_cloner_is_skipped_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let reference = touch(tmp.path(), "speaker.wav");
    let output = tmp.path().join("clip_es.mp4");

    let fixture = Fixture::new();
    fixture.cloner.available.set(false);
    let result = fixture
        .orchestrator()
        .run(task(&input, &output).with_voice_reference(Some(reference)))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    let clone = result.stage(Stage::CloneVoice).unwrap();
    assert_eq!(clone.status, StageStatus::Skipped);
    assert!(clone.detail.as_deref().unwrap().contains("not available")
        || clone.detail.as_deref().unwrap().contains("no voice cloning backend"));
}

#[tokio::test]
async fn available_cloner_feeds_final_stage() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let reference = touch(tmp.path(), "speaker.wav");
    let output = tmp.path().join("clip_es.mp4");

    let fixture = Fixture::new();
    let result = fixture
        .orchestrator()
        .run(task(&input, &output).with_voice_reference(Some(reference)))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    let clone = result.stage(Stage::CloneVoice).unwrap();
    assert_eq!(clone.status, StageStatus::Completed);
    assert_eq!(clone.backend.as_deref(), Some(CLONER));
    let cloned = clone.output.clone().unwrap();
    assert!(result.intermediate_files.contains(&cloned));
}

#[tokio::test]
async fn short_reference_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let reference = touch(tmp.path(), "speaker.wav");
    let output = tmp.path().join("clip_es.mp4");

    let fixture = Fixture::new();
    fixture.media.set_duration(&reference, 2.0);
    let result = fixture
        .orchestrator()
        .run(task(&input, &output).with_voice_reference(Some(reference)))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    let clone = result.stage(Stage::CloneVoice).unwrap();
    assert_eq!(clone.status, StageStatus::Skipped);
    assert!(clone.detail.as_deref().unwrap().contains("invalid reference audio"));
}

#[tokio::test]
async fn preferred_cloner_is_selected_when_unnamed() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let reference = touch(tmp.path(), "speaker.wav");
    let output = tmp.path().join("clip_es.mp4");

    let fixture = Fixture::new();
    let preferences = PreferencesConfig {
        voice_cloning: vec!["missing".into(), CLONER.into()],
        ..PreferencesConfig::default()
    };
    let result = fixture
        .orchestrator()
        .with_preferences(preferences)
        .run(task(&input, &output).with_voice_reference(Some(reference)))
        .await;

    let clone = result.stage(Stage::CloneVoice).unwrap();
    assert_eq!(clone.backend.as_deref(), Some(CLONER));
}

#[tokio::test]
async fn unavailable_stt_fails_without_later_stages() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let output = tmp.path().join("clip_es.mp4");

    let fixture = Fixture::new();
    fixture.stt.available.set(false);
    let result = fixture.orchestrator().run(task(&input, &output)).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(
        stages(&result),
        vec![
            (Stage::ExtractAudio, StageStatus::Completed),
            (Stage::Transcribe, StageStatus::Failed),
        ]
    );
    let error = result.error.as_deref().unwrap();
    assert!(error.starts_with("transcribe:"), "{error}");
    assert!(error.contains("not available"));
    assert!(result.output.is_none());
    assert!(!output.exists());
}

#[tokio::test]
async fn unregistered_tts_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let output = tmp.path().join("clip_es.mp4");

    let fixture = Fixture::new();
    let result = fixture
        .orchestrator()
        .run(DubbingTask::new(&input, &output, "es", STT, "coqui"))
        .await;

    assert_eq!(result.status, TaskStatus::Failed);
    let last = result.last_stage().unwrap();
    assert_eq!(last.stage, Stage::Synthesize);
    assert_eq!(last.status, StageStatus::Failed);
    assert_eq!(last.backend.as_deref(), Some("coqui"));
}

#[tokio::test]
async fn media_failure_at_final_stage_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let output = tmp.path().join("clip_es.mp4");

    let fixture = Fixture::new();
    fixture.media.fail_replace.store(true, Ordering::SeqCst);
    let result = fixture
        .orchestrator()
        .run(task(&input, &output).with_lip_sync(false))
        .await;

    assert_eq!(result.status, TaskStatus::Failed);
    let last = result.last_stage().unwrap();
    assert_eq!((last.stage, last.status), (Stage::ReplaceAudioTrack, StageStatus::Failed));
    assert!(result.error.as_deref().unwrap().contains("muxing failed"));
    assert_topology(&result);
}

#[tokio::test]
async fn unsupported_and_missing_inputs_fail_first_stage() {
    let tmp = tempfile::tempdir().unwrap();
    let notes = touch(tmp.path(), "notes.txt");
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();

    let result = orchestrator
        .run(task(&notes, &tmp.path().join("notes_es.txt")))
        .await;
    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(stages(&result), vec![(Stage::ExtractAudio, StageStatus::Failed)]);
    assert!(result.error.as_deref().unwrap().contains("unsupported format"));

    let result = orchestrator
        .run(task(&tmp.path().join("ghost.mp4"), &tmp.path().join("ghost_es.mp4")))
        .await;
    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(stages(&result), vec![(Stage::ExtractAudio, StageStatus::Failed)]);
}

#[tokio::test]
async fn intermediates_are_unique_per_output_and_cleanable() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    let a = touch(tmp.path(), "clip.mp4");
    std::fs::create_dir(tmp.path().join("other")).unwrap();
    let b = touch(&tmp.path().join("other"), "clip.mp4");

    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator().with_work_dir(Some(work.clone()));
    let ra = orchestrator
        .run(task(&a, &tmp.path().join("out1/clip.mp4")))
        .await;
    let rb = orchestrator
        .run(task(&b, &tmp.path().join("out2/clip.mp4")))
        .await;

    assert_eq!(ra.status, TaskStatus::Completed);
    assert_eq!(rb.status, TaskStatus::Completed);
    assert!(!ra.intermediate_files.is_empty());
    for path in &ra.intermediate_files {
        assert!(path.starts_with(&work));
        assert!(!rb.intermediate_files.contains(path));
    }

    let report = ArtifactCleaner::new().clean(&ra).await;
    assert!(report.failed.is_empty());
    for path in &ra.intermediate_files {
        assert!(!path.exists());
    }
    assert!(ra.output.as_ref().unwrap().exists());
    assert!(a.exists());
}

#[tokio::test]
async fn reporter_sees_each_stage_as_it_finishes() {
    let tmp = tempfile::tempdir().unwrap();
    let input = touch(tmp.path(), "clip.mp4");
    let output = tmp.path().join("clip_es.mp4");

    let (reporter, mut rx) = Reporter::channel();
    let fixture = Fixture::new();
    let result = fixture
        .orchestrator()
        .with_reporter(Arc::new(reporter))
        .run(task(&input, &output))
        .await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(ProgressEvent::TaskStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::TaskFinished { status: TaskStatus::Completed, .. })
    ));
    let stage_events = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::StageFinished { .. }))
        .count();
    assert_eq!(stage_events, result.stages.len());
}

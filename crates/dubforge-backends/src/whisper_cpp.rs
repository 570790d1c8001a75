//! whisper.cpp speech-to-text backend.
//!
//! Runs `whisper-cli` with JSON output into a scratch directory and maps
//! `transcription[]` entries to transcript segments.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dubforge_av::ToolCommand;
use dubforge_core::config::WhisperCppConfig;
use dubforge_core::media::has_extension;
use dubforge_core::{
    Backend, BackendInfo, Error, QualityTier, Result, Segment, SpeechToText,
    Transcript,
};
use serde::Deserialize;

/// Inputs whisper-cli can decode directly.
const SUPPORTED_AUDIO: &[&str] = &["wav", "mp3", "flac", "ogg"];

#[derive(Debug, Clone)]
pub struct WhisperCppStt {
    binary: String,
    model: Option<PathBuf>,
    threads: Option<u32>,
    timeout: Duration,
}

impl WhisperCppStt {
    pub const NAME: &'static str = "whisper_cpp";

    pub fn new(config: &WhisperCppConfig, timeout: Duration) -> Self {
        Self {
            binary: config.binary.clone(),
            model: config.model.clone(),
            threads: config.threads,
            timeout,
        }
    }

    fn build_args(&self, audio: &Path, prefix: &Path, language: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "-f".to_owned(),
            audio.display().to_string(),
            "-of".to_owned(),
            prefix.display().to_string(),
            "-oj".to_owned(),
        ];
        if let Some(model) = &self.model {
            args.push("-m".to_owned());
            args.push(model.display().to_string());
        }
        args.push("-l".to_owned());
        args.push(language.unwrap_or("auto").to_owned());
        if let Some(threads) = self.threads {
            args.push("-t".to_owned());
            args.push(threads.to_string());
        }
        args
    }
}

impl Backend for WhisperCppStt {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn info(&self) -> BackendInfo {
        let mut info = BackendInfo::new("whisper.cpp local speech recognition (multilingual)")
            .with_quality_tiers(QualityTier::ALL)
            .with_requirement(format!("{} on PATH", self.binary));
        if let Some(model) = &self.model {
            info = info.with_requirement(format!("model file {}", model.display()));
        }
        info
    }

    fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok() && self.model.as_ref().map_or(true, |m| m.exists())
    }
}

#[async_trait]
impl SpeechToText for WhisperCppStt {
    async fn transcribe(&self, audio: &Path, language_hint: Option<&str>) -> Result<Transcript> {
        if !has_extension(audio, SUPPORTED_AUDIO) {
            return Err(Error::UnsupportedFormat(format!(
                "{} is not one of {}",
                audio.display(),
                SUPPORTED_AUDIO.join(", ")
            )));
        }
        // Inputs sharing a stem (talk.wav, talk.mp3) must not share a JSON file.
        let scratch = tempfile::Builder::new()
            .prefix("dubforge-whisper")
            .tempdir()
            .map_err(|e| Error::tool("whisper-cli", format!("cannot create output dir: {e}")))?;
        let prefix = scratch.path().join("transcript");
        let json_path = prefix.with_extension("json");

        tracing::info!(audio = %audio.display(), language = ?language_hint, "transcribing with whisper.cpp");

        let mut cmd = ToolCommand::new(&self.binary);
        cmd.timeout(self.timeout)
            .args(self.build_args(audio, &prefix, language_hint));
        cmd.execute().await?;

        let raw = tokio::fs::read_to_string(&json_path).await.map_err(|e| {
            Error::tool(
                "whisper-cli",
                format!("missing JSON output {}: {e}", json_path.display()),
            )
        })?;
        if let Err(e) = scratch.close() {
            tracing::debug!(error = %e, "could not remove whisper output dir");
        }

        let transcript = parse_whisper_json(&raw, language_hint)?;
        tracing::debug!(
            segments = transcript.segments.len(),
            language = ?transcript.language,
            "whisper.cpp transcription finished"
        );
        Ok(transcript)
    }
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    result: Option<WhisperResult>,
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperResult {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    offsets: WhisperOffsets,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperOffsets {
    from: u64,
    to: u64,
}

/// Map whisper-cli `-oj` output to a [`Transcript`].
pub fn parse_whisper_json(raw: &str, language_hint: Option<&str>) -> Result<Transcript> {
    let output: WhisperOutput =
        serde_json::from_str(raw).map_err(|e| Error::parse("whisper.cpp JSON", e))?;

    let segments = output
        .transcription
        .into_iter()
        .map(|s| Segment {
            start: s.offsets.from as f64 / 1000.0,
            end: s.offsets.to as f64 / 1000.0,
            text: s.text.trim().to_string(),
            confidence: None,
        })
        .collect();

    let language = output
        .result
        .and_then(|r| r.language)
        .or_else(|| language_hint.map(str::to_string));

    Ok(Transcript::from_segments(segments, language))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn backend() -> WhisperCppStt {
        let config = WhisperCppConfig {
            binary: "nonexistent_whisper_cli_xyz".into(),
            model: Some(PathBuf::from("/models/ggml-base.bin")),
            threads: Some(4),
        };
        WhisperCppStt::new(&config, Duration::from_secs(60))
    }

    #[test]
    fn args_include_json_model_and_language() {
        let args = backend().build_args(Path::new("a.wav"), Path::new("a.whisper"), Some("en"));
        assert_eq!(&args[..5], ["-f", "a.wav", "-of", "a.whisper", "-oj"]);
        assert!(args.windows(2).any(|w| w == ["-m", "/models/ggml-base.bin"]));
        assert!(args.windows(2).any(|w| w == ["-l", "en"]));
        assert!(args.windows(2).any(|w| w == ["-t", "4"]));
    }

    #[test]
    fn args_default_to_auto_language() {
        let args = backend().build_args(Path::new("a.wav"), Path::new("a.whisper"), None);
        assert!(args.windows(2).any(|w| w == ["-l", "auto"]));
    }

    #[test]
    fn parses_segments_and_language() {
        let raw = r#"{
            "result": {"language": "en"},
            "transcription": [
                {"offsets": {"from": 0, "to": 1500}, "text": " Hello there."},
                {"offsets": {"from": 1500, "to": 4000}, "text": " General Kenobi."}
            ]
        }"#;
        let t = parse_whisper_json(raw, None).unwrap();
        assert_eq!(t.text, "Hello there. General Kenobi.");
        assert_eq!(t.segments.len(), 2);
        assert_eq!(t.segments[1].start, 1.5);
        assert_eq!(t.segments[1].end, 4.0);
        assert_eq!(t.language.as_deref(), Some("en"));
    }

    #[test]
    fn language_falls_back_to_hint() {
        let t = parse_whisper_json(r#"{"transcription": []}"#, Some("de")).unwrap();
        assert!(t.is_empty());
        assert_eq!(t.language.as_deref(), Some("de"));
    }

    #[test]
    fn invalid_json_is_parse_error() {
        assert_matches!(parse_whisper_json("{", None), Err(Error::Parse { .. }));
    }

    #[tokio::test]
    async fn rejects_unsupported_format() {
        let err = backend()
            .transcribe(Path::new("clip.mp4"), None)
            .await
            .unwrap_err();
        assert_matches!(err, Error::UnsupportedFormat(_));
    }

    #[tokio::test]
    async fn missing_binary_fails_at_spawn() {
        let b = backend();
        assert!(!b.is_available());
        let err = b.transcribe(Path::new("clip.wav"), None).await.unwrap_err();
        assert_matches!(err, Error::ExternalToolFailure { ref tool, .. } if tool == "nonexistent_whisper_cli_xyz");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn same_stem_inputs_do_not_share_output() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("prefixes.log");
        // Fake whisper-cli: writes the input's file name as the transcript
        // and records the -of prefix it was given.
        let script = tmp.path().join("fake-whisper");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  case \"$1\" in\n    -f) f=\"$2\"; shift;;\n    -of) of=\"$2\"; shift;;\n  esac\n  shift\ndone\necho \"$of\" >> {}\nsleep 0.2\nprintf '{{\"transcription\":[{{\"offsets\":{{\"from\":0,\"to\":1000}},\"text\":\"%s\"}}]}}' \"$(basename \"$f\")\" > \"$of.json\"\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let audio_dir = tmp.path().join("audio");
        std::fs::create_dir(&audio_dir).unwrap();
        let wav = audio_dir.join("talk.wav");
        let mp3 = audio_dir.join("talk.mp3");
        std::fs::write(&wav, b"a").unwrap();
        std::fs::write(&mp3, b"b").unwrap();

        let config = WhisperCppConfig {
            binary: script.to_str().unwrap().into(),
            model: None,
            threads: None,
        };
        let b = WhisperCppStt::new(&config, Duration::from_secs(10));
        let (a, c) = tokio::join!(b.transcribe(&wav, Some("en")), b.transcribe(&mp3, Some("en")));
        assert_eq!(a.unwrap().text, "talk.wav");
        assert_eq!(c.unwrap().text, "talk.mp3");

        let prefixes: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(prefixes.len(), 2);
        assert_ne!(prefixes[0], prefixes[1]);
        assert!(prefixes.iter().all(|p| !Path::new(p).starts_with(&audio_dir)));
        let mut left: Vec<_> = std::fs::read_dir(&audio_dir).unwrap().map(|e| e.unwrap().file_name()).collect();
        left.sort();
        assert_eq!(left, ["talk.mp3", "talk.wav"]);
    }
}

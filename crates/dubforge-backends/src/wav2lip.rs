//! Wav2Lip lip-sync backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dubforge_av::ToolCommand;
use dubforge_core::config::Wav2LipConfig;
use dubforge_core::media::has_extension;
use dubforge_core::{Backend, BackendInfo, CapabilityKind, Error, LipSyncer, Result};

const INFERENCE_SCRIPT: &str = "inference.py";

#[derive(Debug, Clone)]
pub struct Wav2LipSync {
    python: String,
    repo_dir: PathBuf,
    checkpoint: Option<PathBuf>,
    timeout: Duration,
}

impl Wav2LipSync {
    pub const NAME: &'static str = "wav2lip";

    pub fn new(config: &Wav2LipConfig, timeout: Duration) -> Self {
        Self {
            python: config.python.clone(),
            repo_dir: config.repo_dir.clone(),
            checkpoint: config.checkpoint.clone(),
            timeout,
        }
    }

    fn script(&self) -> PathBuf {
        self.repo_dir.join(INFERENCE_SCRIPT)
    }

    fn build_args(&self, checkpoint: &Path, video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        vec![
            self.script().display().to_string(),
            "--checkpoint_path".into(),
            checkpoint.display().to_string(),
            "--face".into(),
            video.display().to_string(),
            "--audio".into(),
            audio.display().to_string(),
            "--outfile".into(),
            output.display().to_string(),
        ]
    }
}

/// Resolve `p` against the current directory; the script runs from the repo.
fn absolute(p: &Path) -> Result<PathBuf> {
    if p.is_absolute() {
        Ok(p.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(p))
    }
}

impl Backend for Wav2LipSync {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn info(&self) -> BackendInfo {
        let checkpoint = self
            .checkpoint
            .as_ref()
            .map(|c| c.display().to_string())
            .unwrap_or_else(|| "<unset>".into());
        BackendInfo::new("Wav2Lip lip synchronization")
            .with_requirement(format!("{} on PATH", self.python))
            .with_requirement(self.script().display().to_string())
            .with_requirement(format!("checkpoint {checkpoint}"))
    }

    fn is_available(&self) -> bool {
        which::which(&self.python).is_ok()
            && self.script().exists()
            && self.checkpoint.as_ref().is_some_and(|c| c.exists())
    }
}

#[async_trait]
impl LipSyncer for Wav2LipSync {
    async fn sync_lips(&self, video: &Path, audio: &Path, output: &Path) -> Result<PathBuf> {
        if !has_extension(video, self.video_formats()) {
            return Err(Error::UnsupportedFormat(format!(
                "lip sync cannot read video {}",
                video.display()
            )));
        }
        if !has_extension(audio, self.audio_formats()) {
            return Err(Error::UnsupportedFormat(format!(
                "lip sync cannot read audio {}",
                audio.display()
            )));
        }
        let checkpoint = match &self.checkpoint {
            Some(c) if c.exists() => absolute(c)?,
            _ => return Err(Error::backend_unavailable(CapabilityKind::LipSync, Self::NAME)),
        };

        let output = absolute(output)?;
        let args = self.build_args(&checkpoint, &absolute(video)?, &absolute(audio)?, &output);

        tracing::info!(video = %video.display(), output = %output.display(), "running Wav2Lip");

        ToolCommand::new(&self.python)
            .timeout(self.timeout)
            .current_dir(&self.repo_dir)
            .args(args)
            .execute()
            .await?;

        if !output.exists() {
            return Err(Error::tool(
                "wav2lip",
                format!("no video written to {}", output.display()),
            ));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn backend(repo: &Path, checkpoint: Option<PathBuf>) -> Wav2LipSync {
        let config = Wav2LipConfig {
            python: "python3".into(),
            repo_dir: repo.to_path_buf(),
            checkpoint,
        };
        Wav2LipSync::new(&config, Duration::from_secs(10))
    }

    #[test]
    fn args_follow_inference_cli() {
        let b = backend(Path::new("/opt/Wav2Lip"), None);
        let args = b.build_args(
            Path::new("/ckpt/wav2lip_gan.pth"),
            Path::new("/in/clip.mp4"),
            Path::new("/in/voice.wav"),
            Path::new("/out/clip.mp4"),
        );
        assert_eq!(
            args,
            vec![
                "/opt/Wav2Lip/inference.py",
                "--checkpoint_path",
                "/ckpt/wav2lip_gan.pth",
                "--face",
                "/in/clip.mp4",
                "--audio",
                "/in/voice.wav",
                "--outfile",
                "/out/clip.mp4",
            ]
        );
    }

    #[test]
    fn unavailable_without_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(INFERENCE_SCRIPT), b"").unwrap();
        assert!(!backend(tmp.path(), None).is_available());
        assert!(!backend(tmp.path(), Some(tmp.path().join("missing.pth"))).is_available());
    }

    #[tokio::test]
    async fn rejects_unsupported_formats() {
        let b = backend(Path::new("/opt/Wav2Lip"), None);
        assert_matches!(
            b.sync_lips(Path::new("a.webm"), Path::new("a.wav"), Path::new("o.mp4")).await,
            Err(Error::UnsupportedFormat(_))
        );
        assert_matches!(
            b.sync_lips(Path::new("a.mp4"), Path::new("a.ogg"), Path::new("o.mp4")).await,
            Err(Error::UnsupportedFormat(_))
        );
    }

    #[tokio::test]
    async fn missing_install_is_unavailable() {
        let b = backend(Path::new("/nonexistent/Wav2Lip"), None);
        assert_matches!(
            b.sync_lips(Path::new("a.mp4"), Path::new("a.wav"), Path::new("o.mp4")).await,
            Err(Error::BackendUnavailable { kind: CapabilityKind::LipSync, .. })
        );
    }
}

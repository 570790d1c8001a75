//! ffmpeg/ffprobe implementation of [`MediaTool`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dubforge_core::media::extension_lowercase;
use dubforge_core::{Error, MediaInfo, MediaTool, Result, VideoStreamInfo};
use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Media collaborator backed by the ffmpeg and ffprobe CLIs.
#[derive(Debug, Clone)]
pub struct FfmpegMedia {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl FfmpegMedia {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            timeout,
        }
    }

    /// Build from discovered tools. Fails if either ffmpeg or ffprobe is missing.
    pub fn from_registry(tools: &ToolRegistry) -> Result<Self> {
        Ok(Self::new(
            tools.require("ffmpeg")?.path.clone(),
            tools.require("ffprobe")?.path.clone(),
            tools.timeout(),
        ))
    }

    fn ffmpeg(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.ffmpeg);
        cmd.timeout(self.timeout).args(["-hide_banner", "-nostdin", "-y"]);
        cmd
    }

    fn ffprobe(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.ffprobe);
        cmd.timeout(self.timeout);
        cmd
    }
}

#[async_trait]
impl MediaTool for FfmpegMedia {
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<PathBuf> {
        tracing::info!(input = %video.display(), output = %output.display(), "extracting audio");

        let mut cmd = self.ffmpeg();
        cmd.arg("-i").path_arg(video);
        // 16 kHz mono PCM is what the speech recognizers expect.
        cmd.args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"]);
        cmd.path_arg(output);
        cmd.execute().await?;

        ensure_written("ffmpeg", output)?;
        Ok(output.to_path_buf())
    }

    async fn replace_audio_track(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<PathBuf> {
        tracing::info!(
            video = %video.display(),
            audio = %audio.display(),
            output = %output.display(),
            "replacing audio track"
        );

        let mut cmd = self.ffmpeg();
        cmd.arg("-i").path_arg(video);
        cmd.arg("-i").path_arg(audio);
        cmd.args(["-c:v", "copy", "-c:a", "aac", "-map", "0:v:0", "-map", "1:a:0"]);
        cmd.path_arg(output);
        cmd.execute().await?;

        ensure_written("ffmpeg", output)?;
        Ok(output.to_path_buf())
    }

    async fn export_audio(&self, audio: &Path, output: &Path) -> Result<PathBuf> {
        let ext = extension_lowercase(output).unwrap_or_default();
        let codec = audio_codec_for(&ext)
            .ok_or_else(|| Error::UnsupportedFormat(format!("cannot export audio as '.{ext}'")))?;

        tracing::info!(input = %audio.display(), output = %output.display(), codec, "exporting audio");

        let mut cmd = self.ffmpeg();
        cmd.arg("-i").path_arg(audio);
        cmd.args(["-vn", "-c:a", codec]);
        cmd.path_arg(output);
        cmd.execute().await?;

        ensure_written("ffmpeg", output)?;
        Ok(output.to_path_buf())
    }

    async fn get_duration(&self, path: &Path) -> Result<f64> {
        let mut cmd = self.ffprobe();
        cmd.args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"]);
        cmd.path_arg(path);
        let output = cmd.execute().await?;
        parse_duration(&output.stdout)
    }

    async fn get_media_info(&self, path: &Path) -> Result<MediaInfo> {
        let mut cmd = self.ffprobe();
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]);
        cmd.path_arg(path);
        let output = cmd.execute().await?;
        parse_probe_json(path, &output.stdout)
    }
}

/// ffmpeg encoder for an output audio container.
pub fn audio_codec_for(ext: &str) -> Option<&'static str> {
    match ext {
        "wav" => Some("pcm_s16le"),
        "mp3" => Some("libmp3lame"),
        "flac" => Some("flac"),
        "aac" | "m4a" => Some("aac"),
        "ogg" => Some("libvorbis"),
        _ => None,
    }
}

fn ensure_written(tool: &str, output: &Path) -> Result<()> {
    if output.exists() {
        Ok(())
    } else {
        Err(Error::tool(
            tool,
            format!("reported success but {} was not written", output.display()),
        ))
    }
}

fn parse_duration(stdout: &str) -> Result<f64> {
    let text = stdout.trim();
    text.parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| Error::parse("ffprobe duration", format!("unexpected output '{text}'")))
}

// ---------------------------------------------------------------------------
// ffprobe JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

/// Map `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_json(path: &Path, json: &str) -> Result<MediaInfo> {
    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| Error::parse("ffprobe JSON", e))?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok());

    let size = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| std::fs::metadata(path).ok().map(|m| m.len()))
        .unwrap_or(0);

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .map(|s| VideoStreamInfo {
            codec: s.codec_name.clone().unwrap_or_default(),
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            frame_rate: s.r_frame_rate.as_deref().and_then(parse_frame_rate),
        });

    let audio_streams = probe
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .count() as u32;

    Ok(MediaInfo {
        path: path.to_path_buf(),
        format_name: probe.format.format_name.unwrap_or_default(),
        duration,
        size,
        video,
        audio_streams,
    })
}

/// Parse `"30000/1001"` or `"25"`.
fn parse_frame_rate(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "r_frame_rate": "30000/1001"},
            {"codec_type": "audio", "codec_name": "aac"},
            {"codec_type": "audio", "codec_name": "ac3"}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.480000", "size": "2048000"}
    }"#;

    #[test]
    fn parses_probe_json() {
        let info = parse_probe_json(Path::new("clip.mp4"), PROBE_JSON).unwrap();
        assert_eq!(info.size, 2_048_000);
        assert_eq!(info.audio_streams, 2);
        assert_eq!(info.resolution(), Some((1920, 1080)));
        assert!((info.duration.unwrap() - 12.48).abs() < 1e-9);
        let fps = info.video.unwrap().frame_rate.unwrap();
        assert!((fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn audio_only_probe_has_no_video() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        let info = parse_probe_json(Path::new("/nonexistent/a.wav"), json).unwrap();
        assert!(info.video.is_none());
        assert_eq!(info.size, 0);
        assert_eq!(info.format_name, "");
    }

    #[test]
    fn malformed_probe_json_is_parse_error() {
        assert_matches!(
            parse_probe_json(Path::new("x.mp4"), "not json"),
            Err(Error::Parse { .. })
        );
    }

    #[test]
    fn parses_duration_output() {
        assert!((parse_duration("100.250000\n").unwrap() - 100.25).abs() < 1e-9);
        assert_matches!(parse_duration("N/A"), Err(Error::Parse { .. }));
    }

    #[test]
    fn frame_rates() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("24"), Some(24.0));
        assert_eq!(parse_frame_rate("0/0"), None);
    }

    #[test]
    fn export_codecs() {
        assert_eq!(audio_codec_for("wav"), Some("pcm_s16le"));
        assert_eq!(audio_codec_for("m4a"), Some("aac"));
        assert_eq!(audio_codec_for("mkv"), None);
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_tool_failure() {
        let media = FfmpegMedia::new(
            PathBuf::from("nonexistent_ffmpeg_xyz"),
            PathBuf::from("nonexistent_ffprobe_xyz"),
            Duration::from_secs(5),
        );
        let err = media
            .extract_audio(Path::new("in.mp4"), Path::new("out.wav"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::ExternalToolFailure { .. });
        assert_matches!(
            media.get_duration(Path::new("in.mp4")).await,
            Err(Error::ExternalToolFailure { .. })
        );
    }
}

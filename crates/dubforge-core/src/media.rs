//! Media classification and probe metadata.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Extensions treated as audio inputs.
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "aac", "ogg", "m4a"];

/// Extensions treated as video inputs.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

/// Coarse classification of a media file by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Unknown,
}

impl MediaKind {
    /// Classify a path by its (case-insensitive) extension.
    pub fn of(path: &Path) -> Self {
        let Some(ext) = extension_lowercase(path) else {
            return MediaKind::Unknown;
        };
        if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Audio
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Unknown
        }
    }

    pub fn is_audio(path: &Path) -> bool {
        Self::of(path) == MediaKind::Audio
    }

    pub fn is_video(path: &Path) -> bool {
        Self::of(path) == MediaKind::Video
    }
}

/// Lowercased extension without the leading dot.
pub fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Whether `path` has one of `allowed` extensions (case-insensitive).
pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    extension_lowercase(path)
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
        .unwrap_or(false)
}

/// Primary video stream details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
}

/// Structured metadata returned by the media collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    /// Container format name as reported by the probe tool.
    pub format_name: String,
    /// Duration in seconds.
    pub duration: Option<f64>,
    /// File size in bytes.
    pub size: u64,
    /// First video stream, if any.
    pub video: Option<VideoStreamInfo>,
    /// Number of audio streams.
    pub audio_streams: u32,
}

impl MediaInfo {
    /// `(width, height)` of the primary video stream.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.video.as_ref().map(|v| (v.width, v.height))
    }
}

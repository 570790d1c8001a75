//! # dubforge-av
//!
//! External media tool management for the dubforge pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe and the engine binaries the backends shell out to.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   stdin and working-directory support.
//! - **Media collaborator** ([`FfmpegMedia`]) -- implements
//!   [`dubforge_core::MediaTool`] on top of ffmpeg/ffprobe.
//! - **Artifact lifecycle** ([`TaskWorkspace`], [`ArtifactCleaner`]) --
//!   per-task intermediate naming and post-run cleanup.
//! - **Command templates** ([`TemplateContext`]) -- `{var}` substitution for
//!   user-configured command lines.

pub mod command;
pub mod ffmpeg;
pub mod template;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use ffmpeg::FfmpegMedia;
pub use template::TemplateContext;
pub use tools::{ToolInfo, ToolRegistry};
pub use workspace::{ArtifactCleaner, CleanupReport, TaskWorkspace};

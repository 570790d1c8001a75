//! External tool detection.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the external
//! CLI tools dubforge shells out to and provides lookup methods for the media
//! collaborator and the backends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dubforge_core::config::ToolsConfig;
use dubforge_core::Error;
use serde::{Deserialize, Serialize};

/// Tools every installation needs.
const MEDIA_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// A resolved executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of the tool's version output, if it could be read.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool locations.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    /// Every name probed, in probe order.
    names: Vec<String>,
    tools: HashMap<String, ToolConfig>,
    timeout: Duration,
}

impl ToolRegistry {
    /// Discover ffmpeg and ffprobe, honouring configured overrides.
    ///
    /// A configured path is used when it exists; otherwise the tool is looked
    /// up on `PATH`. Missing tools are recorded but not fatal.
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut registry = Self {
            names: Vec::new(),
            tools: HashMap::new(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        };

        for &name in MEDIA_TOOLS {
            let custom = match name {
                "ffmpeg" => config.ffmpeg_path.as_deref(),
                "ffprobe" => config.ffprobe_path.as_deref(),
                _ => None,
            };
            registry.probe(name, name, custom);
        }

        registry
    }

    /// Additionally probe an engine binary (whisper-cli, piper, python3, ...).
    ///
    /// `program` may be a bare name or a path.
    pub fn with_tool(mut self, name: &str, program: &str) -> Self {
        let as_path = Path::new(program);
        let custom = (as_path.components().count() > 1).then_some(as_path);
        self.probe(name, program, custom);
        self
    }

    fn probe(&mut self, name: &str, program: &str, custom: Option<&Path>) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }

        let resolved = match custom {
            Some(p) if p.exists() => Some(p.to_path_buf()),
            Some(p) => {
                tracing::warn!(tool = name, path = %p.display(), "configured tool path does not exist, searching PATH");
                which::which(program).ok()
            }
            None => which::which(program).ok(),
        };

        match resolved {
            Some(path) => {
                tracing::debug!(tool = name, path = %path.display(), "tool found");
                self.tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                    },
                );
            }
            None => tracing::debug!(tool = name, "tool not found"),
        }
    }

    /// Return the [`ToolConfig`] for `name`, or [`Error::ExternalToolFailure`]
    /// if it was not found during discovery.
    pub fn require(&self, name: &str) -> dubforge_core::Result<&ToolConfig> {
        self.tools
            .get(name)
            .ok_or_else(|| Error::tool(name, format!("{name} not found; is it installed and in PATH?")))
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Per-invocation timeout configured for external tools.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check all probed tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        self.names
            .iter()
            .map(|name| match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.clone(),
                    available: true,
                    version: detect_version(name, &cfg.path),
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.clone(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run the tool's version flag and return the first non-empty output line.
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        "whisper_cpp" => "--help",
        _ => "--version",
    };

    let output = std::process::Command::new(path)
        .arg(version_arg)
        .output()
        .ok()?;

    // Some engines print their banner to stderr.
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };

    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

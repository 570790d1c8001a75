//! Configuration file loading.
//!
//! The config types live in [`dubforge_core::config`]; this module finds,
//! parses and validates the TOML file the binary runs with.

pub use dubforge_core::config::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Locations searched, in order, when no `--config` is given.
pub const DEFAULT_PATHS: &[&str] = &[
    "./dubforge.toml",
    "~/.config/dubforge/config.toml",
    "/etc/dubforge/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;
    expand_paths(&mut config);

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    if let Some(path) = find_default_config() {
        tracing::debug!(path = %path.display(), "using config file");
        return load_config(&path);
    }

    tracing::debug!("no config file found, using defaults");
    Ok(Config::default())
}

/// First existing file among [`DEFAULT_PATHS`].
pub fn find_default_config() -> Option<PathBuf> {
    DEFAULT_PATHS.iter().find_map(|path_str| {
        let path = PathBuf::from(shellexpand::tilde(path_str).as_ref());
        path.exists().then_some(path)
    })
}

/// Fail on fatal misconfiguration, log the rest.
pub fn validate_config(config: &Config) -> Result<()> {
    let errors = config.fatal_errors();
    if let Some(first) = errors.first() {
        if errors.len() > 1 {
            anyhow::bail!("{first} (and {} more problems)", errors.len() - 1);
        }
        anyhow::bail!("{first}");
    }

    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    Ok(())
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

/// Expand `~` in every path-valued setting.
fn expand_paths(config: &mut Config) {
    let tools = &mut config.tools;
    for p in [&mut tools.ffmpeg_path, &mut tools.ffprobe_path, &mut config.paths.work_dir]
        .into_iter()
        .flatten()
    {
        *p = expand(p);
    }

    let backends = &mut config.backends;
    if let Some(model) = backends.whisper_cpp.model.as_mut() {
        *model = expand(model);
    }
    for voice in backends.piper.voices.values_mut() {
        *voice = expand(voice);
    }
    backends.voice_clone.model_dir = expand(&backends.voice_clone.model_dir);
    backends.wav2lip.repo_dir = expand(&backends.wav2lip.repo_dir);
    if let Some(checkpoint) = backends.wav2lip.checkpoint.as_mut() {
        *checkpoint = expand(checkpoint);
    }
}

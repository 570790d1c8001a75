//! Unified error type for dubforge.
//!
//! All crates funnel their failures into [`Error`]. The variants mirror the
//! failure taxonomy the orchestrator reasons about: whether a failure is fatal
//! depends on the stage it happens in, and [`Error::is_recoverable`] tells an
//! optional stage whether it may degrade instead of failing the task.

use std::fmt;
use std::path::PathBuf;

use crate::capability::CapabilityKind;

/// Unified error type covering all failure modes in dubforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested or selected backend is not usable right now.
    #[error("{kind} backend '{name}' is not available")]
    BackendUnavailable {
        /// Capability kind the backend belongs to.
        kind: CapabilityKind,
        /// Registered backend name.
        name: String,
    },

    /// No registered backend of this kind is available at all.
    #[error("no {0} backend is available")]
    NoBackendAvailable(CapabilityKind),

    /// A backend with the same name is already registered for this kind.
    #[error("{kind} backend '{name}' is already registered")]
    DuplicateBackend {
        kind: CapabilityKind,
        name: String,
    },

    /// The input file format is not recognized by the stage or backend.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The backend cannot produce output in the requested language.
    #[error("backend '{backend}' does not support language '{language}'")]
    UnsupportedLanguage {
        backend: String,
        language: String,
    },

    /// The backend was handed nothing to work with.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Voice-cloning reference audio is unusable.
    #[error("invalid reference audio: {0}")]
    ReferenceAudioInvalid(String),

    /// An external tool (ffmpeg, whisper-cli, piper, ...) failed.
    #[error("tool error [{tool}]: {message}")]
    ExternalToolFailure {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Discovering batch inputs failed before any item ran.
    #[error("failed to enumerate inputs in {}: {message}", path.display())]
    EnumerationFailure { path: PathBuf, message: String },

    /// Configuration or request data failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Tool output could not be parsed.
    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Convenience constructor for [`Error::BackendUnavailable`].
    pub fn backend_unavailable(kind: CapabilityKind, name: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            kind,
            name: name.into(),
        }
    }

    /// Convenience constructor for [`Error::ExternalToolFailure`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ExternalToolFailure {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::EnumerationFailure`].
    pub fn enumeration(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Error::EnumerationFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Parse`].
    pub fn parse(what: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// Whether an optional stage may recover from this error by skipping.
    ///
    /// Mandatory stages treat every error as fatal regardless of this value.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable { .. }
                | Error::NoBackendAvailable(_)
                | Error::UnsupportedFormat(_)
                | Error::UnsupportedLanguage { .. }
                | Error::ReferenceAudioInvalid(_)
                | Error::ExternalToolFailure { .. }
                | Error::Parse { .. }
        )
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

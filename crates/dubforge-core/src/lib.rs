//! dubforge-core: shared types, errors, backend contracts, and configuration.
//!
//! This crate is the foundational dependency for all other dubforge crates,
//! providing the error taxonomy, capability kinds, the dubbing task and result
//! data model, the collaborator traits every backend implements, and the
//! application configuration types.

pub mod backend;
pub mod capability;
pub mod config;
pub mod error;
pub mod media;
pub mod task;
pub mod transcript;

// Re-export the most commonly used items at the crate root.
pub use backend::{
    validate_reference_duration, Backend, BackendHandle, BackendInfo, LipSyncer, MediaTool,
    SpeechToText, SynthesisRequest, TextToSpeech, Translator, VoiceCloner, VoiceModel,
    DEFAULT_REFERENCE_RANGE,
};
pub use capability::{CapabilityKind, QualityTier};
pub use config::Config;
pub use error::{Error, Result};
pub use media::{MediaInfo, MediaKind, VideoStreamInfo};
pub use task::{DubbingTask, Stage, StageRecord, StageStatus, TaskResult, TaskStatus};
pub use transcript::{flatten_segments, Segment, Transcript};

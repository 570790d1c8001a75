//! # dubforge-pipeline
//!
//! The dubbing orchestration core.
//!
//! - **[`CapabilityRegistry`]** -- per-kind backend registry with live
//!   availability probes and deterministic preference-ordered selection.
//! - **[`StageOrchestrator`]** -- drives one task through the fixed stage
//!   sequence, recording a [`StageRecord`](dubforge_core::StageRecord) per stage.
//! - **[`BatchScheduler`]** -- runs many tasks under a concurrency bound with
//!   per-item failure isolation.
//! - **[`QualityValidator`]** -- post-hoc advisory checks on a produced file.
//! - **[`Reporter`]** -- progress callback handed in by the caller.

pub mod batch;
pub mod orchestrator;
pub mod quality;
pub mod registry;
pub mod report;

// Re-export key types at the crate root.
pub use batch::{BatchResult, BatchScheduler};
pub use orchestrator::StageOrchestrator;
pub use quality::{QualityValidator, ValidationReport};
pub use registry::{AvailabilityProbe, CapabilityDescriptor, CapabilityRegistry, SelectionConstraints};
pub use report::{ProgressEvent, Reporter};

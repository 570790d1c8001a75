//! Per-task intermediate file naming and cleanup.
//!
//! A [`TaskWorkspace`] derives every intermediate path from the task's output
//! path, so two tasks with different outputs never write the same file even
//! when they share a work directory. [`ArtifactCleaner`] removes those files
//! once the task has terminated.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use dubforge_core::{Result, TaskResult};
use serde::Serialize;

/// Naming policy for one task's intermediates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskWorkspace {
    dir: PathBuf,
    stem: String,
}

impl TaskWorkspace {
    /// Intermediates for `output` live next to it, or in `work_dir` when set.
    ///
    /// In a shared `work_dir` the stem carries a digest of the full output
    /// path, since outputs from different directories may share a file name.
    pub fn for_output(output: &Path, work_dir: Option<&Path>) -> Self {
        let base_stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        match work_dir {
            Some(dir) => {
                let mut hasher = DefaultHasher::new();
                output.hash(&mut hasher);
                Self {
                    dir: dir.to_path_buf(),
                    stem: format!("{base_stem}-{:08x}", hasher.finish() as u32),
                }
            }
            None => Self {
                dir: output
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(".")),
                stem: base_stem,
            },
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<stem>.<label>.<ext>`
    pub fn artifact(&self, label: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{label}.{ext}", self.stem))
    }

    /// Create the workspace directory if it is missing.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Paths that could not be removed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Removes a task's intermediate files after it has terminated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactCleaner;

impl ArtifactCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Remove `result`'s intermediates. The task input and final output are
    /// never touched, and a still-processing result is left alone.
    pub async fn clean(&self, result: &TaskResult) -> CleanupReport {
        let mut report = CleanupReport::default();

        if !result.is_terminal() {
            tracing::warn!(task = %result.id, "refusing to clean a task that is still processing");
            return report;
        }

        for path in &result.intermediate_files {
            if path == &result.task.input || result.output.as_deref() == Some(path.as_path()) {
                continue;
            }
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "removed intermediate");
                    report.removed.push(path.clone());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove intermediate");
                    report.failed.push((path.clone(), e.to_string()));
                }
            }
        }

        report
    }
}

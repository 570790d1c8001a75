//! Bounded-concurrency batch execution.
//!
//! Every input becomes one independent unit of work on a [`JoinSet`]. A unit
//! waits for a semaphore permit, runs the orchestrator to a terminal
//! [`TaskResult`] and hands it back. Results are aggregated in completion
//! order; nothing an item does can fail another item or the batch.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dubforge_core::config::BatchConfig;
use dubforge_core::media::{has_extension, VIDEO_EXTENSIONS};
use dubforge_core::{DubbingTask, Error, Result, TaskResult, TaskStatus};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::StageOrchestrator;
use crate::report::{ProgressEvent, Reporter};

/// Aggregate outcome of a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Item results in completion order.
    pub results: Vec<TaskResult>,
}

impl BatchResult {
    fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    fn push(&mut self, result: TaskResult) {
        match result.status {
            TaskStatus::Completed => self.completed += 1,
            _ => self.failed += 1,
        }
        self.results.push(result);
    }

    /// Result for `input`, if it was part of this batch.
    pub fn find(&self, input: &Path) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task.input == input)
    }
}

/// Runs many dubbing tasks with at most `max_concurrency` in flight.
#[derive(Debug)]
pub struct BatchScheduler {
    orchestrator: Arc<StageOrchestrator>,
    max_concurrency: usize,
    reporter: Arc<Reporter>,
    cancel: CancellationToken,
    output_suffix: String,
    extensions: Vec<String>,
}

impl BatchScheduler {
    /// # Errors
    ///
    /// [`Error::Validation`] when `max_concurrency` is zero.
    pub fn new(orchestrator: Arc<StageOrchestrator>, max_concurrency: usize) -> Result<Self> {
        if max_concurrency == 0 {
            return Err(Error::Validation("batch max_concurrency must be at least 1".into()));
        }
        Ok(Self {
            orchestrator,
            max_concurrency,
            reporter: Arc::new(Reporter::noop()),
            cancel: CancellationToken::new(),
            output_suffix: "_dubbed".into(),
            extensions: VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        })
    }

    /// Scheduler configured from the `[batch]` config section.
    pub fn from_config(orchestrator: Arc<StageOrchestrator>, config: &BatchConfig) -> Result<Self> {
        Ok(Self::new(orchestrator, config.max_concurrency)?
            .with_output_suffix(&config.output_suffix)
            .with_extensions(config.extensions.iter().cloned()))
    }

    pub fn with_reporter(mut self, reporter: Arc<Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Stop admitting new items once `token` is cancelled. Items already
    /// running finish normally.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_output_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.output_suffix = suffix.into();
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Media files directly inside `dir`, sorted by path.
    ///
    /// # Errors
    ///
    /// [`Error::EnumerationFailure`] if `dir` is missing or unreadable.
    pub fn enumerate(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(Error::enumeration(dir, "not an existing directory"));
        }

        let extensions: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| Error::enumeration(dir, e))?;
            if entry.file_type().is_file() && has_extension(entry.path(), &extensions) {
                files.push(entry.into_path());
            }
        }
        files.sort();

        tracing::info!(dir = %dir.display(), count = files.len(), "enumerated batch inputs");
        Ok(files)
    }

    /// `<output_dir>/<stem><suffix><ext>`
    pub fn output_path(&self, input: &Path, output_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".into());
        let ext = input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        output_dir.join(format!("{stem}{}{ext}", self.output_suffix))
    }

    /// One output per input, in order. Inputs that share a file name get
    /// `_2`, `_3`, ... after the suffix so no two items write the same output
    /// or intermediates.
    pub fn output_paths(&self, files: &[PathBuf], output_dir: &Path) -> Vec<PathBuf> {
        let mut taken = HashSet::with_capacity(files.len());
        files
            .iter()
            .map(|file| {
                let base = self.output_path(file, output_dir);
                let mut candidate = base.clone();
                let mut n = 2;
                while !taken.insert(candidate.clone()) {
                    candidate = numbered(&base, n);
                    n += 1;
                }
                candidate
            })
            .collect()
    }

    /// Dub every media file in `input_dir` into `output_dir`.
    pub async fn run_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        template: &DubbingTask,
    ) -> Result<BatchResult> {
        let inputs = self.enumerate(input_dir)?;
        self.run_files(&inputs, output_dir, template).await
    }

    /// Dub an explicit list of files into `output_dir`. Missing files are
    /// dropped with a warning.
    pub async fn run_files(
        &self,
        files: &[PathBuf],
        output_dir: &Path,
        template: &DubbingTask,
    ) -> Result<BatchResult> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| Error::enumeration(output_dir, e))?;

        let present: Vec<PathBuf> = files
            .iter()
            .filter(|file| {
                let exists = file.exists();
                if !exists {
                    tracing::warn!(file = %file.display(), "skipping missing batch input");
                }
                exists
            })
            .cloned()
            .collect();
        let outputs = self.output_paths(&present, output_dir);

        Ok(self
            .run_inputs(present.into_iter().zip(outputs).collect(), template)
            .await)
    }

    /// Run one task per `(input, output)` pair derived from `template`. A
    /// pair whose output was already claimed by an earlier pair fails without
    /// running.
    pub async fn run_inputs(
        &self,
        inputs: Vec<(PathBuf, PathBuf)>,
        template: &DubbingTask,
    ) -> BatchResult {
        let total = inputs.len();
        let mut batch = BatchResult::with_total(total);

        tracing::info!(total, max_concurrency = self.max_concurrency, "starting batch");
        self.reporter.send(ProgressEvent::BatchStarted { total });

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut units = JoinSet::new();
        let mut tasks = Vec::with_capacity(total);
        let mut claimed = HashSet::with_capacity(total);

        for (index, (input, output)) in inputs.into_iter().enumerate() {
            let task = template.retarget(input, output);
            tasks.push(task.clone());

            if !claimed.insert(task.output.clone()) {
                tracing::warn!(
                    input = %task.input.display(),
                    output = %task.output.display(),
                    "batch output already claimed by another item"
                );
                units.spawn(async move {
                    (index, failed_result(task, "output path collides with another batch item"))
                });
                continue;
            }

            let sem = semaphore.clone();
            let cancel = self.cancel.clone();
            let orchestrator = self.orchestrator.clone();

            units.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = sem.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return (index, failed_result(task, "cancelled before start"));
                };

                let fallback = task.clone();
                match AssertUnwindSafe(orchestrator.run(task)).catch_unwind().await {
                    Ok(result) => (index, result),
                    Err(_) => (index, failed_result(fallback, "task panicked")),
                }
            });
        }

        let mut finished = vec![false; total];
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((index, result)) => {
                    finished[index] = true;
                    self.collect(&mut batch, result);
                }
                Err(e) => tracing::error!(error = %e, "batch unit aborted"),
            }
        }

        // Units that never reported still count toward the total.
        for (index, task) in tasks.into_iter().enumerate() {
            if !finished[index] {
                self.collect(&mut batch, failed_result(task, "aborted"));
            }
        }

        tracing::info!(
            total,
            completed = batch.completed,
            failed = batch.failed,
            "batch finished"
        );
        self.reporter.send(ProgressEvent::BatchFinished {
            total,
            completed: batch.completed,
            failed: batch.failed,
        });
        batch
    }

    fn collect(&self, batch: &mut BatchResult, result: TaskResult) {
        let input = result.task.input.clone();
        let status = result.status;
        match &result.error {
            Some(error) => tracing::warn!(input = %input.display(), error = %error, "batch item failed"),
            None => tracing::info!(input = %input.display(), "batch item completed"),
        }
        batch.push(result);
        self.reporter.send(ProgressEvent::ItemFinished {
            input,
            status,
            completed: batch.completed,
            failed: batch.failed,
            total: batch.total,
        });
    }
}

/// `<dir>/<stem>_<n><ext>` for an already derived output path.
fn numbered(base: &Path, n: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = base
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    base.with_file_name(format!("{stem}_{n}{ext}"))
}

fn failed_result(task: DubbingTask, reason: &str) -> TaskResult {
    let mut result = TaskResult::new(task);
    result.fail(reason);
    result
}

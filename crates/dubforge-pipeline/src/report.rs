//! Progress reporting handed to the orchestrator and scheduler.
//!
//! The pipeline never configures logging; callers observe progress through a
//! [`Reporter`] they construct and pass in.

use std::path::PathBuf;

use dubforge_core::{StageRecord, TaskStatus};
use serde::Serialize;
use tokio::sync::mpsc;

/// Something observable happened.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    TaskStarted {
        input: PathBuf,
    },
    StageFinished {
        input: PathBuf,
        record: StageRecord,
    },
    TaskFinished {
        input: PathBuf,
        status: TaskStatus,
        error: Option<String>,
    },
    BatchStarted {
        total: usize,
    },
    /// One batch item terminated. Counts include this item.
    ItemFinished {
        input: PathBuf,
        status: TaskStatus,
        completed: usize,
        failed: usize,
        total: usize,
    },
    BatchFinished {
        total: usize,
        completed: usize,
        failed: usize,
    },
}

/// Callback sink for [`ProgressEvent`]s.
pub struct Reporter {
    callback: Box<dyn Fn(&ProgressEvent) + Send + Sync>,
}

impl Reporter {
    pub fn new(callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Discard every event.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    /// Forward events into an unbounded channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = Self::new(move |event| {
            // Receiver gone means nobody is listening any more.
            let _ = tx.send(event.clone());
        });
        (reporter, rx)
    }

    pub fn send(&self, event: ProgressEvent) {
        (self.callback)(&event);
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

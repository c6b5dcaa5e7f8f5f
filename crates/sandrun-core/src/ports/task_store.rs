//! TaskStore port: the persistence boundary.
//!
//! The store is the source of truth for task records, per-line logs, and
//! collected artifacts. The workflow driver never talks to it directly; the
//! task service persists on the consumer side of the output relay.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{DispatchError, OutputLine, TaskId, TaskRecord};

/// One persisted artifact reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRow {
    pub file_path: String,
    pub download_url: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("{0}")]
    Backend(String),
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        DispatchError::Storage(err.to_string())
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a freshly accepted (pending) record.
    async fn create(&self, record: TaskRecord) -> Result<(), StoreError>;

    /// Record the pending -> running transition.
    async fn mark_running(&self, id: TaskId, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Append one log row for one output line.
    async fn append_log(
        &self,
        id: TaskId,
        line: &OutputLine,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Record the terminal transition with the final outcome fields.
    async fn finish(
        &self,
        id: TaskId,
        success: bool,
        message: &str,
        output_files: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Persist artifact rows for a finished task.
    async fn add_artifacts(&self, id: TaskId, artifacts: &[ArtifactRow]) -> Result<(), StoreError>;

    async fn fetch(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;
}

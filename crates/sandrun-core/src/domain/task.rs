//! Task record and its state machine.
//!
//! State transitions:
//! - Pending -> Running (exactly once, when the workflow starts)
//! - Running -> Succeeded | Failed (exactly once, when the outcome is known)
//!
//! Terminal states have no outgoing transitions. A repeated transition is a
//! programming defect; it is logged and ignored rather than surfaced to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::ids::{SessionId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// Metadata for one dispatched task.
///
/// Mutated only through the transition methods below; the log-append path
/// lives in the store and never touches these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub session_id: SessionId,
    pub prompt: String,
    pub skills: Vec<String>,
    pub integrations: Vec<String>,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub message: Option<String>,
    pub output_files: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        session_id: SessionId,
        prompt: impl Into<String>,
        skills: Vec<String>,
        integrations: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_id,
            prompt: prompt.into(),
            skills,
            integrations,
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            success: None,
            message: None,
            output_files: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending -> Running. Any other source state is a defect.
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        if self.status != TaskStatus::Pending {
            error!(task_id = %self.id, status = self.status.as_str(), "mark_running on non-pending task ignored");
            return;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
        self.updated_at = now;
    }

    /// Running -> Succeeded | Failed. Any other source state is a defect.
    pub fn mark_finished(
        &mut self,
        success: bool,
        message: impl Into<String>,
        output_files: Vec<String>,
        now: DateTime<Utc>,
    ) {
        if self.status != TaskStatus::Running {
            error!(task_id = %self.id, status = self.status.as_str(), "mark_finished on non-running task ignored");
            return;
        }
        self.status = if success {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };
        self.success = Some(success);
        self.message = Some(message.into());
        self.output_files = output_files;
        self.finished_at = Some(now);
        self.updated_at = now;
    }
}

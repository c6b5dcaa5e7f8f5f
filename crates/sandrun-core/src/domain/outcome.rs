//! Execution outcome: the single final result of one workflow run.

use serde::{Deserialize, Serialize};

/// Produced exactly once per task by the workflow driver, consumed through the
/// result promise. Artifacts are bare file names; the download URL is derived
/// from configuration at the persistence boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub message: String,
    pub artifacts: Vec<String>,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, artifacts: Vec<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            artifacts,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            artifacts: Vec::new(),
        }
    }
}

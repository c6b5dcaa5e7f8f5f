//! Error taxonomy for the dispatch pipeline.
//!
//! - `Validation`: request rejected before any task exists; no environment side effects.
//! - `CapabilityMissing`: requested skills/MCPs absent; raised before install/run.
//! - `RemoteExecution`: a step's command failed; fatality is decided by the driver.
//! - `EnvironmentLifecycle`: sandbox create/terminate failure.
//! - `Storage`: persistence boundary failure.

use thiserror::Error;

fn capability_message(skills: &[String], mcps: &[String]) -> String {
    let mut parts = Vec::new();
    if !skills.is_empty() {
        parts.push(format!("技能不存在: {}", skills.join(", ")));
    }
    if !mcps.is_empty() {
        parts.push(format!("MCP 不存在: {}", mcps.join(", ")));
    }
    parts.join("; ")
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed or missing request fields. Message is operator-facing.
    #[error("{0}")]
    Validation(String),

    /// One or more requested capabilities are absent from the environment.
    /// Carries every missing item, not just the first.
    #[error("{}", capability_message(.missing_skills, .missing_mcps))]
    CapabilityMissing {
        missing_skills: Vec<String>,
        missing_mcps: Vec<String>,
    },

    /// A remote command failed during a fatal step.
    #[error("[{step}] {name}: {value}")]
    RemoteExecution {
        step: String,
        name: String,
        value: String,
    },

    /// Sandbox create/terminate failure.
    #[error("{0}")]
    EnvironmentLifecycle(String),

    /// Task store failure at the persistence boundary.
    #[error("storage: {0}")]
    Storage(String),
}

impl DispatchError {
    pub fn missing_capabilities(missing_skills: Vec<String>, missing_mcps: Vec<String>) -> Self {
        Self::CapabilityMissing {
            missing_skills,
            missing_mcps,
        }
    }
}

//! Dispatch configuration.
//!
//! One explicit value, constructed once and passed into the service and
//! workflow driver. Business logic never reads process-wide defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ports::environment::EnvironmentSpec;

/// Configuration for one dispatch service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Sandbox image to provision per task.
    pub sandbox_image: String,
    /// Entrypoint the sandbox boots with.
    pub sandbox_entrypoint: Vec<String>,

    /// Auth token forwarded to the agent inside the sandbox. `None` is
    /// filtered out of the environment rather than sent as an empty value.
    pub agent_auth_token: Option<String>,
    pub agent_base_url: Option<String>,
    pub agent_model: Option<String>,
    /// Extra runtime environment (language versions etc.).
    pub runtime_env: BTreeMap<String, String>,

    /// Directory inside the sandbox whose entries are the available skills.
    pub skills_path: String,
    /// JSON file inside the sandbox whose top-level keys are the available MCPs.
    pub mcp_config_path: String,

    /// Capabilities merged into every request, ahead of the requested ones.
    pub default_skills: Vec<String>,
    pub default_mcps: Vec<String>,

    /// Command that installs the agent CLI inside the sandbox.
    pub install_command: String,
    /// Agent binary; the JSON-quoted prompt is appended as its argument.
    pub agent_command: String,

    /// Base URL artifacts are announced and persisted under.
    pub base_download_url: String,
    /// Root of per-session work/artifact/task-context directories.
    pub context_root: String,

    /// Output relay capacity (lines buffered between driver and consumer).
    pub relay_capacity: usize,
    /// How long a publish may wait on a full relay before the driver detaches
    /// from the live stream and carries on.
    pub publish_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            sandbox_image: "opensandbox/code-interpreter:v1.0.1".to_string(),
            sandbox_entrypoint: vec!["/opt/opensandbox/code-interpreter.sh".to_string()],
            agent_auth_token: None,
            agent_base_url: None,
            agent_model: Some("claude_sonnet4".to_string()),
            runtime_env: BTreeMap::from([
                ("PYTHON_VERSION".to_string(), "3.11".to_string()),
                ("JAVA_VERSION".to_string(), "17".to_string()),
                ("NODE_VERSION".to_string(), "20".to_string()),
                ("GO_VERSION".to_string(), "1.24".to_string()),
            ]),
            skills_path: "/data/skills".to_string(),
            mcp_config_path: "/data/all_mcp.json".to_string(),
            default_skills: vec![
                "ppt".to_string(),
                "excel".to_string(),
                "zip".to_string(),
                "browse_user".to_string(),
            ],
            default_mcps: vec!["tapd".to_string()],
            install_command: "npm i -g @anthropic-ai/claude-code@latest".to_string(),
            agent_command: "claude".to_string(),
            base_download_url: "https://base-api/download".to_string(),
            context_root: "/data/context".to_string(),
            relay_capacity: 1024,
            publish_timeout_ms: 30_000,
        }
    }
}

impl DispatchConfig {
    /// Environment variables the sandbox is created with. `None`-valued
    /// settings are omitted entirely.
    pub fn sandbox_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(token) = &self.agent_auth_token {
            env.insert("ANTHROPIC_AUTH_TOKEN".to_string(), token.clone());
        }
        if let Some(url) = &self.agent_base_url {
            env.insert("ANTHROPIC_BASE_URL".to_string(), url.clone());
        }
        if let Some(model) = &self.agent_model {
            env.insert("ANTHROPIC_MODEL".to_string(), model.clone());
        }
        env.insert("IS_SANDBOX".to_string(), "1".to_string());
        env.extend(self.runtime_env.clone());
        env
    }

    pub fn environment_spec(&self) -> EnvironmentSpec {
        EnvironmentSpec {
            image: self.sandbox_image.clone(),
            env: self.sandbox_env(),
            entrypoint: self.sandbox_entrypoint.clone(),
        }
    }

    pub fn work_dir(&self, session_id: &str) -> String {
        format!("{}/{}/work", self.context_root, session_id)
    }

    pub fn artifact_dir(&self, session_id: &str) -> String {
        format!("{}/{}/artifact", self.context_root, session_id)
    }

    pub fn task_context_dir(&self, session_id: &str) -> String {
        format!("{}/{}/task-context", self.context_root, session_id)
    }

    pub fn download_url(&self, file: &str) -> String {
        format!("{}/{}", self.base_download_url, file)
    }
}

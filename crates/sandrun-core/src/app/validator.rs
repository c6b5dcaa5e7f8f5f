//! Capability validator: checks requested skills and MCPs against what the
//! environment actually provides, before any mutating step runs.
//!
//! Skills are directory entries under the configured skills path; MCPs are
//! the top-level keys of the configured JSON file. Missing items from both
//! sets are aggregated into a single error naming every absent item.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::app::executor::StepExecutor;
use crate::config::DispatchConfig;
use crate::domain::{DispatchError, StreamKind};
use crate::ports::environment::{Environment, RunOptions};

const STEP: &str = "validate";

pub struct CapabilityValidator {
    executor: StepExecutor,
    skills_path: String,
    mcp_config_path: String,
}

impl CapabilityValidator {
    pub fn new(env: Arc<dyn Environment>, config: &DispatchConfig) -> Self {
        Self {
            executor: StepExecutor::new(env),
            skills_path: config.skills_path.clone(),
            mcp_config_path: config.mcp_config_path.clone(),
        }
    }

    /// Returns `Ok(())` when every requested item is present. Reads only;
    /// a failed validation leaves the environment otherwise untouched.
    pub async fn validate(
        &self,
        skills: &[String],
        mcps: &[String],
    ) -> Result<(), DispatchError> {
        let missing_skills = self.missing_skills(skills).await?;
        let missing_mcps = self.missing_mcps(mcps).await?;
        if missing_skills.is_empty() && missing_mcps.is_empty() {
            debug!(skills = skills.len(), mcps = mcps.len(), "capabilities present");
            return Ok(());
        }
        Err(DispatchError::missing_capabilities(
            missing_skills,
            missing_mcps,
        ))
    }

    async fn missing_skills(&self, skills: &[String]) -> Result<Vec<String>, DispatchError> {
        if skills.is_empty() {
            return Ok(Vec::new());
        }
        let result = self
            .executor
            .run_buffered(
                STEP,
                &format!("ls -1 {}", self.skills_path),
                RunOptions::default(),
            )
            .await;
        if let Some(error) = result.error {
            return Err(DispatchError::RemoteExecution {
                step: STEP.to_string(),
                name: error.name,
                value: error.value,
            });
        }
        let available = stdout_set(&result);
        Ok(absent_from(skills, &available))
    }

    async fn missing_mcps(&self, mcps: &[String]) -> Result<Vec<String>, DispatchError> {
        if mcps.is_empty() {
            return Ok(Vec::new());
        }
        let result = self
            .executor
            .run_buffered(
                STEP,
                &format!("cat {}", self.mcp_config_path),
                RunOptions::default(),
            )
            .await;
        if let Some(error) = result.error {
            return Err(DispatchError::RemoteExecution {
                step: STEP.to_string(),
                name: error.name,
                value: error.value,
            });
        }
        let body: String = result
            .lines
            .iter()
            .filter(|line| line.stream() == StreamKind::Stdout)
            .map(|line| line.text())
            .collect::<Vec<_>>()
            .join("\n");
        let declared: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&body)
            .map_err(|e| DispatchError::RemoteExecution {
                step: STEP.to_string(),
                name: "McpConfigInvalid".to_string(),
                value: e.to_string(),
            })?;
        let available: HashSet<&str> = declared.keys().map(String::as_str).collect();
        Ok(mcps
            .iter()
            .filter(|m| !available.contains(m.as_str()))
            .cloned()
            .collect())
    }
}

fn stdout_set(result: &crate::app::executor::StepResult) -> HashSet<String> {
    result
        .lines
        .iter()
        .filter(|line| line.stream() == StreamKind::Stdout)
        .map(|line| line.text().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

fn absent_from(requested: &[String], available: &HashSet<String>) -> Vec<String> {
    requested
        .iter()
        .filter(|item| !available.contains(*item))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::ScriptedEnvironment;
    use crate::ports::environment::Execution;
    use rstest::rstest;

    fn validator(env: Arc<ScriptedEnvironment>) -> CapabilityValidator {
        CapabilityValidator::new(env, &DispatchConfig::default())
    }

    fn with_available(skills: &[&str], mcps: &[&str]) -> Arc<ScriptedEnvironment> {
        let env = Arc::new(ScriptedEnvironment::new());
        env.respond("ls -1 /data/skills", Execution::with_stdout(skills.to_vec()));
        let mcp_json = serde_json::Value::Object(
            mcps.iter()
                .map(|m| (m.to_string(), serde_json::json!({})))
                .collect(),
        );
        env.respond(
            "cat /data/all_mcp.json",
            Execution::with_stdout([mcp_json.to_string()]),
        );
        env
    }

    #[tokio::test]
    async fn passes_when_requested_is_a_subset_of_available() {
        let env = with_available(&["ppt", "excel"], &["tapd"]);
        let result = validator(env)
            .validate(&["ppt".into()], &["tapd".into()])
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_skill_is_named_exactly() {
        let env = with_available(&["ppt"], &["tapd"]);
        let err = validator(env)
            .validate(&["foo".into()], &["tapd".into()])
            .await
            .unwrap_err();
        match err {
            DispatchError::CapabilityMissing {
                missing_skills,
                missing_mcps,
            } => {
                assert_eq!(missing_skills, vec!["foo".to_string()]);
                assert!(missing_mcps.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_items_from_both_sets_are_aggregated() {
        let env = with_available(&["ppt"], &["tapd"]);
        let err = validator(env)
            .validate(
                &["ppt".into(), "foo".into(), "bar".into()],
                &["jira".into()],
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "技能不存在: foo, bar; MCP 不存在: jira");
    }

    #[rstest]
    #[case::empty_requests(&[], &[])]
    #[case::only_skills(&["ppt"], &[])]
    #[tokio::test]
    async fn empty_request_sets_skip_their_probe(
        #[case] skills: &[&str],
        #[case] mcps: &[&str],
    ) {
        let env = with_available(&["ppt"], &["tapd"]);
        let skills: Vec<String> = skills.iter().map(|s| s.to_string()).collect();
        let mcps: Vec<String> = mcps.iter().map(|s| s.to_string()).collect();
        assert!(validator(env.clone()).validate(&skills, &mcps).await.is_ok());
        let commands = env.commands();
        if mcps.is_empty() {
            assert!(!commands.iter().any(|c| c.contains("all_mcp.json")));
        }
        if skills.is_empty() {
            assert!(!commands.iter().any(|c| c.contains("ls -1 /data/skills")));
        }
    }

    #[tokio::test]
    async fn unreadable_mcp_config_is_a_remote_execution_error() {
        let env = Arc::new(ScriptedEnvironment::new());
        env.respond("ls -1 /data/skills", Execution::with_stdout(["ppt"]));
        env.respond(
            "cat /data/all_mcp.json",
            Execution::with_stdout(["not json"]),
        );
        let err = validator(env)
            .validate(&["ppt".into()], &["tapd".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::RemoteExecution { .. }));
    }

    #[tokio::test]
    async fn blank_listing_lines_are_ignored() {
        let env = Arc::new(ScriptedEnvironment::new());
        env.respond(
            "ls -1 /data/skills",
            Execution::with_stdout(["ppt", "", "  ", "excel"]),
        );
        let result = validator(env)
            .validate(&["ppt".into(), "excel".into()], &[])
            .await;
        assert!(result.is_ok());
    }
}

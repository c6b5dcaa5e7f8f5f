//! Workflow driver: sequences the per-task pipeline against one environment.
//!
//! Step order: prepare directories -> validate capabilities -> install the
//! agent CLI -> run the primary command -> collect artifacts -> announce
//! them. The environment is provisioned once, owned exclusively by this
//! driver, and terminated exactly once on every exit path; the result promise
//! is resolved and the relay closed on every exit path as well. The step
//! sequence runs in a child task so even a panicked step still reaches
//! teardown.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::app::executor::StepExecutor;
use crate::app::validator::CapabilityValidator;
use crate::config::DispatchConfig;
use crate::domain::{DispatchError, ExecutionOutcome, OutputLine, SessionId, TaskId};
use crate::ports::environment::{Environment, EnvironmentProvisioner, RunOptions};
use crate::promise::{ResultHandle, ResultPromise, result_promise};
use crate::relay::{RelayReceiver, RelaySender, relay};

/// Step names used in line tags and error messages.
pub mod step {
    pub const PREPARE: &str = "prepare";
    pub const VALIDATE: &str = "validate";
    pub const INSTALL: &str = "install";
    pub const RUN: &str = "run";
    pub const COLLECT: &str = "collect";
}

const SUCCESS_MESSAGE: &str = "任务执行成功";
const FAILURE_MESSAGE: &str = "任务执行失败";
const ARTIFACTS_HEADER: &str = "产出文件:";

/// Input for one workflow run.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub task_id: TaskId,
    pub session_id: SessionId,
    pub prompt: String,
    pub skills: Vec<String>,
    pub mcps: Vec<String>,
}

pub struct WorkflowDriver {
    config: DispatchConfig,
    provisioner: Arc<dyn EnvironmentProvisioner>,
}

impl WorkflowDriver {
    pub fn new(config: DispatchConfig, provisioner: Arc<dyn EnvironmentProvisioner>) -> Self {
        Self {
            config,
            provisioner,
        }
    }

    /// Launch the workflow in the background. The returned receiver carries
    /// the live output lines; the handle resolves with the final outcome.
    pub fn start(&self, run: TaskRun) -> (RelayReceiver, ResultHandle) {
        let (tx, rx) = relay(
            self.config.relay_capacity,
            std::time::Duration::from_millis(self.config.publish_timeout_ms),
        );
        let (promise, handle) = result_promise();
        let config = self.config.clone();
        let provisioner = self.provisioner.clone();
        tokio::spawn(drive(config, provisioner, run, tx, promise));
        (rx, handle)
    }
}

/// Outer shell: provision, run the steps, then the guaranteed tail — the
/// promise is resolved and the relay closed no matter how the steps ended.
async fn drive(
    config: DispatchConfig,
    provisioner: Arc<dyn EnvironmentProvisioner>,
    run: TaskRun,
    relay: RelaySender,
    promise: ResultPromise,
) {
    let task_id = run.task_id;
    let spec = config.environment_spec();
    let env = match provisioner.provision(&spec).await {
        Ok(env) => env,
        Err(err) => {
            let message = format!("{FAILURE_MESSAGE}: {err}");
            let _ = relay.publish(OutputLine::note(message.clone())).await;
            promise.resolve(ExecutionOutcome::failure(message));
            relay.close().await;
            return;
        }
    };
    info!(%task_id, image = %spec.image, "environment provisioned");

    let steps = tokio::spawn(run_steps(config, env.clone(), run, relay.clone()));
    let outcome = match steps.await {
        Ok(outcome) => outcome,
        Err(fault) => {
            // A step panicked. The environment still gets torn down below.
            let message = format!("{FAILURE_MESSAGE}: {fault}");
            let _ = relay.publish(OutputLine::note(message.clone())).await;
            ExecutionOutcome::failure(message)
        }
    };

    if let Err(err) = env.terminate().await {
        // Never overrides the outcome already determined by the workflow.
        warn!(%task_id, error = %err, "environment terminate failed");
    }
    info!(%task_id, success = outcome.success, "task finished");
    promise.resolve(outcome);
    relay.close().await;
}

async fn run_steps(
    config: DispatchConfig,
    env: Arc<dyn Environment>,
    run: TaskRun,
    relay: RelaySender,
) -> ExecutionOutcome {
    match execute_steps(&config, env, &run, &relay).await {
        Ok(outcome) => outcome,
        Err(err) => {
            let message = format!("{FAILURE_MESSAGE}: {err}");
            let _ = relay.publish(OutputLine::note(message.clone())).await;
            ExecutionOutcome::failure(message)
        }
    }
}

async fn execute_steps(
    config: &DispatchConfig,
    env: Arc<dyn Environment>,
    run: &TaskRun,
    relay: &RelaySender,
) -> Result<ExecutionOutcome, DispatchError> {
    let executor = StepExecutor::new(env.clone());
    let session = run.session_id.as_str();
    let work_dir = config.work_dir(session);
    let artifact_dir = config.artifact_dir(session);
    let task_context_dir = config.task_context_dir(session);

    // 1. Working and artifact directories. Fatal on failure.
    let prepared = executor
        .run_buffered(
            step::PREPARE,
            &format!("mkdir -p {work_dir} {artifact_dir}"),
            RunOptions::default(),
        )
        .await;
    if let Some(error) = prepared.error {
        return Err(DispatchError::RemoteExecution {
            step: step::PREPARE.to_string(),
            name: error.name,
            value: error.value,
        });
    }

    // 2. Capabilities. Fatal, and must run before any mutating step.
    CapabilityValidator::new(env.clone(), config)
        .validate(&run.skills, &run.mcps)
        .await?;

    // 3. Agent CLI install. Streamed; fatal on failure.
    let installed = executor
        .run_streamed(
            step::INSTALL,
            &config.install_command,
            RunOptions::default(),
            relay,
        )
        .await;
    if let Some(error) = installed.error {
        return Err(DispatchError::RemoteExecution {
            step: step::INSTALL.to_string(),
            name: error.name,
            value: error.value,
        });
    }

    // 4. Primary command. Streamed; NOT fatal — collection still runs, but
    //    this step alone decides the success flag.
    let command = format!("{} {}", config.agent_command, json_quote(&run.prompt));
    let ran = executor
        .run_streamed(step::RUN, &command, RunOptions::in_dir(&work_dir), relay)
        .await;
    debug!(task_id = %run.task_id, ok = ran.ok(), "primary command finished");

    // 5. Copy work dir into the task context; pull any declared artifact
    //    subdirectory into the artifact dir. Best-effort.
    executor
        .run_buffered(
            step::COLLECT,
            &format!("mkdir -p {task_context_dir}"),
            RunOptions::default(),
        )
        .await;
    executor
        .run_buffered(
            step::COLLECT,
            &format!("cp -r {work_dir} {task_context_dir}"),
            RunOptions::default(),
        )
        .await;
    executor
        .run_buffered(
            step::COLLECT,
            &format!(
                "if [ -d {work_dir}/artifact ]; then cp -r {work_dir}/artifact/* {artifact_dir}; fi"
            ),
            RunOptions::default(),
        )
        .await;

    // 6. Enumerate artifacts and announce them before the end of stream.
    let listing = executor
        .run_buffered(
            step::COLLECT,
            &format!("if [ -d {artifact_dir} ]; then ls -1 {artifact_dir}; fi"),
            RunOptions::default(),
        )
        .await;
    let artifacts: Vec<String> = listing
        .lines
        .iter()
        .filter(|line| line.stream() == crate::domain::StreamKind::Stdout)
        .map(|line| line.text().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();
    if !artifacts.is_empty() {
        let _ = relay.publish(OutputLine::note(ARTIFACTS_HEADER)).await;
        for artifact in &artifacts {
            let _ = relay
                .publish(OutputLine::note(config.download_url(artifact)))
                .await;
        }
    }

    let success = ran.ok();
    Ok(ExecutionOutcome {
        success,
        message: if success { SUCCESS_MESSAGE } else { FAILURE_MESSAGE }.to_string(),
        artifacts,
    })
}

/// JSON-quote the prompt so it survives the remote shell as one argument.
fn json_quote(prompt: &str) -> String {
    serde_json::Value::String(prompt.to_string()).to_string()
}

//! Step executor: runs one remote command and normalizes its output into
//! tagged lines.
//!
//! Both modes tag lines identically, so a downstream consumer cannot tell
//! buffered from streamed output. A non-zero exit or transport fault becomes
//! one terminal `error` line and a recorded [`ExecError`]; nothing escapes as
//! `Err` — which steps are fatal is the workflow driver's decision.

use std::sync::Arc;

use tracing::debug;

use crate::domain::OutputLine;
use crate::ports::environment::{Environment, EnvironmentError, ExecError, ExecEvent, RunOptions};
use crate::relay::RelaySender;

/// Normalized result of one step.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    /// Tagged lines in emission order: stdout, then stderr, then the error
    /// line in buffered mode; interleaved arrival order in streaming mode.
    pub lines: Vec<OutputLine>,
    pub error: Option<ExecError>,
}

impl StepResult {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct StepExecutor {
    env: Arc<dyn Environment>,
}

impl StepExecutor {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self { env }
    }

    /// Run to completion, then return the full tagged result.
    pub async fn run_buffered(&self, step: &str, command: &str, opts: RunOptions) -> StepResult {
        debug!(step, command, "running buffered step");
        match self.env.run(command, opts).await {
            Ok(execution) => {
                let mut result = StepResult::default();
                for text in execution.stdout {
                    result.lines.push(OutputLine::stdout(step, text));
                }
                for text in execution.stderr {
                    result.lines.push(OutputLine::stderr(step, text));
                }
                if let Some(error) = execution.error {
                    result.lines.push(error_line(step, &error));
                    result.error = Some(error);
                }
                result
            }
            Err(fault) => transport_result(step, fault),
        }
    }

    /// Run with incremental delivery: each event is tagged and published to
    /// the relay as it arrives, before this call returns. Publish failures
    /// (consumer gone or stalled) do not stop the step; the result still
    /// carries every line.
    pub async fn run_streamed(
        &self,
        step: &str,
        command: &str,
        opts: RunOptions,
        relay: &RelaySender,
    ) -> StepResult {
        debug!(step, command, "running streamed step");
        let mut events = match self.env.run_streamed(command, opts).await {
            Ok(events) => events,
            Err(fault) => {
                let result = transport_result(step, fault);
                for line in &result.lines {
                    let _ = relay.publish(line.clone()).await;
                }
                return result;
            }
        };

        let mut result = StepResult::default();
        while let Some(event) = events.recv().await {
            let line = match event {
                ExecEvent::Stdout(text) => OutputLine::stdout(step, text),
                ExecEvent::Stderr(text) => OutputLine::stderr(step, text),
                ExecEvent::Failed(error) => {
                    let line = error_line(step, &error);
                    result.error = Some(error);
                    line
                }
            };
            let _ = relay.publish(line.clone()).await;
            result.lines.push(line);
        }
        result
    }
}

fn error_line(step: &str, error: &ExecError) -> OutputLine {
    OutputLine::error(step, format!("{}: {}", error.name, error.value))
}

fn transport_result(step: &str, fault: EnvironmentError) -> StepResult {
    let error = ExecError::new("TransportError", fault.to_string());
    StepResult {
        lines: vec![error_line(step, &error)],
        error: Some(error),
    }
}

//! Scripted environment: a fake sandbox with canned command responses.
//!
//! Tests script responses per command pattern, then assert on the recorded
//! invocation order and the terminate count. Used by the CLI demo as well.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ports::environment::{
    Environment, EnvironmentError, EnvironmentProvisioner, EnvironmentSpec, ExecEvent, Execution,
    RunOptions,
};

enum Response {
    Execution(Execution),
    /// Simulated transport fault: `run`/`run_streamed` return `Err`.
    Transport(String),
}

struct Rule {
    pattern: String,
    response: Response,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub command: String,
    pub working_directory: Option<String>,
}

/// A fake environment. Commands are matched against scripted rules by
/// substring, first match wins; unmatched commands succeed with no output.
#[derive(Default)]
pub struct ScriptedEnvironment {
    rules: Mutex<Vec<Rule>>,
    runs: Mutex<Vec<RecordedRun>>,
    terminations: AtomicUsize,
    fail_terminate: Mutex<Option<String>>,
}

impl ScriptedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for any command containing `pattern`.
    pub fn respond(&self, pattern: impl Into<String>, execution: Execution) {
        self.push_rule(pattern.into(), Response::Execution(execution));
    }

    /// Script a transport fault for any command containing `pattern`.
    pub fn fail_transport(&self, pattern: impl Into<String>, reason: impl Into<String>) {
        self.push_rule(pattern.into(), Response::Transport(reason.into()));
    }

    /// Make every terminate call fail with the given reason.
    pub fn fail_terminate(&self, reason: impl Into<String>) {
        *self.lock_poisoned(&self.fail_terminate) = Some(reason.into());
    }

    /// Every command run so far, in invocation order.
    pub fn commands(&self) -> Vec<String> {
        self.lock_poisoned(&self.runs)
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.lock_poisoned(&self.runs).clone()
    }

    pub fn terminate_count(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    fn push_rule(&self, pattern: String, response: Response) {
        self.lock_poisoned(&self.rules).push(Rule { pattern, response });
    }

    fn lock_poisoned<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn respond_to(&self, command: &str, opts: &RunOptions) -> Result<Execution, EnvironmentError> {
        self.lock_poisoned(&self.runs).push(RecordedRun {
            command: command.to_string(),
            working_directory: opts.working_directory.clone(),
        });
        let rules = self.lock_poisoned(&self.rules);
        for rule in rules.iter() {
            if command.contains(&rule.pattern) {
                return match &rule.response {
                    Response::Execution(execution) => Ok(execution.clone()),
                    Response::Transport(reason) => {
                        Err(EnvironmentError::Transport(reason.clone()))
                    }
                };
            }
        }
        Ok(Execution::default())
    }
}

#[async_trait]
impl Environment for ScriptedEnvironment {
    async fn run(&self, command: &str, opts: RunOptions) -> Result<Execution, EnvironmentError> {
        self.respond_to(command, &opts)
    }

    async fn run_streamed(
        &self,
        command: &str,
        opts: RunOptions,
    ) -> Result<mpsc::Receiver<ExecEvent>, EnvironmentError> {
        let execution = self.respond_to(command, &opts)?;
        let event_count = execution.stdout.len() + execution.stderr.len() + 1;
        let (tx, rx) = mpsc::channel(event_count);
        for line in execution.stdout {
            let _ = tx.try_send(ExecEvent::Stdout(line));
        }
        for line in execution.stderr {
            let _ = tx.try_send(ExecEvent::Stderr(line));
        }
        if let Some(error) = execution.error {
            let _ = tx.try_send(ExecEvent::Failed(error));
        }
        Ok(rx)
    }

    async fn terminate(&self) -> Result<(), EnvironmentError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.lock_poisoned(&self.fail_terminate).clone() {
            return Err(EnvironmentError::Terminate(reason));
        }
        Ok(())
    }
}

/// Provisioner handing out one shared scripted environment, or a scripted
/// create failure.
pub struct ScriptedProvisioner {
    env: Arc<ScriptedEnvironment>,
    fail_create: Mutex<Option<String>>,
    last_spec: Mutex<Option<EnvironmentSpec>>,
}

impl ScriptedProvisioner {
    pub fn new(env: Arc<ScriptedEnvironment>) -> Self {
        Self {
            env,
            fail_create: Mutex::new(None),
            last_spec: Mutex::new(None),
        }
    }

    pub fn fail_create(&self, reason: impl Into<String>) {
        let mut fail = self.fail_create.lock().unwrap_or_else(|e| e.into_inner());
        *fail = Some(reason.into());
    }

    /// Spec of the most recent provision call, for env-assembly assertions.
    pub fn last_spec(&self) -> Option<EnvironmentSpec> {
        self.last_spec
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl EnvironmentProvisioner for ScriptedProvisioner {
    async fn provision(
        &self,
        spec: &EnvironmentSpec,
    ) -> Result<Arc<dyn Environment>, EnvironmentError> {
        let mut last = self.last_spec.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(spec.clone());
        drop(last);
        let fail = self.fail_create.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(reason) = fail.clone() {
            return Err(EnvironmentError::Create(reason));
        }
        Ok(self.env.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::environment::ExecError;

    #[tokio::test]
    async fn test_unmatched_commands_succeed_silently() {
        let env = ScriptedEnvironment::new();
        let exec = env.run("mkdir -p /tmp/x", RunOptions::default()).await.unwrap();
        assert!(exec.stdout.is_empty());
        assert!(exec.error.is_none());
        assert_eq!(env.commands(), vec!["mkdir -p /tmp/x".to_string()]);
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let env = ScriptedEnvironment::new();
        env.respond("ls -1", Execution::with_stdout(["a", "b"]));
        env.respond("ls", Execution::with_stdout(["shadowed"]));
        let exec = env.run("ls -1 /data/skills", RunOptions::default()).await.unwrap();
        assert_eq!(exec.stdout, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_streamed_events_preserve_order_and_terminal_error() {
        let env = ScriptedEnvironment::new();
        env.respond(
            "claude",
            Execution {
                stdout: vec!["one".into(), "two".into()],
                stderr: vec!["warn".into()],
                error: Some(ExecError::new("CommandFailed", "exit status 1")),
            },
        );
        let mut rx = env
            .run_streamed("claude \"do it\"", RunOptions::in_dir("/work"))
            .await
            .unwrap();
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert_eq!(
            events,
            vec![
                ExecEvent::Stdout("one".into()),
                ExecEvent::Stdout("two".into()),
                ExecEvent::Stderr("warn".into()),
                ExecEvent::Failed(ExecError::new("CommandFailed", "exit status 1")),
            ]
        );
        assert_eq!(
            env.runs()[0].working_directory.as_deref(),
            Some("/work")
        );
    }

    #[tokio::test]
    async fn test_terminate_is_counted_and_idempotent() {
        let env = ScriptedEnvironment::new();
        env.terminate().await.unwrap();
        env.terminate().await.unwrap();
        assert_eq!(env.terminate_count(), 2);
    }

    #[tokio::test]
    async fn test_provisioner_records_spec_and_can_fail() {
        let env = Arc::new(ScriptedEnvironment::new());
        let provisioner = ScriptedProvisioner::new(env);
        let spec = EnvironmentSpec {
            image: "img".into(),
            env: Default::default(),
            entrypoint: vec![],
        };
        assert!(provisioner.provision(&spec).await.is_ok());
        assert_eq!(provisioner.last_spec().unwrap().image, "img");

        provisioner.fail_create("no capacity");
        assert!(provisioner.provision(&spec).await.is_err());
    }
}

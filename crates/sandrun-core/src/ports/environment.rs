//! Environment port: the ephemeral remote execution environment.
//!
//! One environment is provisioned per task, exclusively owned by that task's
//! workflow driver, and terminated exactly once on every exit path. Terminate
//! must be a safe no-op on an already-terminated handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// What to provision: image, environment variables, entrypoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub entrypoint: Vec<String>,
}

/// Terminal error of one remote command (non-zero exit, signal, etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecError {
    pub name: String,
    pub value: String,
}

impl ExecError {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Buffered result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub error: Option<ExecError>,
}

impl Execution {
    pub fn with_stdout<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stdout: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn failed(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            error: Some(ExecError::new(name, value)),
            ..Self::default()
        }
    }
}

/// One incremental event from a streamed command, in emission order.
/// `Failed` is terminal when present; the stream ends when the channel closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Stdout(String),
    Stderr(String),
    Failed(ExecError),
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub working_directory: Option<String>,
}

impl RunOptions {
    pub fn in_dir(dir: impl Into<String>) -> Self {
        Self {
            working_directory: Some(dir.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("environment create failed: {0}")]
    Create(String),

    /// The command never produced a result (connection dropped, auth, etc.).
    #[error("transport fault: {0}")]
    Transport(String),

    #[error("environment terminate failed: {0}")]
    Terminate(String),
}

/// Handle to one live environment.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Run a command to completion and return the buffered result.
    /// A non-zero exit is reported in `Execution::error`, not as `Err`;
    /// `Err` means the command never ran (transport fault).
    async fn run(&self, command: &str, opts: RunOptions) -> Result<Execution, EnvironmentError>;

    /// Run a command, delivering output incrementally. Events arrive in
    /// emission order; the receiver closes when the command finishes.
    async fn run_streamed(
        &self,
        command: &str,
        opts: RunOptions,
    ) -> Result<mpsc::Receiver<ExecEvent>, EnvironmentError>;

    /// Tear the environment down. Idempotent: a second call on the same
    /// handle must succeed without side effects.
    async fn terminate(&self) -> Result<(), EnvironmentError>;
}

/// Creates environments. Implemented against the real sandbox API in
/// production and by [`crate::impls::scripted_env`] in tests.
#[async_trait]
pub trait EnvironmentProvisioner: Send + Sync {
    async fn provision(&self, spec: &EnvironmentSpec)
    -> Result<Arc<dyn Environment>, EnvironmentError>;
}

//! sandrun-core
//!
//! Dispatches a user task into an ephemeral sandbox, runs the fixed
//! workflow (validate capabilities, install the agent CLI, run the prompt,
//! collect artifacts, tear down), and delivers output to callers that either
//! stream it live or only want the final outcome.
//!
//! Layout:
//! - **domain**: ids, task record + state machine, output lines, outcome, errors
//! - **ports**: environment, task store, clock
//! - **relay / promise**: driver-to-consumer channel and the single-assignment result
//! - **app**: step executor, capability validator, workflow driver, task service
//! - **impls**: in-memory store and scripted sandbox for development and tests

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod promise;
pub mod relay;

pub use self::app::{TaskCompletion, TaskRequest, TaskService, TaskStream, WorkflowDriver};
pub use self::config::DispatchConfig;
pub use self::domain::{DispatchError, ExecutionOutcome, OutputLine, TaskRecord, TaskStatus};
pub use self::promise::ResultHandle;
pub use self::relay::{RelayReceiver, RelaySender};

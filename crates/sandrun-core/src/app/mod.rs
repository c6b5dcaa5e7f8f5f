//! Application logic: request intake, the workflow driver and its steps, and
//! the task service tying them to the persistence boundary.

pub mod driver;
pub mod executor;
pub mod request;
pub mod service;
pub mod validator;

pub use self::driver::{TaskRun, WorkflowDriver};
pub use self::executor::{StepExecutor, StepResult};
pub use self::request::TaskRequest;
pub use self::service::{TaskCompletion, TaskService, TaskStream};
pub use self::validator::CapabilityValidator;

//! Ports: interfaces to external collaborators.
//!
//! The workflow core depends only on these traits; the real sandbox API,
//! database, and wall clock live behind them. Development implementations
//! are under [`crate::impls`].

pub mod clock;
pub mod environment;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::environment::{
    Environment, EnvironmentError, EnvironmentProvisioner, EnvironmentSpec, ExecError, ExecEvent,
    Execution, RunOptions,
};
pub use self::task_store::{ArtifactRow, StoreError, TaskStore};

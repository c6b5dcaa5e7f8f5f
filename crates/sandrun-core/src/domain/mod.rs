//! Domain model: identifiers, task record and state machine, output lines,
//! execution outcome, and the error taxonomy.

pub mod errors;
pub mod ids;
pub mod line;
pub mod outcome;
pub mod task;

pub use self::errors::DispatchError;
pub use self::ids::{SessionId, TaskId};
pub use self::line::{OutputLine, StreamKind};
pub use self::outcome::ExecutionOutcome;
pub use self::task::{TaskRecord, TaskStatus};

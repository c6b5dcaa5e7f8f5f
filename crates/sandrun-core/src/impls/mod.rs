//! Development implementations of the ports: an in-memory task store and a
//! scripted sandbox. Production wires real adapters behind the same traits.

pub mod memory_store;
pub mod scripted_env;

pub use self::memory_store::InMemoryTaskStore;
pub use self::scripted_env::{ScriptedEnvironment, ScriptedProvisioner};

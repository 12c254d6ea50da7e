//! Where rotated values come from when the vault does not generate them.
//!
//! * `env`  - reads a process environment variable
//! * `exec` - runs a command and captures its stdout
//!
//! Delegated tasks (hooks and the delegated-task strategy) go through a
//! [`TaskRunner`]; [`CommandTaskRunner`] runs them as local processes.

pub mod command;
pub mod env;
pub mod task;
pub mod types;

pub use command::ExecSource;
pub use env::EnvSource;
pub use task::CommandTaskRunner;
pub use types::{
    ExternalValueSource, SourceRegistry, SourceResolution, TaskError, TaskOutput, TaskRequest,
    TaskRunner,
};

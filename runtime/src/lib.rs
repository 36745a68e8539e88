//! Job-step execution: stage remote inputs into a working directory, run the
//! command (optionally inside a container), capture its output streams, and
//! upload whatever new files the upload filters select.

pub mod error;
pub mod exec;
mod fsutil;
pub mod layout;
pub mod localize;
pub mod outputs;

pub use error::{Result, ShepherdError};
pub use exec::{execute, execute_with_options, ExecOptions};
pub use layout::JobLayout;
pub use localize::{
    DirectTransfer, Localizer, MountConfig, MountedTransfer, Strategy, StrategyKind,
};
pub use outputs::find_new_files;

pub use job_spec::{ExecutionResult, JobParameters};

//! Job descriptor model for a single shepherd job step.
//!
//! A job step is described by [`JobParameters`]: the command to run, the remote
//! inputs to stage into the working directory, and the filter chain selecting
//! which produced files get uploaded afterwards. Everything a caller supplies is
//! checked once, here, before any side effect happens.

use std::path::PathBuf;
use thiserror::Error;

pub mod filter;
pub mod loader;
pub mod params;
pub mod remote_ref;
pub mod validation;

pub use filter::FilterChain;
pub use params::{Download, ExecutionResult, Filter, JobParameters, Upload, UploadSpec};
pub use remote_ref::RemoteRef;
pub use validation::{validate_download_source, validate_path, validate_reference};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("empty command")]
    EmptyCommand,

    #[error("invalid remote reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid filter pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("job descriptor {source_name} failed schema validation: {}", .errors.join(", "))]
    Schema {
        source_name: String,
        errors: Vec<String>,
    },

    #[error("job descriptor {source_name} could not be parsed: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("failed to read job descriptor {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

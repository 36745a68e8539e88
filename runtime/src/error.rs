use job_spec::ConfigError;
use remote_store::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShepherdError {
    #[error("invalid job parameters: {0}")]
    Config(#[from] ConfigError),

    #[error("{message}: {source}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("mount failure: {message}")]
    Mount { message: String },

    #[error("unsupported: {message}")]
    Unsupported { message: String },

    #[error("failed to {action} {program}: {source}")]
    ProcessLaunch {
        program: String,
        action: &'static str,
        source: std::io::Error,
    },
}

impl ShepherdError {
    pub(crate) fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        ShepherdError::Io {
            message: message.into(),
            source,
        }
    }

    /// Stable identifier for the failure class, suitable for logs and exit reports.
    pub fn code(&self) -> &'static str {
        match self {
            ShepherdError::Config(_) => "SHEPHERD_CONFIG_ERROR",
            ShepherdError::Io { .. } => "SHEPHERD_IO_ERROR",
            ShepherdError::Remote(_) => "SHEPHERD_REMOTE_ERROR",
            ShepherdError::Mount { .. } => "SHEPHERD_MOUNT_ERROR",
            ShepherdError::Unsupported { .. } => "SHEPHERD_UNSUPPORTED",
            ShepherdError::ProcessLaunch { .. } => "SHEPHERD_PROCESS_LAUNCH_ERROR",
        }
    }
}

pub type Result<T, E = ShepherdError> = std::result::Result<T, E>;

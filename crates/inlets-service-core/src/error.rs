use std::path::PathBuf;
use thiserror::Error;

/// Failure to produce a usable [`ServiceConfig`](crate::ServiceConfig).
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure to start the supervised child. No process exists afterwards.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("permission denied starting {0}")]
    PermissionDenied(String),

    #[error("failed to spawn {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl SpawnError {
    /// Classify an I/O error returned while spawning `command`.
    pub fn from_io(command: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => SpawnError::ExecutableNotFound(command.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                SpawnError::PermissionDenied(command.to_string())
            }
            _ => SpawnError::Io {
                command: command.to_string(),
                source,
            },
        }
    }
}

/// Failure to kill the supervised child.
#[derive(Error, Debug)]
pub enum TerminateError {
    #[error("process has already exited")]
    AlreadyExited,

    #[error("permission denied killing process")]
    PermissionDenied,

    #[error("failed to kill process: {0}")]
    Failed(String),
}

impl TerminateError {
    /// An already-exited child counts as terminated.
    pub fn is_benign(&self) -> bool {
        matches!(self, TerminateError::AlreadyExited)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unexpected control request #{code}")]
pub struct UnrecognizedControlError {
    pub code: u32,
}

/// Top-level error for the service lifecycle.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    ConfigLoad(#[from] ConfigLoadError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Terminate(#[from] TerminateError),

    #[error(transparent)]
    UnrecognizedControl(#[from] UnrecognizedControlError),

    #[error("service registration failed: {0}")]
    Registration(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    /// Fatal errors abort the process; everything else is logged and the loop continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServiceError::ConfigLoad(_) | ServiceError::Registration(_) | ServiceError::Other(_)
        )
    }
}

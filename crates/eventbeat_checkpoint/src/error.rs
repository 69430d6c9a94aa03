//! Error types for the checkpoint registry.

use std::path::PathBuf;
use thiserror::Error;

/// Checkpoint operation result type.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint registry errors.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// IO error while reading or writing the registry file
    #[error("Registry IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Registry file is not valid YAML for the expected layout
    #[error("Registry format error in {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The store was already shut down
    #[error("Checkpoint store is shut down")]
    Closed,

    /// A thread panicked while holding the registry lock
    #[error("Checkpoint registry lock poisoned")]
    Poisoned,
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, source: serde_yaml::Error) -> Self {
        Self::Format {
            path: path.into(),
            source,
        }
    }
}

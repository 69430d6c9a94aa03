//! Error types for the tailing engine.

use std::time::Duration;
use thiserror::Error;

/// Legacy value conversion errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The tick value does not map to a representable instant
    #[error("Epoch value {0} is outside the representable time range")]
    EpochOverflow(i64),
}

/// Failure of a single `read_batch` call. The caller decides whether to retry.
#[derive(Error, Debug)]
pub enum ReadError {
    /// Could not open the event log store
    #[error("Failed to open event log: {0}")]
    Connect(#[source] sqlx::Error),

    /// Incremental or lookup query failed
    #[error("Event log query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// A column could not be read from a result row
    #[error("Failed to read column {column}: {source}")]
    Column {
        column: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Row carries a corrupt legacy value
    #[error("Row {id} is corrupt: {source}")]
    Decode {
        id: i64,
        #[source]
        source: CodecError,
    },

    /// The store did not answer within the configured query timeout
    #[error("Event log query timed out after {0:?}")]
    Timeout(Duration),
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading the config file
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error (includes unknown keys)
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// One or more semantic problems, all reported at once
    #[error("{} error(s): {}", .0.len(), .0.join("; "))]
    Invalid(Vec<String>),
}

/// Sink setup and shutdown errors.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink IO error on {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Output config error: {0}")]
    Config(String),
}

/// Errors that abort the whole orchestrator run (as opposed to one worker).
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Checkpoint store error: {0}")]
    Checkpoint(#[from] eventbeat_checkpoint::CheckpointError),

    #[error("Checkpoint shutdown task failed: {0}")]
    ShutdownTask(#[from] tokio::task::JoinError),
}

//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

/// Errors raised by configuration, checkpointing and worker lifecycle.
///
/// Numeric hazards (zero critical-flow ratio, zero reward scale) are never
/// surfaced here; they are guarded at the point of use with a default.
#[derive(Debug, thiserror::Error)]
pub enum TscError {
    /// Unknown controller or agent type, or an invalid parameter combination.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A checkpoint file required for loading does not exist.
    #[error("missing resource: {}", .0.display())]
    MissingResource(PathBuf),

    /// Weight (de)serialisation or approximator failure.
    #[error("network error: {0}")]
    Network(String),

    /// Simulation collaborator failure.
    #[error("simulation error: {0}")]
    Simulation(String),

    /// A worker thread panicked before returning.
    #[error("worker {0} panicked")]
    WorkerPanicked(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TscError {
    pub fn config(msg: impl Into<String>) -> Self {
        TscError::Configuration(msg.into())
    }

    pub fn network(msg: impl ToString) -> Self {
        TscError::Network(msg.to_string())
    }
}

impl From<toml::de::Error> for TscError {
    fn from(e: toml::de::Error) -> Self {
        TscError::Configuration(e.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TscError>;

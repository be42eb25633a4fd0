//! Error types for the run loop and its collaborators.

use thiserror::Error;

use crate::types::StopReason;

/// A fault raised by a subsystem while ticking or restoring state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{subsystem}: {message}")]
pub struct SubsystemError {
    pub subsystem: String,
    pub message: String,
}

impl SubsystemError {
    pub fn new(subsystem: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },

    #[error("failed to restore {name}")]
    Subsystem {
        name: &'static str,
        #[source]
        source: SubsystemError,
    },
}

#[derive(Debug, Error)]
pub enum RunloopError {
    #[error("missing argument: PC address")]
    MissingAddress,

    #[error("invalid run profile: target fps must be positive, got {0}")]
    InvalidProfile(f64),

    #[error("invalid speed multiplier {0}")]
    InvalidSpeed(f64),

    #[error("overflow for Kernal keyboard buffer: {requested} characters requested, {available} free")]
    BufferOverflow { requested: usize, available: usize },

    #[error("character {0:?} has no 8-bit encoding")]
    UnencodableChar(char),

    #[error("program image too short ({0} bytes)")]
    InvalidProgram(usize),

    #[error("run interrupted before reaching its condition ({0:?})")]
    Interrupted(StopReason),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("configuration error: {0}")]
    Config(String),
}

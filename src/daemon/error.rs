//! Timer engine error types.
//!
//! Command errors are returned to the caller synchronously. Persistence
//! errors never stop the countdown; the engine logs them and keeps running
//! in memory. Only an explicit flush returns them.

use thiserror::Error;

use crate::types::TimerPhase;

/// Errors returned by the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("state store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded.
    #[error("state store data is malformed: {0}")]
    Malformed(String),

    /// The store refused the operation.
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors returned by timer engine commands.
#[derive(Debug, Error)]
pub enum TimerError {
    /// Command preconditions unmet.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Command not permitted in the current phase.
    #[error("cannot {command} while {}", .phase.as_str())]
    InvalidState {
        /// Command that was rejected
        command: &'static str,
        /// Phase the engine was in
        phase: TimerPhase,
    },

    /// Reading or writing the state store failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// The tick task could not be spawned.
    #[error("no async runtime available to run the countdown")]
    NoRuntime,
}

impl TimerError {
    /// Returns true if the caller passed a bad argument.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Returns true if the command is not allowed in the current phase.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Returns true if the state store rejected a write.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

//! Error types surfaced by the session controller.

use std::fmt;

use sim_api::{ApiError, ValidationError};
use thiserror::Error;

use crate::stream::StreamError;
use crate::SessionState;

/// Controller operation named in precondition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Stop,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Start => write!(f, "start"),
            Operation::Stop => write!(f, "stop"),
        }
    }
}

/// Errors returned by [`SessionController`](super::SessionController).
///
/// `InvalidState` is a caller bug (a precondition violation) and is returned
/// before any side effect. Every other variant is a runtime failure that has
/// already been resolved to a defined state when it is returned.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is not allowed in the current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// Operation that was refused.
        operation: Operation,
        /// State at the time of the call.
        state: SessionState,
    },

    /// The run configuration failed validation; nothing was sent.
    #[error("invalid run configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    /// The start command was rejected or the backend was unreachable.
    /// The session is back in `Idle`.
    #[error("start command failed: {0}")]
    Submission(#[source] ApiError),

    /// The run started remotely but the telemetry stream could not be
    /// opened. The session is back in `Idle`.
    #[error("could not open telemetry stream: {0}")]
    Subscribe(#[source] StreamError),

    /// The halt command failed. The session is back in `Running`.
    #[error("stop command failed: {0}")]
    Halt(#[source] ApiError),

    /// The purge command failed. Local buffer and results are untouched.
    #[error("clear command failed: {0}")]
    Clear(#[source] ApiError),
}

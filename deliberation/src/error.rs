//! Top-level error type for running a deliberation.

use crate::debate::state::TransitionError;
use crate::events::{BusError, ReplayError};

/// Error type for deliberation runs
///
/// Collaborator failures never appear here: they degrade inside the run.
#[derive(Debug, thiserror::Error)]
pub enum DeliberationError {
    #[error("Problem statement is empty")]
    EmptyProblem,

    #[error("Deliberation was cancelled")]
    Cancelled,

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Debate state error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Log projection failed: {0}")]
    Replay(#[from] ReplayError),
}

/// Result type for deliberation runs
pub type DeliberationResult<T> = Result<T, DeliberationError>;

//! Error types for listcast.

use thiserror::Error;

use crate::job::JobState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("another render is in progress")]
    Busy,

    #[error("failed to spawn pipeline: {0}")]
    Spawn(String),

    #[error("pipeline failed with exit code {code:?}")]
    PipelineFailed { code: Option<i32> },

    #[error("render timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

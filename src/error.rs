//! Error types for Floodgate
//!
//! Centralized error handling using thiserror.

use std::time::Duration;
use thiserror::Error;

/// All error types that can surface from a dispatched task.
///
/// The enum is `Clone` because one settlement may fan out to every
/// caller that compacted into the same dedup key.
#[derive(Debug, Clone, Error)]
pub enum FloodgateError {
    /// The external API reported that the call rate was exceeded,
    /// optionally suggesting how long to wait. Never surfaced to
    /// callers; the dispatcher pauses and retries instead.
    #[error("Rate violation, retry after {retry_after:?}")]
    RateViolation { retry_after: Option<Duration> },

    /// The task itself failed; surfaced verbatim to the caller and
    /// never retried.
    #[error("Task error: {0}")]
    Task(String),

    /// The dispatcher was shut down before the task completed.
    #[error("Dispatcher shut down before task completed")]
    Shutdown,

    /// Invalid throttle configuration.
    #[error("Config error: {0}")]
    Config(String),
}

impl FloodgateError {
    /// Whether this failure is a flood wait that should pause dispatch.
    pub fn is_rate_violation(&self) -> bool {
        matches!(self, FloodgateError::RateViolation { .. })
    }

    /// Suggested cooldown carried by a rate violation, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FloodgateError::RateViolation { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for Floodgate operations
pub type Result<T> = std::result::Result<T, FloodgateError>;

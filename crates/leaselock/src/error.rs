use std::time::Duration;
use thiserror::Error;

/// Error type for lock operations.
///
/// Contention is never an error: a failed acquisition reports `false`, and
/// transient I/O failures become a `false` return or a no-op. Only argument
/// validation and unexpected failures of spawned wait tasks surface here.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("INVALID_TIMEOUT: timeout {actual:?} is below the {minimum:?} minimum")]
    InvalidTimeout { actual: Duration, minimum: Duration },

    #[error("INVALID_RETRY: retry {actual:?} must lie between {minimum:?} and the timeout {timeout:?}")]
    InvalidRetry {
        actual: Duration,
        minimum: Duration,
        timeout: Duration,
    },

    #[error("WAIT_TASK_FAILED: {0}")]
    WaitTaskFailed(String),
}

impl LockError {
    /// Whether this error reports invalid acquisition arguments.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            LockError::InvalidTimeout { .. } | LockError::InvalidRetry { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

//! Error types shared across the surrogate task execution engine.

use thiserror::Error;

/// Result type for surrogate operations.
pub type SurrogateResult<T> = Result<T, SurrogateError>;

#[derive(Debug, Error)]
pub enum SurrogateError {
    /// A task name failed the `\w+\.\w+\.\w+` naming policy, or used the
    /// reserved `__init__` leaf.
    #[error("naming error: {0}")]
    Naming(String),

    /// Code rejected by the validator. Carries the offending token/line.
    #[error("validation error: {0}")]
    Validation(String),

    /// `install_task` on a name that is already installed.
    #[error("task already installed: {0}")]
    AlreadyInstalled(String),

    /// An operation referenced a task name that is not installed.
    #[error("task not installed: {0}")]
    NotInstalled(String),

    /// I/O failure while installing or fetching task source.
    #[error("file access error: {0}")]
    FileAccess(String),

    /// Failure while registering a task with the execution environment.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// User task code raised during execution.
    #[error("Exception thrown within task: {0}")]
    Task(String),

    /// A sinner escalation terminated the task.
    #[error("task was killed.")]
    Killed,

    /// A waiter expired before a callback arrived.
    #[error("Timeout while performing task.")]
    Timeout,

    /// An inbound callback used a status the protocol does not define.
    #[error("Unknown return code: {0}")]
    UnknownStatus(String),

    /// A remote data handle that the data store does not recognize.
    #[error("unknown data handle: {0}")]
    UnknownHandle(String),

    /// Anything else: an internal fault, logged with detail and surfaced to
    /// the caller with only the message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for SurrogateError {
    fn from(err: std::io::Error) -> Self {
        SurrogateError::FileAccess(err.to_string())
    }
}

impl From<serde_json::Error> for SurrogateError {
    fn from(err: serde_json::Error) -> Self {
        SurrogateError::Internal(format!("JSON error: {}", err))
    }
}

impl From<String> for SurrogateError {
    fn from(err: String) -> Self {
        SurrogateError::Internal(err)
    }
}

impl From<&str> for SurrogateError {
    fn from(err: &str) -> Self {
        SurrogateError::Internal(err.to_string())
    }
}

//! Error types for the engine.

use centazio_checksum::ChecksumError;
use centazio_core::CoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error returned by user-supplied handlers.
///
/// Handler failures never escape an operation: the runner records them on
/// the object state and turns them into an `Error` result.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for user-supplied handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Errors raised by the pipeline, runner, scheduler and registry.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A store failed. Treated as an infrastructure failure that ends the
    /// function run.
    #[error("store error: {0}")]
    Store(#[from] CoreError),

    /// Checksum computation failed.
    #[error("checksum error: {0}")]
    Checksum(#[from] ChecksumError),

    /// A cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {message}")]
    InvalidCron {
        /// The offending expression.
        expression: String,
        /// Parser message.
        message: String,
    },

    /// Settings could not be loaded.
    #[error("settings error: {message}")]
    Settings {
        /// Error message.
        message: String,
    },

    /// No function is registered under this name.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A function name was registered twice.
    #[error("function already registered: {0}")]
    DuplicateFunction(String),

    /// The scheduler has been shut down.
    #[error("scheduler is shut down")]
    SchedulerClosed,
}

impl EngineError {
    /// Creates a settings error.
    pub fn settings(message: impl Into<String>) -> Self {
        EngineError::Settings {
            message: message.into(),
        }
    }

    /// Creates an invalid cron error.
    pub fn invalid_cron(expression: impl Into<String>, message: impl std::fmt::Display) -> Self {
        EngineError::InvalidCron {
            expression: expression.into(),
            message: message.to_string(),
        }
    }
}

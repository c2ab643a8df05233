//! Error types for SegurosPy.

use thiserror::Error;

/// The error type shared by every SegurosPy crate.
#[derive(Debug, Error)]
pub enum SegurosError {
    /// Invalid configuration: unreadable config file, bad trigger spec, bad offset.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lead store failure (open, query, commit).
    #[error("Store error: {0}")]
    Store(String),

    /// A notification could not be delivered (push or mail).
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Scheduler misuse, e.g. running a job id that was never registered.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Text that does not name a known enum value.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SegurosError>;

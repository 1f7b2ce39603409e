//! Error types for neuralprophet_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur in neuralprophet_core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A frequency string could not be parsed.
    #[error("Invalid frequency: {0:?}")]
    InvalidFrequency(String),

    /// The spacing of a series could not be determined.
    #[error("Frequency inference failed: {0}")]
    FrequencyInference(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

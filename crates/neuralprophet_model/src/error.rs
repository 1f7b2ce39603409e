//! Error types for neuralprophet_model.

use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while configuring or persisting a model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A component configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A name clashes with a reserved or already used name.
    #[error("Invalid name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Model inputs do not match the model.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Checkpoint could not be written or read.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] neuralprophet_data::DataError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] neuralprophet_core::CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

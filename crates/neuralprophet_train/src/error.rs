//! Error types for training and forecasting.

use thiserror::Error;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training and forecasting.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation requires a fitted model.
    #[error("Model has not been fitted: {0}")]
    NotFitted(String),

    /// Operation is only allowed before fitting.
    #[error("Model has already been fitted: {0}")]
    AlreadyFitted(String),

    /// Invalid learning rate.
    #[error("Invalid learning rate: {0}")]
    InvalidLearningRate(String),

    /// Loss became NaN or infinite.
    #[error("Training diverged: {0}")]
    Diverged(String),

    /// Invalid input data for this model.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] neuralprophet_data::DataError),

    /// Model error.
    #[error("Model error: {0}")]
    ModelError(#[from] neuralprophet_model::ModelError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] neuralprophet_core::CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

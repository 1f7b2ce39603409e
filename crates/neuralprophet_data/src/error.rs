//! Error types for neuralprophet_data.

use thiserror::Error;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while preparing time series data.
#[derive(Error, Debug)]
pub enum DataError {
    /// The frame has no rows.
    #[error("Dataframe has no rows")]
    EmptyFrame,

    /// A required column is absent.
    #[error("Column {0:?} missing from dataframe")]
    MissingColumn(String),

    /// A required column holds no values.
    #[error("Dataframe column {0:?} only has NaN rows")]
    AllNan(String),

    /// Two rows share a timestamp.
    #[error("Column ds has duplicate values: {0}")]
    DuplicateDates(String),

    /// Column lengths disagree.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Missing values remain after (or without) imputation.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// Not enough rows for the requested lags and horizon.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Dataset is empty.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Batch size error.
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(String),

    /// Split error.
    #[error("Split error: {0}")]
    SplitError(String),

    /// Normalization parameters are unavailable or invalid.
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// A timestamp or number could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// CSV reader or writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] neuralprophet_core::CoreError),
}

//! # neuralprophet_train
//!
//! Training loop, metrics and the [`NeuralProphet`] forecaster.
//!
//! This crate provides:
//! - [`Trainer`] running a [`TimeNet`](neuralprophet_model::TimeNet) under a one-cycle schedule
//! - Learning rate range test ([`find_learning_rate`])
//! - Loss functions, metrics and progress callbacks
//! - [`NeuralProphet`], which ties data preparation, training and prediction together
//! - Terminal charts of forecasts and parameters
//!
//! ## Example
//!
//! ```rust,ignore
//! use neuralprophet_train::{NeuralProphet, NeuralProphetConfig, Progress};
//!
//! let mut m = NeuralProphet::new(NeuralProphetConfig::default().with_n_lags(7).with_n_forecasts(3))?;
//! let metrics = m.fit(df.into(), None, None, Progress::Bar, false)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callback;
pub mod config;
pub mod error;
pub mod forecaster;
pub mod losses;
pub mod lr_finder;
pub mod metrics;
pub mod plot;
pub mod scheduler;
pub mod trainer;

#[cfg(feature = "live")]
pub use callback::ShowGraphCallback;
pub use callback::{Callback, CallbackContext, CallbackList, PrintCallback, Progress, ProgressBarCallback};
pub use config::{auto_batch_size, auto_epochs, OptimizerKind, TrainConfig};
pub use error::{Result, TrainError};
pub use forecaster::{ForecastBackend, HistoricPredictions, NeuralProphet, NeuralProphetConfig};
pub use losses::{HuberLoss, LossFunc};
pub use lr_finder::{find_learning_rate, lr_range_test, LrFinderConfig, LrRangeResult};
pub use metrics::{
    format_epoch_metrics, symmetric_total_percentage_error, Metric, MetricsCollection, MetricsFrame, REG_LOSS,
    VAL_SUFFIX,
};
pub use scheduler::{ConstantLR, ExponentialSweepLR, OneCycleLR, OneCycleLRConfig, Scheduler};
pub use trainer::{evaluate_epoch, Trainer, TrainingOutput};

//! # neuralprophet
//!
//! Interpretable neural time series forecasting in Rust.
//!
//! A NeuralProphet model is a sum of components, each a small neural module
//! trained jointly with burn:
//!
//! - **Trend**: piecewise linear with changepoints
//! - **Seasonality**: Fourier terms for yearly, weekly, daily and custom periods
//! - **Auto-regression**: linear or deep net over the last `n_lags` values
//! - **Lagged regressors**: the same for exogenous covariates
//! - **Events and future regressors**: known inputs, additive or multiplicative
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use neuralprophet::prelude::*;
//!
//! let df = read_csv("data/air_passengers.csv")?;
//!
//! let mut m = NeuralProphet::new(
//!     NeuralProphetConfig::default()
//!         .with_seasonality_mode(ComponentMode::Multiplicative)
//!         .with_seed(0),
//! )?;
//! let metrics = m.fit(df.clone().into(), None, None, Progress::Bar, false)?;
//!
//! let future = m.make_future_dataframe(df.into(), None, None, Some(12), HistoricPredictions::All)?;
//! let forecast = m.predict(future, true, false)?.into_single()?;
//! println!("{}", m.plot(&forecast)?);
//! ```
//!
//! ## Feature Flags
//!
//! - `live`: live terminal chart of the training loss (`Progress::Plot`)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use neuralprophet_core as core;
pub use neuralprophet_data as data;
pub use neuralprophet_model as model;
pub use neuralprophet_train as train;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use neuralprophet::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use neuralprophet_core::{Frequency, Seed, Split};

    // Data
    pub use neuralprophet_data::{
        read_csv, read_events_csv, write_csv, ComponentMode, EventsFrame, Frames, NormalizeMode, TimeSeriesFrame,
    };

    // Model
    pub use neuralprophet_model::{Growth, SeasonArg, TrendRegThreshold};

    // Forecaster
    pub use neuralprophet_train::{
        HistoricPredictions, LossFunc, Metric, MetricsFrame, NeuralProphet, NeuralProphetConfig, OptimizerKind,
        Progress,
    };
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    pub use neuralprophet_data::{
        check_dataframe, crossvalidation_split_df, double_crossvalidation_split_df, handle_missing_data,
        make_future_df, split_df, FeatureLayout, MissingDataConfig, TimeBatch, TimeDataLoader, TimeDataset,
    };
    pub use neuralprophet_model::{TimeNet, TimeNetConfig};
    pub use neuralprophet_train::{
        find_learning_rate, Callback, CallbackContext, CallbackList, MetricsCollection, OneCycleLR, Scheduler,
        TrainConfig, Trainer,
    };
}

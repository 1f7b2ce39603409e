//! # neuralprophet_data
//!
//! Frames, preprocessing and datasets for neuralprophet-rs.
//!
//! This crate provides:
//! - [`TimeSeriesFrame`] and [`Frames`] for one or many `ds`/`y` series
//! - CSV input and output
//! - Checks, missing-data imputation and normalization
//! - Train/validation splits and cross-validation folds
//! - [`TimeDataset`] windowing and [`TimeDataLoader`] batching
//!
//! ## Example
//!
//! ```rust,ignore
//! use neuralprophet_data::{read_csv, split_df};
//!
//! let frame = read_csv("air_passengers.csv")?;
//! let (train, valid) = split_df(&frame, 0, 1, 0.2, true)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod check;
mod dataset;
mod error;
mod events;
mod features;
mod frame;
mod future;
mod io;
mod layout;
mod loader;
mod missing;
mod normalize;
mod splits;

pub use check::check_dataframe;
pub use dataset::TimeDataset;
pub use error::{DataError, Result};
pub use events::{convert_events_to_features, shifted_indicator};
pub use features::{days_since_epoch, fourier_features};
pub use frame::{merge_unique_dates, EventsFrame, Frames, TimeSeriesFrame, SINGLE_FRAME_KEY};
pub use future::{make_future_df, FutureInputs};
pub use io::{
    parse_timestamp, read_csv, read_csv_from_reader, read_events_csv, write_csv, write_csv_to_writer,
    OUTPUT_DATE_FORMAT,
};
pub use layout::{
    event_offset_name, ComponentMode, CovariateSpec, EventSpec, FeatureLayout, RegressorSpec, SeasonalitySpec,
};
pub use loader::{TimeBatch, TimeDataLoader, TimeDataLoaderBuilder, TimeDataLoaderIter};
pub use missing::{add_missing_dates_nan, fill_linear_then_rolling_avg, handle_missing_data, MissingDataConfig};
pub use normalize::{normalize, DataParams, Normalization, NormalizeMode, ShiftScale, TimeParams};
pub use splits::{
    crossvalidation_split_df, double_crossvalidation_split_df, split_df, split_frames, TrainValid,
};

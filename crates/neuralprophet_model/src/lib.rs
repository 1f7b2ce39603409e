//! # neuralprophet_model
//!
//! The decomposable forecasting model and its configuration.
//!
//! ## Components
//! - [`Trend`] - piecewise-linear trend with changepoints
//! - Fourier seasonalities resolved by [`SeasonalityConfig`]
//! - [`ArNet`] - auto-regression on lagged targets and lagged covariates
//! - Events and future regressors, additive or multiplicative
//!
//! [`TimeNet`] combines them as
//! `trend + additive + trend * multiplicative` and exposes every component
//! separately through [`TimeNet::compute_components`].
//!
//! [`Regularization`] adds sparsity penalties and [`checkpoint`] saves
//! fitted models.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod components;
pub mod error;
mod init;
pub mod regularization;
pub mod seasonality;
pub mod time_net;
pub mod trend;

pub use checkpoint::{
    load_checkpoint, load_record, save_checkpoint, save_record, CheckpointMetadata, ModelCheckpoint,
};
pub use components::{regularization_lambda, ArConfig, CovariateConfig, EventConfig, RegressorConfig};
pub use error::{ModelError, Result};
pub use regularization::{delay_weight, reg_func_abs, reg_func_ar, reg_func_trend, Regularization};
pub use seasonality::{SeasonArg, SeasonalityConfig, BUILTIN_SEASONALITIES};
pub use time_net::{ArNet, TimeNet, TimeNetConfig};
pub use trend::{Growth, Trend, TrendConfig, TrendRegThreshold};

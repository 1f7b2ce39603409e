//! The NeuralProphet forecaster.
//!
//! [`NeuralProphet`] runs the whole pipeline: frame checks, frequency
//! inference, imputation, normalization, windowing into a [`TimeDataset`],
//! training of a [`TimeNet`] and reshaping of its outputs into forecast
//! frames.
//!
//! # Example
//!
//! ```rust,no_run
//! use neuralprophet_data::read_csv;
//! use neuralprophet_train::{HistoricPredictions, NeuralProphet, NeuralProphetConfig, Progress};
//!
//! let df = read_csv("air_passengers.csv")?;
//! let mut m = NeuralProphet::new(NeuralProphetConfig::default().with_seed(0))?;
//! let metrics = m.fit(df.clone().into(), None, None, Progress::Bar, false)?;
//! let future = m.make_future_dataframe(df.into(), None, None, Some(12), HistoricPredictions::None)?;
//! let forecast = m.predict(future, true, false)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use chrono::{Duration, NaiveDateTime};
use neuralprophet_core::{infer_frequency, Frequency, Seed, Split};
use neuralprophet_data::{
    check_dataframe, convert_events_to_features, crossvalidation_split_df, double_crossvalidation_split_df,
    fourier_features, handle_missing_data, make_future_df, merge_unique_dates, normalize, split_frames,
    ComponentMode, CovariateSpec, DataError, DataParams, EventSpec, EventsFrame, FeatureLayout, Frames,
    FutureInputs, MissingDataConfig, Normalization, NormalizeMode, RegressorSpec, TimeDataLoader, TimeDataset,
    TimeSeriesFrame, TrainValid,
};
use neuralprophet_model::{
    load_checkpoint, regularization_lambda, save_checkpoint, ArConfig, CheckpointMetadata, CovariateConfig,
    EventConfig, Growth, ModelError, RegressorConfig, Regularization, SeasonArg, SeasonalityConfig, TimeNet,
    TimeNetConfig, TrendConfig, TrendRegThreshold,
};
use serde::{Deserialize, Serialize};

use crate::callback::{CallbackList, Progress};
use crate::config::{OptimizerKind, TrainConfig};
use crate::error::{Result, TrainError};
use crate::losses::LossFunc;
use crate::lr_finder::find_learning_rate;
use crate::metrics::{
    format_epoch_metrics, symmetric_total_percentage_error, tensor_values, Metric, MetricsCollection, MetricsFrame,
};
use crate::plot;
use crate::trainer::{evaluate_epoch, Trainer};

/// Backend the forecaster trains on.
pub type ForecastBackend = Autodiff<NdArray<f32>>;
type InferBackend = NdArray<f32>;

const RESERVED_NAMES: [&str; 12] = [
    "trend",
    "additive_terms",
    "daily",
    "weekly",
    "yearly",
    "events",
    "holidays",
    "zeros",
    "extra_regressors_additive",
    "yhat",
    "extra_regressors_multiplicative",
    "multiplicative_terms",
];
const RESERVED_COLUMNS: [&str; 6] = ["ds", "y", "cap", "floor", "y_scaled", "cap_scaled"];

fn is_reserved(name: &str) -> bool {
    RESERVED_COLUMNS.contains(&name)
        || RESERVED_NAMES.iter().any(|r| {
            name == *r
                || name.strip_suffix("_lower") == Some(*r)
                || name.strip_suffix("_upper") == Some(*r)
        })
}

/// Hyperparameters of a [`NeuralProphet`] model.
///
/// Unset fields in a JSON file take their defaults. `collect_metrics: null`
/// disables metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralProphetConfig {
    /// Trend shape.
    pub growth: Growth,
    /// Explicit changepoint dates.
    pub changepoints: Option<Vec<NaiveDateTime>>,
    /// Number of evenly spaced changepoints.
    pub n_changepoints: usize,
    /// Share of the history that receives changepoints.
    pub changepoints_range: f64,
    /// Penalty on trend changes.
    pub trend_reg: f64,
    /// Trend changes below this threshold are free.
    pub trend_reg_threshold: TrendRegThreshold,
    /// Yearly seasonality.
    pub yearly_seasonality: SeasonArg,
    /// Weekly seasonality.
    pub weekly_seasonality: SeasonArg,
    /// Daily seasonality.
    pub daily_seasonality: SeasonArg,
    /// Mode of all seasonalities.
    pub seasonality_mode: ComponentMode,
    /// Penalty on Fourier coefficients.
    pub seasonality_reg: f64,
    /// Forecast steps per sample.
    pub n_forecasts: usize,
    /// Lagged values of `y` fed to the AR net.
    pub n_lags: usize,
    /// Hidden layers of the AR net.
    pub num_hidden_layers: usize,
    /// Width of the hidden layers.
    pub d_hidden: Option<usize>,
    /// Sparsity of the AR weights.
    pub ar_reg: Option<f64>,
    /// Maximum learning rate; found by a range test when unset.
    pub learning_rate: Option<f64>,
    /// Epochs; set from the dataset size when unset.
    pub epochs: Option<usize>,
    /// Batch size; set from the dataset size when unset.
    pub batch_size: Option<usize>,
    /// Training loss.
    pub loss_func: LossFunc,
    /// Optimizer.
    pub optimizer: OptimizerKind,
    /// Weight of the newest sample relative to the oldest.
    pub newer_samples_weight: f64,
    /// Normalized time at which sample weights start to rise.
    pub newer_samples_start: f64,
    /// Impute missing values instead of failing.
    pub impute_missing: bool,
    /// Metrics besides the loss; `None` disables metrics.
    pub collect_metrics: Option<Vec<Metric>>,
    /// Normalization of `y`.
    pub normalize: NormalizeMode,
    /// One set of normalization parameters for all series.
    pub global_normalization: bool,
    /// One time mapping for all series.
    pub global_time_normalization: bool,
    /// Normalize unseen series with the global parameters.
    pub unknown_data_normalization: bool,
    /// Seed for initialization and shuffling.
    pub seed: Option<u64>,
}

impl Default for NeuralProphetConfig {
    fn default() -> Self {
        Self {
            growth: Growth::Linear,
            changepoints: None,
            n_changepoints: 10,
            changepoints_range: 0.9,
            trend_reg: 0.0,
            trend_reg_threshold: TrendRegThreshold::Disabled,
            yearly_seasonality: SeasonArg::Auto,
            weekly_seasonality: SeasonArg::Auto,
            daily_seasonality: SeasonArg::Auto,
            seasonality_mode: ComponentMode::Additive,
            seasonality_reg: 0.0,
            n_forecasts: 1,
            n_lags: 0,
            num_hidden_layers: 0,
            d_hidden: None,
            ar_reg: None,
            learning_rate: None,
            epochs: None,
            batch_size: None,
            loss_func: LossFunc::Huber,
            optimizer: OptimizerKind::AdamW,
            newer_samples_weight: 2.0,
            newer_samples_start: 0.0,
            impute_missing: true,
            collect_metrics: Some(Metric::defaults()),
            normalize: NormalizeMode::Auto,
            global_normalization: false,
            global_time_normalization: true,
            unknown_data_normalization: false,
            seed: None,
        }
    }
}

impl NeuralProphetConfig {
    /// Set the trend shape.
    #[must_use]
    pub fn with_growth(mut self, growth: Growth) -> Self {
        self.growth = growth;
        self
    }

    /// Set the number of changepoints.
    #[must_use]
    pub fn with_n_changepoints(mut self, n: usize) -> Self {
        self.n_changepoints = n;
        self
    }

    /// Set the number of lags.
    #[must_use]
    pub fn with_n_lags(mut self, n_lags: usize) -> Self {
        self.n_lags = n_lags;
        self
    }

    /// Set the forecast horizon.
    #[must_use]
    pub fn with_n_forecasts(mut self, n_forecasts: usize) -> Self {
        self.n_forecasts = n_forecasts;
        self
    }

    /// Set the hidden layers of the AR net.
    #[must_use]
    pub fn with_num_hidden_layers(mut self, n: usize) -> Self {
        self.num_hidden_layers = n;
        self
    }

    /// Set the AR sparsity.
    #[must_use]
    pub fn with_ar_reg(mut self, ar_reg: f64) -> Self {
        self.ar_reg = Some(ar_reg);
        self
    }

    /// Set the built-in seasonalities.
    #[must_use]
    pub fn with_seasonalities(mut self, yearly: SeasonArg, weekly: SeasonArg, daily: SeasonArg) -> Self {
        self.yearly_seasonality = yearly;
        self.weekly_seasonality = weekly;
        self.daily_seasonality = daily;
        self
    }

    /// Set the seasonality mode.
    #[must_use]
    pub fn with_seasonality_mode(mut self, mode: ComponentMode) -> Self {
        self.seasonality_mode = mode;
        self
    }

    /// Set the learning rate.
    #[must_use]
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = Some(lr);
        self
    }

    /// Set the number of epochs.
    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = Some(epochs);
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Set the loss function.
    #[must_use]
    pub fn with_loss_func(mut self, loss_func: LossFunc) -> Self {
        self.loss_func = loss_func;
        self
    }

    /// Set the optimizer.
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Set the collected metrics; `None` disables them.
    #[must_use]
    pub fn with_collect_metrics(mut self, metrics: Option<Vec<Metric>>) -> Self {
        self.collect_metrics = metrics;
        self
    }

    /// Set the normalization of `y`.
    #[must_use]
    pub fn with_normalize(mut self, normalize: NormalizeMode) -> Self {
        self.normalize = normalize;
        self
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// How many historic rows `make_future_dataframe` keeps for prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoricPredictions {
    /// Only the rows the lags need.
    #[default]
    None,
    /// The whole history.
    All,
    /// The last `n` rows besides the lags.
    Last(usize),
}

/// Origin-wise predictions `[samples, n_forecasts]`, row-major.
#[derive(Debug, Clone)]
struct Matrix {
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    fn rows(&self) -> usize {
        self.data.len() / self.cols.max(1)
    }

    fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    fn column(&self, col: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.rows()).map(move |r| self.get(r, col))
    }
}

struct RawPrediction {
    dates: Vec<NaiveDateTime>,
    predicted: Matrix,
    components: Vec<(String, Matrix)>,
}

/// A decomposable neural forecaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralProphet {
    config: NeuralProphetConfig,
    n_forecasts: usize,
    trend: TrendConfig,
    seasonality: SeasonalityConfig,
    ar: ArConfig,
    train: TrainConfig,
    normalization: Normalization,
    impute_missing: bool,
    metrics: Option<Vec<Metric>>,
    covariates: Vec<CovariateConfig>,
    regressors: Vec<RegressorConfig>,
    events: Vec<EventConfig>,
    seed: Option<u64>,
    data_freq: Option<Frequency>,
    layout: Option<FeatureLayout>,
    net_config: Option<TimeNetConfig>,
    fitted: bool,
    highlight_forecast_step_n: Option<usize>,
    true_ar_weights: Option<Vec<f64>>,
    #[serde(skip)]
    model: Option<TimeNet<ForecastBackend>>,
    #[serde(skip)]
    device: NdArrayDevice,
}

impl NeuralProphet {
    /// Create an unfitted model.
    ///
    /// Without lags the horizon is always 1: a model without lags can
    /// forecast any date directly.
    ///
    /// # Errors
    ///
    /// Returns an error for out-of-range hyperparameters.
    pub fn new(config: NeuralProphetConfig) -> Result<Self> {
        let mut n_forecasts = config.n_forecasts;
        if n_forecasts == 0 {
            return Err(TrainError::InvalidConfig("n_forecasts must be at least 1".to_string()));
        }
        if config.n_lags == 0 && n_forecasts > 1 {
            n_forecasts = 1;
            tracing::warn!(
                "Changing n_forecasts to 1. Without lags, the forecast can be computed for any future time, \
                 independent of lagged values"
            );
        }

        let mut trend = TrendConfig {
            growth: config.growth,
            changepoints: config.changepoints.clone(),
            n_changepoints: config.n_changepoints,
            changepoints_range: config.changepoints_range,
            trend_reg: config.trend_reg,
            trend_reg_threshold: config.trend_reg_threshold,
        };
        trend.validate()?;

        if config.seasonality_reg < 0.0 {
            return Err(TrainError::InvalidConfig("seasonality_reg must be >= 0".to_string()));
        }
        let seasonality = SeasonalityConfig {
            mode: config.seasonality_mode,
            reg_lambda: config.seasonality_reg,
            yearly: config.yearly_seasonality,
            weekly: config.weekly_seasonality,
            daily: config.daily_seasonality,
            custom: Vec::new(),
        };

        let ar = ArConfig {
            n_lags: config.n_lags,
            num_hidden_layers: config.num_hidden_layers,
            d_hidden: config.d_hidden,
            ar_reg: config.ar_reg,
        };
        ar.validate()?;

        let train = TrainConfig {
            learning_rate: config.learning_rate,
            epochs: config.epochs,
            batch_size: config.batch_size,
            loss_func: config.loss_func,
            optimizer: config.optimizer,
            newer_samples_weight: config.newer_samples_weight,
            newer_samples_start: config.newer_samples_start,
        };
        train.validate()?;

        let mut normalization = Normalization::default();
        normalization.mode = config.normalize;
        normalization.global_normalization = config.global_normalization;
        normalization.global_time_normalization = config.global_time_normalization;
        normalization.unknown_data_normalization = config.unknown_data_normalization;

        Ok(Self {
            impute_missing: config.impute_missing,
            metrics: config.collect_metrics.clone(),
            seed: config.seed,
            config,
            n_forecasts,
            trend,
            seasonality,
            ar,
            train,
            normalization,
            covariates: Vec::new(),
            regressors: Vec::new(),
            events: Vec::new(),
            data_freq: None,
            layout: None,
            net_config: None,
            fitted: false,
            highlight_forecast_step_n: None,
            true_ar_weights: None,
            model: None,
            device: NdArrayDevice::default(),
        })
    }

    /// The configuration the model was created with.
    pub fn config(&self) -> &NeuralProphetConfig {
        &self.config
    }

    /// Forecast steps per sample after adjustment.
    pub fn n_forecasts(&self) -> usize {
        self.n_forecasts
    }

    /// Number of lags.
    pub fn n_lags(&self) -> usize {
        self.ar.n_lags
    }

    /// Whether [`fit`](Self::fit) has completed.
    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Sampling frequency found during fitting.
    pub fn data_freq(&self) -> Option<Frequency> {
        self.data_freq
    }

    /// Inputs of the fitted model.
    pub fn layout(&self) -> Option<&FeatureLayout> {
        self.layout.as_ref()
    }

    /// Learning rate used for training, once known.
    pub fn learning_rate(&self) -> Option<f64> {
        self.train.learning_rate
    }

    /// The fitted network.
    pub fn model(&self) -> Option<&TimeNet<ForecastBackend>> {
        self.model.as_ref()
    }

    fn fitted_model(&self) -> Result<&TimeNet<ForecastBackend>> {
        self.model
            .as_ref()
            .ok_or_else(|| TrainError::NotFitted("call fit before predicting".to_string()))
    }

    fn fitted_layout(&self) -> Result<&FeatureLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| TrainError::NotFitted("model inputs are set during fit".to_string()))
    }

    fn ensure_not_fitted(&self, what: &str) -> Result<()> {
        if self.fitted {
            return Err(TrainError::AlreadyFitted(format!("{what} must be added prior to model fitting")));
        }
        Ok(())
    }

    // ---- components -------------------------------------------------------

    /// Check a new component name against reserved and used names.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidName`] on a clash.
    pub fn validate_column_name(&self, name: &str) -> Result<()> {
        let clash = |reason: &str| {
            Err(TrainError::from(ModelError::InvalidName {
                name: name.to_string(),
                reason: reason.to_string(),
            }))
        };
        if is_reserved(name) {
            return clash("name is reserved");
        }
        if self.events.iter().any(|e| e.name == name) {
            return clash("already used for an event");
        }
        if self.seasonality.custom.iter().any(|s| s.name == name) {
            return clash("already used for a seasonality");
        }
        if self.covariates.iter().any(|c| c.name == name) {
            return clash("already used for an added covariate");
        }
        if self.regressors.iter().any(|r| r.name == name) {
            return clash("already used for an added regressor");
        }
        Ok(())
    }

    /// Add lagged covariates, read from columns of the same names.
    ///
    /// # Errors
    ///
    /// Returns an error after fitting, without lags, for a clashing name or
    /// a negative regularization.
    pub fn add_lagged_regressor(
        &mut self,
        names: &[&str],
        regularization: Option<f64>,
        normalize: NormalizeMode,
        only_last_value: bool,
    ) -> Result<&mut Self> {
        self.ensure_not_fitted("Covariates")?;
        if self.ar.n_lags == 0 {
            return Err(TrainError::InvalidConfig(
                "Covariates must be set jointly with Auto-Regression".to_string(),
            ));
        }
        let reg_lambda = regularization_lambda(regularization)?;
        for name in names {
            self.validate_column_name(name)?;
            self.covariates.push(CovariateConfig {
                name: (*name).to_string(),
                reg_lambda,
                normalize,
                only_last_value,
            });
        }
        Ok(self)
    }

    /// Add a regressor whose future values are known.
    ///
    /// # Errors
    ///
    /// Returns an error after fitting, for a clashing name or a negative
    /// regularization.
    pub fn add_future_regressor(
        &mut self,
        name: &str,
        regularization: Option<f64>,
        normalize: NormalizeMode,
        mode: ComponentMode,
    ) -> Result<&mut Self> {
        self.ensure_not_fitted("Regressors")?;
        let reg_lambda = regularization_lambda(regularization)?;
        self.validate_column_name(name)?;
        self.regressors.push(RegressorConfig {
            name: name.to_string(),
            reg_lambda,
            normalize,
            mode,
        });
        Ok(self)
    }

    /// Add user events with a window of affected days.
    ///
    /// # Errors
    ///
    /// Returns an error after fitting, for a clashing name, an invalid
    /// window or a negative regularization.
    pub fn add_events(
        &mut self,
        names: &[&str],
        lower_window: i32,
        upper_window: i32,
        regularization: Option<f64>,
        mode: ComponentMode,
    ) -> Result<&mut Self> {
        self.ensure_not_fitted("Events")?;
        let reg_lambda = regularization_lambda(regularization)?;
        for name in names {
            self.validate_column_name(name)?;
            let event = EventConfig {
                name: (*name).to_string(),
                lower_window,
                upper_window,
                reg_lambda,
                mode,
            };
            event.validate()?;
            self.events.push(event);
        }
        Ok(self)
    }

    /// Add a seasonality of `period` days with `fourier_order` sine/cosine pairs.
    ///
    /// # Errors
    ///
    /// Returns an error after fitting, for a built-in or used name, or a
    /// non-positive order or period.
    pub fn add_seasonality(&mut self, name: &str, period: f64, fourier_order: usize) -> Result<&mut Self> {
        self.ensure_not_fitted("Seasonality")?;
        if ["daily", "weekly", "yearly"].contains(&name) {
            tracing::error!("Please use inbuilt daily, weekly, or yearly seasonality or set another name.");
        }
        self.validate_column_name(name)?;
        self.seasonality.add_custom(name, period, fourier_order)?;
        Ok(self)
    }

    /// Focus metrics and plots on the `step`-th forecast; `None` resets.
    ///
    /// # Errors
    ///
    /// Returns an error for step 0 or a step beyond `n_forecasts`.
    pub fn highlight_nth_step_ahead_of_each_forecast(&mut self, step: Option<usize>) -> Result<&mut Self> {
        if let Some(step) = step {
            if step == 0 || step > self.n_forecasts {
                return Err(TrainError::InvalidConfig(format!(
                    "forecast step must be in 1..={}, got {step}",
                    self.n_forecasts
                )));
            }
        }
        self.highlight_forecast_step_n = step;
        Ok(self)
    }

    /// Known AR coefficients, most recent lag first; `test` then reports `sTPE`.
    pub fn set_true_ar_for_eval(&mut self, true_ar_weights: Vec<f64>) -> &mut Self {
        self.true_ar_weights = Some(true_ar_weights);
        self
    }

    /// Seed for the next fit.
    pub fn set_random_seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    fn event_names(&self) -> Vec<String> {
        self.events.iter().map(|e| e.name.clone()).collect()
    }

    fn regressor_names(&self) -> Vec<String> {
        self.regressors.iter().map(|r| r.name.clone()).collect()
    }

    fn exogenous_names(&self) -> Vec<String> {
        self.covariates
            .iter()
            .map(|c| c.name.clone())
            .chain(self.regressor_names())
            .chain(self.event_names())
            .collect()
    }

    fn missing_config(&self) -> MissingDataConfig {
        MissingDataConfig {
            n_lags: self.ar.n_lags,
            n_forecasts: self.n_forecasts,
            impute_missing: self.impute_missing,
            covariates: self.covariates.iter().map(|c| c.name.clone()).collect(),
            regressors: self.regressor_names(),
            events: self.event_names(),
            ..MissingDataConfig::default()
        }
    }

    fn regularization(&self) -> Regularization {
        Regularization {
            ar: self.ar.reg_lambda(),
            trend: (self.trend.trend_reg > 0.0).then_some(self.trend.trend_reg),
            trend_threshold: self.trend.reg_threshold(),
            seasonality: (self.seasonality.reg_lambda > 0.0).then_some(self.seasonality.reg_lambda),
            covariates: self.covariates.iter().map(|c| c.reg_lambda).collect(),
            events: self.events.iter().map(|e| e.reg_lambda).collect(),
            regressors: self.regressors.iter().map(|r| r.reg_lambda).collect(),
        }
    }

    // ---- data preparation -------------------------------------------------

    fn check_frames(
        &self,
        frames: BTreeMap<String, TimeSeriesFrame>,
        check_y: bool,
        exogenous: bool,
    ) -> Result<BTreeMap<String, TimeSeriesFrame>> {
        let required = if exogenous { self.exogenous_names() } else { Vec::new() };
        frames
            .into_iter()
            .map(|(name, frame)| Ok((name, check_dataframe(frame, check_y, &required)?)))
            .collect()
    }

    fn infer_freq(&self, frames: &BTreeMap<String, TimeSeriesFrame>, freq: Option<Frequency>) -> Result<Frequency> {
        let series = frames.iter().map(|(name, frame)| (name.as_str(), frame.ds()));
        Ok(infer_frequency(series, self.ar.n_lags, freq)?)
    }

    fn handle_missing(
        &self,
        frames: BTreeMap<String, TimeSeriesFrame>,
        freq: Frequency,
        predicting: bool,
    ) -> Result<BTreeMap<String, TimeSeriesFrame>> {
        let config = self.missing_config();
        frames
            .into_iter()
            .map(|(name, frame)| Ok((name, handle_missing_data(frame, freq, &config, predicting)?)))
            .collect()
    }

    fn normalize_frames(
        &self,
        frames: &BTreeMap<String, TimeSeriesFrame>,
    ) -> Result<BTreeMap<String, TimeSeriesFrame>> {
        frames
            .iter()
            .map(|(name, frame)| {
                let params = self.normalization.get_data_params(name)?;
                Ok((name.clone(), normalize(frame, &params)?))
            })
            .collect()
    }

    fn build_layout(&self, seasonal_dates: &[NaiveDateTime]) -> FeatureLayout {
        FeatureLayout {
            n_lags: self.ar.n_lags,
            n_forecasts: self.n_forecasts,
            seasonalities: self.seasonality.resolve(seasonal_dates),
            events: self
                .events
                .iter()
                .map(|e| EventSpec {
                    name: e.name.clone(),
                    lower_window: e.lower_window,
                    upper_window: e.upper_window,
                    mode: e.mode,
                })
                .collect(),
            regressors: self
                .regressors
                .iter()
                .map(|r| RegressorSpec {
                    name: r.name.clone(),
                    mode: r.mode,
                })
                .collect(),
            covariates: self
                .covariates
                .iter()
                .map(|c| CovariateSpec {
                    name: c.name.clone(),
                    only_last_value: c.only_last_value,
                })
                .collect(),
        }
    }

    /// Fit normalization, resolve seasonalities and build the training loader and model.
    fn init_train_loader(
        &mut self,
        frames: &BTreeMap<String, TimeSeriesFrame>,
        seed: Seed,
    ) -> Result<(TimeDataLoader, TimeNet<ForecastBackend>)> {
        let extra_columns: Vec<(String, NormalizeMode)> = self
            .covariates
            .iter()
            .map(|c| (c.name.clone(), c.normalize))
            .chain(self.regressors.iter().map(|r| (r.name.clone(), r.normalize)))
            .collect();
        self.normalization.init_data_params(frames, &extra_columns)?;
        let normalized = self.normalize_frames(frames)?;

        let time = self
            .normalization
            .global_params()
            .map(|p| p.time)
            .ok_or_else(|| DataError::Normalization("normalization parameters not initialized".to_string()))?;
        let changepoints = self.trend.normalized_changepoints(&time);

        let merged = merge_unique_dates(&normalized);
        let layout = self.build_layout(merged.ds());
        let dataset = TimeDataset::from_frames(&normalized, &layout, false)?;
        self.train.set_auto_batch_epoch(dataset.len());
        let batch_size = self.train.batch_size_or_auto(dataset.len());
        let loader = TimeDataLoader::builder(dataset)
            .batch_size(batch_size)
            .shuffle(true)
            .seed(seed.derive("shuffle"))
            .split(Split::Train)
            .build()?;

        let net_config = TimeNetConfig {
            layout: layout.clone(),
            growth: self.trend.growth,
            changepoints,
            seasonality_mode: self.seasonality.mode,
            num_hidden_layers: self.ar.num_hidden_layers,
            d_hidden: self.ar.hidden_width(self.n_forecasts),
        };
        let model = net_config.init::<ForecastBackend>(&self.device, seed);
        tracing::debug!("initialized model with {} seasonalities", layout.seasonalities.len());
        self.layout = Some(layout);
        self.net_config = Some(net_config);
        Ok((loader, model))
    }

    fn eval_loader(&self, frames: &BTreeMap<String, TimeSeriesFrame>, split: Split) -> Result<TimeDataLoader> {
        let normalized = self.normalize_frames(frames)?;
        let dataset = TimeDataset::from_frames(&normalized, self.fitted_layout()?, false)?;
        let batch_size = dataset.len().clamp(1, 1024);
        Ok(TimeDataLoader::builder(dataset).batch_size(batch_size).split(split).build()?)
    }

    fn metrics_collection(&self, metrics: &[Metric], with_reg_loss: bool) -> MetricsCollection {
        let mut collection = MetricsCollection::new(self.train.loss_func, metrics, with_reg_loss);
        if let Some(step) = self.highlight_forecast_step_n {
            collection.add_specific_target(step - 1);
        }
        if self.normalization.global_normalization && self.normalization.mode != NormalizeMode::Off {
            if let Some(params) = self.normalization.global_params() {
                let y = params.y();
                collection.set_shift_scale(y.shift, y.scale);
            }
        }
        collection
    }

    // ---- training ---------------------------------------------------------

    /// Train the model.
    ///
    /// `freq` is inferred when `None`. With `validation_df`, validation
    /// metrics are recorded after every epoch. `minimal` trains without
    /// metrics. Returns the metrics per epoch, if collected.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid data or a diverging loss.
    pub fn fit(
        &mut self,
        df: Frames,
        freq: Option<Frequency>,
        validation_df: Option<Frames>,
        progress: Progress,
        minimal: bool,
    ) -> Result<Option<MetricsFrame>> {
        let (frames, _) = df.into_map();
        if self.fitted {
            tracing::error!("Model has already been fitted. Re-fitting may break or produce different results.");
        }
        let frames = self.check_frames(frames, true, true)?;
        let freq = self.infer_freq(&frames, freq)?;
        self.data_freq = Some(freq);
        let frames = self.handle_missing(frames, freq, false)?;

        let validation_df = match validation_df {
            Some(_) if self.metrics.is_none() || minimal => {
                tracing::warn!("Ignoring validation_df because no metrics set or minimal training set.");
                None
            }
            other => other,
        };
        let val_frames = match validation_df {
            Some(df) => {
                let (val, _) = df.into_map();
                let val = self.check_frames(val, false, false)?;
                Some(self.handle_missing(val, freq, false)?)
            }
            None => None,
        };

        let metrics = self.train_model(&frames, val_frames.as_ref(), progress, minimal)?;
        self.fitted = true;
        Ok(metrics)
    }

    fn train_model(
        &mut self,
        frames: &BTreeMap<String, TimeSeriesFrame>,
        val_frames: Option<&BTreeMap<String, TimeSeriesFrame>>,
        progress: Progress,
        minimal: bool,
    ) -> Result<Option<MetricsFrame>> {
        let seed = Seed::or_entropy(self.seed);
        let (loader, model) = self.init_train_loader(frames, seed)?;

        let learning_rate = match self.train.learning_rate {
            Some(lr) => lr,
            None => {
                let lr = find_learning_rate(&model, &loader, &self.train, &self.device)?;
                tracing::info!("lr-range-test selected learning rate: {lr:.2e}");
                self.train.learning_rate = Some(lr);
                lr
            }
        };
        let epochs = self.train.epochs_or_auto(loader.len());

        let metrics = match (&self.metrics, minimal) {
            (Some(metrics), false) => Some(self.metrics_collection(metrics, true)),
            _ => None,
        };
        if metrics.is_some() && !self.normalization.global_normalization {
            tracing::warn!("When Global modeling with local normalization, metrics are displayed in normalized scale.");
        }
        let val_loader = match val_frames {
            Some(val) => Some(self.eval_loader(val, Split::Valid)?),
            None => None,
        };

        let mut callbacks = if minimal {
            match progress {
                Progress::Bar => Progress::Bar.callbacks(false),
                _ => CallbackList::new(),
            }
        } else {
            if metrics.is_none() {
                tracing::info!("No progress prints or plots possible because metrics are deactivated.");
            }
            progress.callbacks(metrics.is_some())
        };

        let regularization = self.regularization();
        let trainer = Trainer::new(&self.train, &regularization, learning_rate, epochs, self.device);
        let output = trainer.fit(model, &loader, val_loader.as_ref(), metrics, &mut callbacks)?;
        self.model = Some(output.model);
        Ok(output.metrics)
    }

    // ---- evaluation -------------------------------------------------------

    /// Metrics of the fitted model on holdout data.
    ///
    /// Reports `sTPE` as well when true AR weights are set.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted or the data is invalid.
    pub fn test(&self, df: Frames) -> Result<MetricsFrame> {
        let model = self.fitted_model()?;
        let (frames, _) = df.into_map();
        let frames = self.check_frames(frames, true, true)?;
        let freq = self.infer_freq(&frames, self.data_freq)?;
        let frames = self.handle_missing(frames, freq, false)?;
        let loader = self.eval_loader(&frames, Split::Test)?;

        let metrics = self.metrics.clone().unwrap_or_else(Metric::defaults);
        let mut collection = self.metrics_collection(&metrics, false);
        let mut row = evaluate_epoch(&model.valid(), &loader, &mut collection, &self.device)?;
        let mut frame = collection.into_frame();
        if self.true_ar_weights.is_some() {
            row.push(("sTPE".to_string(), self.eval_true_ar()?));
            frame = MetricsFrame::new(row.iter().map(|(name, _)| name.clone()).collect());
            frame.push(&row)?;
        }
        tracing::info!("Validation metrics: {}", format_epoch_metrics(None, &row));
        if !self.normalization.global_normalization {
            tracing::warn!("Note that the metrics are displayed in normalized scale because of local normalization.");
        }
        Ok(frame)
    }

    fn eval_true_ar(&self) -> Result<f64> {
        let true_weights = self
            .true_ar_weights
            .as_ref()
            .ok_or_else(|| TrainError::InvalidConfig("true AR weights not set".to_string()))?;
        let weights = self
            .fitted_model()?
            .ar_weights()
            .ok_or_else(|| TrainError::InvalidConfig("sTPE needs auto-regression (n_lags > 0)".to_string()))?;
        let pos = match self.highlight_forecast_step_n {
            Some(step) => step,
            None if self.n_forecasts > 1 => {
                return Err(TrainError::InvalidConfig(
                    "Please define forecast_lag for sTPE computation".to_string(),
                ))
            }
            None => 1,
        };
        let [d_in, d_out] = weights.dims();
        if pos > d_out {
            return Err(TrainError::InvalidConfig(format!("AR net has {d_out} outputs, step {pos} requested")));
        }
        let values = tensor_values(weights)?;
        let estimates: Vec<f64> = (0..d_in).rev().map(|l| f64::from(values[l * d_out + pos - 1])).collect();
        tracing::info!("AR parameters: {true_weights:?}\nModel weights: {estimates:?}");
        Ok(symmetric_total_percentage_error(true_weights, &estimates))
    }

    // ---- splits -----------------------------------------------------------

    fn prepare_for_split(
        &self,
        frames: BTreeMap<String, TimeSeriesFrame>,
        freq: Option<Frequency>,
    ) -> Result<BTreeMap<String, TimeSeriesFrame>> {
        let frames = self.check_frames(frames, false, false)?;
        let freq = self.infer_freq(&frames, freq)?;
        self.handle_missing(frames, freq, false)
    }

    fn prepare_single_for_split(&self, df: TimeSeriesFrame, freq: Option<Frequency>) -> Result<TimeSeriesFrame> {
        let (frames, _) = Frames::Single(df).into_map();
        Ok(Frames::from_map(self.prepare_for_split(frames, freq)?, true).into_single()?)
    }

    /// Split into training and validation data without sharing targets.
    ///
    /// Validation inputs may reuse the last `n_lags` training rows. With
    /// several series, `local_split` splits each series on its own instead
    /// of at one shared timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid data or too few samples.
    pub fn split_df(
        &self,
        df: Frames,
        freq: Option<Frequency>,
        valid_p: f64,
        local_split: bool,
    ) -> Result<(Frames, Frames)> {
        let (frames, single) = df.into_map();
        let frames = self.prepare_for_split(frames, freq)?;
        let (train, valid) = split_frames(&frames, self.ar.n_lags, self.n_forecasts, valid_p, true, local_split)?;
        Ok((Frames::from_map(train, single), Frames::from_map(valid, single)))
    }

    /// `k` rolling-origin folds of one series.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid data or fold settings.
    pub fn crossvalidation_split_df(
        &self,
        df: TimeSeriesFrame,
        freq: Option<Frequency>,
        k: usize,
        fold_pct: f64,
        fold_overlap_pct: f64,
    ) -> Result<Vec<TrainValid>> {
        let df = self.prepare_single_for_split(df, freq)?;
        Ok(crossvalidation_split_df(
            &df,
            self.ar.n_lags,
            self.n_forecasts,
            k,
            fold_pct,
            fold_overlap_pct,
        )?)
    }

    /// Validation folds and test folds of one series.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid data or fold settings.
    pub fn double_crossvalidation_split_df(
        &self,
        df: TimeSeriesFrame,
        freq: Option<Frequency>,
        k: usize,
        valid_pct: f64,
        test_pct: f64,
    ) -> Result<(Vec<TrainValid>, Vec<TrainValid>)> {
        let df = self.prepare_single_for_split(df, freq)?;
        Ok(double_crossvalidation_split_df(
            &df,
            self.ar.n_lags,
            self.n_forecasts,
            k,
            valid_pct,
            test_pct,
        )?)
    }

    // ---- future frames ----------------------------------------------------

    /// Add one indicator column per configured event.
    ///
    /// # Errors
    ///
    /// Returns an error if no events are configured or `events` holds an
    /// unknown event.
    pub fn create_df_with_events(&self, df: Frames, events: &EventsFrame) -> Result<Frames> {
        if self.events.is_empty() {
            return Err(TrainError::InvalidConfig(
                "The events configs should be added to the NeuralProphet object (add_events) before creating the \
                 data with events features"
                    .to_string(),
            ));
        }
        let names = self.event_names();
        if let Some(unknown) = events.names().into_iter().find(|e| !names.iter().any(|n| n == e)) {
            return Err(TrainError::InvalidInput(format!("event {unknown:?} was not added with add_events")));
        }
        let (frames, single) = df.into_map();
        let frames = self.check_frames(frames, true, false)?;
        let out = frames
            .into_iter()
            .map(|(name, frame)| Ok((name, convert_events_to_features(&frame, &names, events)?)))
            .collect::<Result<_>>()?;
        Ok(Frames::from_map(out, single))
    }

    /// Extend series into the future for [`predict`](Self::predict).
    ///
    /// `periods` defaults to 1 without lags and to `n_forecasts` with lags;
    /// with lags it is always `n_forecasts`. A single `regressors` frame
    /// serves every series; named frames are matched by name.
    ///
    /// # Errors
    ///
    /// Returns an error when neither history nor future rows are requested,
    /// future regressor values are missing, or a series is shorter than
    /// `n_lags`.
    pub fn make_future_dataframe(
        &self,
        df: Frames,
        events: Option<&EventsFrame>,
        regressors: Option<&Frames>,
        periods: Option<usize>,
        n_historic_predictions: HistoricPredictions,
    ) -> Result<Frames> {
        let (frames, single) = df.into_map();
        let mut out = BTreeMap::new();
        for (name, frame) in frames {
            let series_regressors = match regressors {
                Some(r) => Some(r.as_single().or_else(|| r.get(&name)).ok_or_else(|| {
                    TrainError::InvalidInput(format!("no future regressors given for series {name:?}"))
                })?),
                None => None,
            };
            let future = self.make_future_frame(frame, events, series_regressors, periods, n_historic_predictions)?;
            out.insert(name, future);
        }
        Ok(Frames::from_map(out, single))
    }

    fn make_future_frame(
        &self,
        df: TimeSeriesFrame,
        events: Option<&EventsFrame>,
        regressors: Option<&TimeSeriesFrame>,
        periods: Option<usize>,
        n_historic_predictions: HistoricPredictions,
    ) -> Result<TimeSeriesFrame> {
        let n_lags = self.ar.n_lags;
        if periods == Some(0) && n_historic_predictions == HistoricPredictions::All {
            tracing::warn!("Not extending df into future as no periods specified. You can call predict directly instead.");
        }
        let freq = infer_frequency([("__df__", df.ds())], n_lags, self.data_freq)?;
        let last_date = df.ds().iter().max().copied().ok_or(DataError::EmptyFrame)?;

        let mut periods = periods.unwrap_or(if n_lags == 0 { 1 } else { self.n_forecasts });
        let mut n_historic = match n_historic_predictions {
            HistoricPredictions::None => 0,
            HistoricPredictions::All => df.len().saturating_sub(n_lags),
            HistoricPredictions::Last(n) => n,
        };
        if periods == 0 && n_historic == 0 {
            return Err(TrainError::InvalidInput(
                "Set either history or future to contain more than zero values.".to_string(),
            ));
        }
        if !self.regressors.is_empty() && periods > 0 {
            let values = regressors.ok_or_else(|| {
                TrainError::InvalidInput("Future values of all user specified regressors not provided".to_string())
            })?;
            if let Some(missing) = self.regressors.iter().find(|r| !values.has_column(&r.name)) {
                return Err(TrainError::InvalidInput(format!(
                    "Future values of user specified regressor {} not provided",
                    missing.name
                )));
            }
        }
        if df.len() < n_lags {
            return Err(TrainError::InvalidInput("Insufficient data for a prediction".to_string()));
        }
        if df.len() < n_lags + n_historic {
            tracing::warn!(
                "Insufficient data for {n_historic} historic forecasts, reduced to {}.",
                df.len() - n_lags
            );
            n_historic = df.len() - n_lags;
        }

        let mut history = df.tail(n_lags + n_historic);
        if !history.is_empty() {
            history = if history.column_names().next().is_none() {
                check_dataframe(history, false, &[])?
            } else {
                check_dataframe(history, n_lags > 0, &self.exogenous_names())?
            };
        }

        if !self.events.is_empty() && periods > 0 && events.is_none() {
            tracing::warn!(
                "Future values not supplied for user specified events. All events being treated as not occurring in future"
            );
        }
        if n_lags > 0 && periods > 0 && periods != self.n_forecasts {
            periods = self.n_forecasts;
            tracing::warn!("Number of forecast steps is defined by n_forecasts. Adjusted to {periods}.");
        }
        if periods == 0 {
            return Ok(history);
        }

        let columns: Vec<String> = history.column_names().map(str::to_string).collect();
        let event_names = self.event_names();
        let regressor_names = self.regressor_names();
        let inputs = FutureInputs {
            event_names: &event_names,
            events,
            regressor_names: &regressor_names,
            regressors,
        };
        let future = make_future_df(&columns, last_date, periods, freq, inputs)?;
        Ok(if history.is_empty() {
            future
        } else {
            TimeSeriesFrame::concat([&history, &future])
        })
    }

    // ---- prediction -------------------------------------------------------

    /// Forecasts for every row of `df` that can be predicted.
    ///
    /// The default output has one row per date with `yhat<i>`, the forecast
    /// made `i` steps earlier, and `residual<i>`. With `decompose` the
    /// components are added: lagged ones (`ar<i>`,
    /// `lagged_regressor_<name><i>`) per step, all others once. With `raw`
    /// the output has one row per forecast origin with `step<i>` columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted or `df` cannot be
    /// predicted on.
    pub fn predict(&self, df: Frames, decompose: bool, raw: bool) -> Result<Frames> {
        if raw {
            tracing::warn!("Raw forecasts are incompatible with plotting utilities");
        }
        self.fitted_model()?;
        let (frames, single) = df.into_map();
        let (frames, periods_added) = self.maybe_extend_frames(frames)?;
        let frames = self.prepare_frames_to_predict(frames)?;

        let mut out = BTreeMap::new();
        for (name, frame) in frames {
            let params = self.normalization.get_data_params(&name)?;
            let normalized = normalize(&frame, &params)?;
            let prediction = self.predict_raw(&normalized, &params, decompose)?;
            let added = periods_added.get(&name).copied().unwrap_or(0);
            let forecast = if raw {
                let forecast = self.raw_frame(&prediction)?;
                if added > 0 {
                    forecast.slice(0..forecast.len().saturating_sub(1))
                } else {
                    forecast
                }
            } else {
                let forecast = self.forecast_frame(&normalized, &prediction)?;
                forecast.slice(0..forecast.len().saturating_sub(added))
            };
            out.insert(name, forecast);
        }
        Ok(Frames::from_map(out, single))
    }

    fn maybe_extend_frames(
        &self,
        frames: BTreeMap<String, TimeSeriesFrame>,
    ) -> Result<(BTreeMap<String, TimeSeriesFrame>, BTreeMap<String, usize>)> {
        let mut extended = BTreeMap::new();
        let mut periods_added = BTreeMap::new();
        for (name, frame) in frames {
            let freq = infer_frequency([(name.as_str(), frame.ds())], self.ar.n_lags, self.data_freq)?;
            let nan_at_end = frame
                .column("y")
                .map_or(0, |y| y.iter().rev().take_while(|v| v.is_nan()).count());
            let periods = if self.ar.n_lags > 0 && self.regressors.is_empty() {
                self.n_forecasts.saturating_sub(nan_at_end)
            } else {
                0
            };
            let frame = match frame.ds().iter().max().copied() {
                Some(last_date) if periods > 0 => {
                    let columns: Vec<String> = frame.column_names().map(str::to_string).collect();
                    let future = make_future_df(&columns, last_date, periods, freq, FutureInputs::default())?;
                    TimeSeriesFrame::concat([&frame, &future])
                }
                _ => frame,
            };
            periods_added.insert(name.clone(), periods);
            extended.insert(name, frame);
        }
        Ok((extended, periods_added))
    }

    fn prepare_frames_to_predict(
        &self,
        frames: BTreeMap<String, TimeSeriesFrame>,
    ) -> Result<BTreeMap<String, TimeSeriesFrame>> {
        let n_lags = self.ar.n_lags;
        let freq = self
            .data_freq
            .ok_or_else(|| TrainError::NotFitted("data frequency is set during fit".to_string()))?;
        let config = self.missing_config();
        frames
            .into_iter()
            .map(|(name, frame)| {
                if frame.has_column("y_scaled") || frame.has_column("t") {
                    return Err(TrainError::InvalidInput(
                        "DataFrame has already been normalized. Please provide raw dataframe or future dataframe."
                            .to_string(),
                    ));
                }
                if frame.is_empty() || frame.len() < n_lags {
                    return Err(TrainError::InvalidInput("Insufficient data to make predictions.".to_string()));
                }
                let frame = if frame.column_names().next().is_none() {
                    if n_lags != 0 {
                        return Err(TrainError::InvalidInput(
                            "only datestamps provided but y values needed for auto-regression.".to_string(),
                        ));
                    }
                    check_dataframe(frame, false, &[])?
                } else {
                    let frame = check_dataframe(frame, n_lags > 0, &[])?;
                    handle_missing_data(frame, freq, &config, true)?
                };
                Ok((name, frame))
            })
            .collect()
    }

    /// Whether a component stays relative to the trend instead of being scaled to `y`.
    fn is_multiplicative_component(&self, name: &str) -> bool {
        if name.contains("multiplicative") {
            return true;
        }
        if let Some(event) = name.strip_prefix("event_") {
            return self
                .events
                .iter()
                .any(|e| e.name == event && e.mode == ComponentMode::Multiplicative);
        }
        if let Some(regressor) = name.strip_prefix("future_regressor_") {
            return self
                .regressors
                .iter()
                .any(|r| r.name == regressor && r.mode == ComponentMode::Multiplicative);
        }
        name.starts_with("season_") && self.seasonality.mode == ComponentMode::Multiplicative
    }

    fn predict_raw(
        &self,
        frame: &TimeSeriesFrame,
        params: &DataParams,
        include_components: bool,
    ) -> Result<RawPrediction> {
        let layout = self.fitted_layout()?;
        let model = self.fitted_model()?.valid();
        let dataset = TimeDataset::new(frame, layout, true)?;
        let n_samples = dataset.len();
        let loader = TimeDataLoader::builder(dataset)
            .batch_size(n_samples.clamp(1, 1024))
            .split(Split::Test)
            .build()?;

        let n_forecasts = layout.n_forecasts;
        let mut predicted = Vec::with_capacity(n_samples * n_forecasts);
        let mut components: Vec<(String, Vec<f64>)> = Vec::new();
        for batch in loader.iter::<InferBackend>(&self.device) {
            let batch = batch?;
            predicted.extend(tensor_values(model.forward(&batch))?.into_iter().map(f64::from));
            if include_components {
                for (i, (name, values)) in model.compute_components(&batch, layout).into_iter().enumerate() {
                    if components.len() <= i {
                        components.push((name, Vec::new()));
                    }
                    components[i].1.extend(tensor_values(values)?.into_iter().map(f64::from));
                }
            }
        }

        let y = params.y();
        predicted.iter_mut().for_each(|v| *v = *v * y.scale + y.shift);
        for (name, values) in &mut components {
            if self.is_multiplicative_component(name) {
                continue;
            }
            let shift = if name.contains("trend") { y.shift } else { 0.0 };
            values.iter_mut().for_each(|v| *v = *v * y.scale + shift);
        }

        let n_lags = layout.n_lags;
        Ok(RawPrediction {
            dates: frame.ds()[n_lags..n_lags + n_samples].to_vec(),
            predicted: Matrix {
                cols: n_forecasts,
                data: predicted,
            },
            components: components
                .into_iter()
                .map(|(name, data)| {
                    (
                        name,
                        Matrix {
                            cols: n_forecasts,
                            data,
                        },
                    )
                })
                .collect(),
        })
    }

    /// One row per forecast origin: `step<i>` and `<component><i>` for `i` in `0..n_forecasts`.
    fn raw_frame(&self, prediction: &RawPrediction) -> Result<TimeSeriesFrame> {
        let mut frame = TimeSeriesFrame::new(prediction.dates.clone());
        for step in 0..self.n_forecasts {
            frame.set_column(&format!("step{step}"), prediction.predicted.column(step).collect())?;
        }
        for (name, values) in &prediction.components {
            for step in 0..self.n_forecasts {
                frame.set_column(&format!("{name}{step}"), values.column(step).collect())?;
            }
        }
        Ok(frame)
    }

    /// One row per target date of `frame`.
    fn forecast_frame(&self, frame: &TimeSeriesFrame, prediction: &RawPrediction) -> Result<TimeSeriesFrame> {
        let n = frame.len();
        let n_lags = self.ar.n_lags;
        let n_forecasts = self.n_forecasts;
        let y: Vec<f64> = frame.column("y").map_or_else(|| vec![f64::NAN; n], <[f64]>::to_vec);

        // yhat<step> of row r is the forecast made at origin r - n_lags - step + 1.
        let by_step = |values: &Matrix, step: usize| -> Vec<f64> {
            let mut out = vec![f64::NAN; n_lags + step - 1];
            out.extend(values.column(step - 1));
            out.resize(n, f64::NAN);
            out
        };

        let mut out = TimeSeriesFrame::from_series(frame.ds().to_vec(), y.clone())?;
        for step in 1..=n_forecasts {
            let yhat = by_step(&prediction.predicted, step);
            let residual = yhat.iter().zip(&y).map(|(f, a)| f - a).collect();
            out.set_column(&format!("yhat{step}"), yhat)?;
            out.set_column(&format!("residual{step}"), residual)?;
        }

        let mut lagged = vec!["ar".to_string()];
        lagged.extend(self.covariates.iter().map(|c| format!("lagged_regressor_{}", c.name)));
        for name in &lagged {
            if let Some((_, values)) = prediction.components.iter().find(|(n, _)| n == name) {
                for step in 1..=n_forecasts {
                    out.set_column(&format!("{name}{step}"), by_step(values, step))?;
                }
            }
        }
        for (name, values) in &prediction.components {
            if lagged.contains(name) || values.rows() == 0 {
                continue;
            }
            let mut column = vec![f64::NAN; n_lags];
            column.extend((0..n_forecasts).map(|f| values.get(0, f)));
            column.extend((1..values.rows()).map(|r| values.get(r, n_forecasts - 1)));
            column.resize(n, f64::NAN);
            out.set_column(name, column)?;
        }
        Ok(out)
    }

    /// The trend on the dates of `df`, in units of `y`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted or `df` is invalid.
    pub fn predict_trend(&self, df: Frames) -> Result<Frames> {
        let model = self.fitted_model()?.valid();
        let (frames, single) = df.into_map();
        let frames = self.check_frames(frames, false, false)?;
        let mut out = BTreeMap::new();
        for (name, frame) in frames {
            let params = self.normalization.get_data_params(&name)?;
            let normalized = normalize(&frame, &params)?;
            let t: Vec<f32> = normalized.require("t")?.iter().map(|v| *v as f32).collect();
            let n = t.len();
            let t = Tensor::<InferBackend, 1>::from_floats(t.as_slice(), &self.device).reshape([n, 1]);
            let y = params.y();
            let trend = tensor_values(model.trend(t))?
                .into_iter()
                .map(|v| f64::from(v) * y.scale + y.shift)
                .collect();
            out.insert(name, TimeSeriesFrame::new(frame.ds().to_vec()).with_column("trend", trend)?);
        }
        Ok(Frames::from_map(out, single))
    }

    /// Every seasonality on the dates of `df`, one column per seasonality.
    ///
    /// Additive seasonalities are in units of `y`, multiplicative ones
    /// relative to the trend.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted or `df` is invalid.
    pub fn predict_seasonal_components(&self, df: Frames) -> Result<Frames> {
        let model = self.fitted_model()?.valid();
        let seasonalities = self.fitted_layout()?.seasonalities.clone();
        let layout = FeatureLayout {
            seasonalities: seasonalities.clone(),
            ..FeatureLayout::new(0, 1)
        };
        let (frames, single) = df.into_map();
        let frames = self.check_frames(frames, false, false)?;
        let mut out = BTreeMap::new();
        for (name, frame) in frames {
            let params = self.normalization.get_data_params(&name)?;
            let normalized = normalize(&frame, &params)?;
            let dataset = TimeDataset::new(&normalized, &layout, true)?;
            let loader = TimeDataLoader::builder(dataset)
                .batch_size(frame.len().clamp(1, 4096))
                .split(Split::Test)
                .build()?;
            let mut predicted: Vec<Vec<f64>> = vec![Vec::new(); seasonalities.len()];
            for batch in loader.iter::<InferBackend>(&self.device) {
                let batch = batch?;
                for (i, features) in batch.seasonalities.into_iter().enumerate() {
                    let values = tensor_values(model.seasonality(i, features))?;
                    predicted[i].extend(values.into_iter().map(f64::from));
                }
            }
            let scale = match self.seasonality.mode {
                ComponentMode::Additive => params.y().scale,
                ComponentMode::Multiplicative => 1.0,
            };
            let mut result = TimeSeriesFrame::new(frame.ds().to_vec());
            for (spec, values) in seasonalities.iter().zip(predicted) {
                result.set_column(&spec.name, values.into_iter().map(|v| v * scale).collect())?;
            }
            out.insert(name, result);
        }
        Ok(Frames::from_map(out, single))
    }

    // ---- persistence ------------------------------------------------------

    /// Save the fitted model and its state into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted or writing fails.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let model = self.fitted_model()?;
        let net = self
            .net_config
            .clone()
            .ok_or_else(|| TrainError::NotFitted("no model to save".to_string()))?;
        let metadata = CheckpointMetadata::new(net)
            .with_state(self)?
            .with_extra("name", "NeuralProphet");
        save_checkpoint(model, &metadata, dir)?;
        Ok(())
    }

    /// Restore a model saved with [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns an error if the files are missing or incompatible.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let device = NdArrayDevice::default();
        let (model, metadata) = load_checkpoint::<ForecastBackend>(dir, &device)?;
        let mut forecaster: Self = metadata.state()?;
        forecaster.model = Some(model);
        forecaster.device = device;
        Ok(forecaster)
    }

    // ---- plotting ---------------------------------------------------------

    /// Chart of a single-series [`predict`](Self::predict) output.
    ///
    /// With lags and fewer forecasts than `n_forecasts`, falls back to one
    /// line per forecast origin.
    ///
    /// # Errors
    ///
    /// Returns an error if `forecast` lacks `yhat` columns.
    pub fn plot(&self, forecast: &TimeSeriesFrame) -> Result<String> {
        if self.ar.n_lags > 0 {
            let n_forecasts = forecast
                .column("yhat1")
                .map_or(0, |v| v.iter().filter(|x| !x.is_nan()).count());
            if n_forecasts < self.n_forecasts {
                tracing::warn!(
                    "Too few forecasts to plot a line per forecast step. Plotting a line per forecast origin instead."
                );
                return self.plot_last_forecast(forecast, n_forecasts.saturating_sub(1), Some(true));
            }
        }
        plot::plot_forecast(forecast, self.highlight_forecast_step_n)
    }

    /// Chart of the most recent forecast and `include_previous_forecasts`
    /// earlier ones.
    ///
    /// `plot_history_data`: `None` shows the lag window, `Some(false)` only
    /// the forecasts, `Some(true)` the whole history.
    ///
    /// # Errors
    ///
    /// Returns an error for a model without lags.
    pub fn plot_last_forecast(
        &self,
        forecast: &TimeSeriesFrame,
        include_previous_forecasts: usize,
        plot_history_data: Option<bool>,
    ) -> Result<String> {
        if self.ar.n_lags == 0 {
            return Err(TrainError::InvalidConfig(
                "Use the standard plot function for models without lags.".to_string(),
            ));
        }
        let window = match plot_history_data {
            None => forecast.tail(include_previous_forecasts + self.n_forecasts + self.ar.n_lags),
            Some(false) => forecast.tail(include_previous_forecasts + self.n_forecasts),
            Some(true) => forecast.clone(),
        };
        plot::plot_last_forecast(&window, self.n_forecasts, include_previous_forecasts)
    }

    /// Charts of every component in a decomposed forecast.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted.
    pub fn plot_components(&self, forecast: &TimeSeriesFrame) -> Result<String> {
        let layout = self.fitted_layout()?;
        let mut names = vec!["trend".to_string()];
        names.extend(layout.seasonalities.iter().map(|s| format!("season_{}", s.name)));
        if layout.n_lags > 0 {
            names.push("ar".to_string());
        }
        names.extend(layout.covariates.iter().map(|c| format!("lagged_regressor_{}", c.name)));
        for group in ["events", "future_regressors"] {
            for mode in ["additive", "multiplicative"] {
                names.push(format!("{group}_{mode}"));
            }
        }
        names.extend(layout.events.iter().map(|e| format!("event_{}", e.name)));
        names.extend(layout.regressors.iter().map(|r| format!("future_regressor_{}", r.name)));
        Ok(plot::plot_components(forecast, &names, self.highlight_forecast_step_n))
    }

    /// Charts and tables of the fitted parameters: trend, one period of every
    /// seasonality, AR weights and exogenous coefficients.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted.
    pub fn plot_parameters(&self) -> Result<String> {
        const POINTS: usize = 100;
        let model = self.fitted_model()?.valid();
        let layout = self.fitted_layout()?;
        let params = self
            .normalization
            .global_params()
            .ok_or_else(|| TrainError::NotFitted("normalization parameters not initialized".to_string()))?;
        let y = params.y();
        let mut out = String::new();

        if self.trend.growth != Growth::Off {
            let t: Vec<f32> = (0..POINTS).map(|i| i as f32 / (POINTS - 1) as f32).collect();
            let t = Tensor::<InferBackend, 1>::from_floats(t.as_slice(), &self.device).reshape([POINTS, 1]);
            let trend = tensor_values(model.trend(t))?
                .into_iter()
                .map(|v| f64::from(v) * y.scale + y.shift)
                .collect();
            out.push_str(
                &plot::Chart::new("Trend")
                    .with_x_label(format!(
                        "ds: {} → {}",
                        params.time.denormalize(0.0),
                        params.time.denormalize(1.0)
                    ))
                    .with_series("trend", trend)
                    .render(),
            );
        }

        for (i, spec) in layout.seasonalities.iter().enumerate() {
            let step_seconds = spec.period * 86_400.0 / POINTS as f64;
            let dates: Vec<NaiveDateTime> = (0..POINTS)
                .map(|k| params.time.start + Duration::seconds((k as f64 * step_seconds) as i64))
                .collect();
            let features = fourier_features(&dates, spec.period, spec.fourier_order);
            let dims = features.ncols();
            let flat: Vec<f32> = features.iter().copied().collect();
            let features = Tensor::<InferBackend, 1>::from_floats(flat.as_slice(), &self.device).reshape([POINTS, 1, dims]);
            let scale = match self.seasonality.mode {
                ComponentMode::Additive => y.scale,
                ComponentMode::Multiplicative => 1.0,
            };
            let values = tensor_values(model.seasonality(i, features))?
                .into_iter()
                .map(|v| f64::from(v) * scale)
                .collect();
            out.push_str(
                &plot::Chart::new(format!("Seasonality: {}", spec.name))
                    .with_x_label(format!("one period of {} days", spec.period))
                    .with_series(spec.name.as_str(), values)
                    .render(),
            );
        }

        if let Some(weights) = model.ar_weights() {
            let step = self.highlight_forecast_step_n.unwrap_or(1);
            let [d_in, d_out] = weights.dims();
            let values = tensor_values(weights)?;
            let coefficients: Vec<(String, f64)> = (0..d_in)
                .rev()
                .map(|l| (format!("lag {}", d_in - l), f64::from(values[l * d_out + (step - 1).min(d_out - 1)])))
                .collect();
            out.push_str(&plot::coefficient_table(
                &format!("AR weights (forecast step {step})"),
                &coefficients,
            ));
        }
        for (spec, weights) in layout.covariates.iter().zip(model.covariate_weights()) {
            let [d_in, d_out] = weights.dims();
            let values = tensor_values(weights)?;
            let coefficients: Vec<(String, f64)> = (0..d_in)
                .rev()
                .map(|l| (format!("lag {}", d_in - l), f64::from(values[l * d_out])))
                .collect();
            out.push_str(&plot::coefficient_table(
                &format!("Lagged regressor: {}", spec.name),
                &coefficients,
            ));
        }
        let mut coefficients = Vec::new();
        for (spec, weights) in layout.events.iter().zip(model.event_weights()) {
            let values = tensor_values(weights.unsqueeze::<2>())?;
            coefficients.extend(spec.feature_names().into_iter().zip(values.into_iter().map(f64::from)));
        }
        for (spec, weights) in layout.regressors.iter().zip(model.regressor_weights()) {
            let values = tensor_values(weights.unsqueeze::<2>())?;
            coefficients.extend(values.into_iter().map(|v| (spec.name.clone(), f64::from(v))));
        }
        if !coefficients.is_empty() {
            out.push_str(&plot::coefficient_table("Events and future regressors", &coefficients));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn daily(n: usize) -> TimeSeriesFrame {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let ds = (0..n).map(|i| start + Duration::days(i as i64)).collect();
        let y = (0..n).map(|i| (i as f64 * 0.3).sin() + i as f64 * 0.05).collect();
        TimeSeriesFrame::from_series(ds, y).unwrap()
    }

    #[test]
    fn test_n_forecasts_without_lags_is_one() {
        let m = NeuralProphet::new(NeuralProphetConfig::default().with_n_forecasts(5)).unwrap();
        assert_eq!(m.n_forecasts(), 1);
        let m = NeuralProphet::new(NeuralProphetConfig::default().with_n_lags(3).with_n_forecasts(5)).unwrap();
        assert_eq!(m.n_forecasts(), 5);
    }

    #[test]
    fn test_reserved_and_used_names() {
        let mut m = NeuralProphet::new(NeuralProphetConfig::default().with_n_lags(2)).unwrap();
        for name in ["trend", "yhat_upper", "extra_regressors_additive_lower", "ds", "y_scaled"] {
            assert!(m.validate_column_name(name).is_err(), "{name} should be reserved");
        }
        assert!(m.validate_column_name("temperature").is_ok());
        assert!(m.validate_column_name("trend_up").is_ok());

        m.add_future_regressor("temperature", None, NormalizeMode::Auto, ComponentMode::Additive)
            .unwrap();
        assert!(m.add_events(&["temperature"], 0, 0, None, ComponentMode::Additive).is_err());
        assert!(m.add_seasonality("temperature", 30.0, 3).is_err());
        assert!(m.add_seasonality("weekly", 7.0, 3).is_err());
        m.add_seasonality("monthly", 30.5, 5).unwrap();
        assert!(m
            .add_lagged_regressor(&["monthly"], None, NormalizeMode::Auto, false)
            .is_err());
    }

    #[test]
    fn test_add_validation() {
        let mut m = NeuralProphet::new(NeuralProphetConfig::default()).unwrap();
        assert!(matches!(
            m.add_lagged_regressor(&["x"], None, NormalizeMode::Auto, false),
            Err(TrainError::InvalidConfig(_))
        ));
        assert!(m
            .add_future_regressor("x", Some(-1.0), NormalizeMode::Auto, ComponentMode::Additive)
            .is_err());
        assert!(m.add_events(&["launch"], 1, 0, None, ComponentMode::Additive).is_err());
        m.add_events(&["launch", "sale"], -1, 1, Some(0.0), ComponentMode::Multiplicative)
            .unwrap();
        assert_eq!(m.events.len(), 2);
        assert_eq!(m.events[0].reg_lambda, None);
        assert!(m.add_seasonality("monthly", 30.5, 0).is_err());

        m.fitted = true;
        assert!(matches!(
            m.add_seasonality("quarterly", 91.0, 2),
            Err(TrainError::AlreadyFitted(_))
        ));
    }

    #[test]
    fn test_highlight_step_range() {
        let mut m = NeuralProphet::new(NeuralProphetConfig::default().with_n_lags(4).with_n_forecasts(3)).unwrap();
        assert!(m.highlight_nth_step_ahead_of_each_forecast(Some(3)).is_ok());
        assert!(m.highlight_nth_step_ahead_of_each_forecast(Some(4)).is_err());
        assert!(m.highlight_nth_step_ahead_of_each_forecast(Some(0)).is_err());
        assert!(m.highlight_nth_step_ahead_of_each_forecast(None).is_ok());
    }

    #[test]
    fn test_make_future_dataframe_periods() {
        let m = NeuralProphet::new(NeuralProphetConfig::default()).unwrap();
        let df = daily(30);
        let future = m
            .make_future_dataframe(df.clone().into(), None, None, Some(10), HistoricPredictions::None)
            .unwrap()
            .into_single()
            .unwrap();
        assert_eq!(future.len(), 10);
        assert_eq!(future.first_date(), Some(df.ds()[29] + Duration::days(1)));
        assert!(future.column("y").unwrap().iter().all(|v| v.is_nan()));

        let with_history = m
            .make_future_dataframe(df.clone().into(), None, None, Some(10), HistoricPredictions::All)
            .unwrap()
            .into_single()
            .unwrap();
        assert_eq!(with_history.len(), 40);

        assert!(m
            .make_future_dataframe(df.into(), None, None, Some(0), HistoricPredictions::None)
            .is_err());
    }

    #[test]
    fn test_make_future_dataframe_with_lags_uses_horizon() {
        let m = NeuralProphet::new(NeuralProphetConfig::default().with_n_lags(5).with_n_forecasts(3)).unwrap();
        let future = m
            .make_future_dataframe(daily(30).into(), None, None, Some(10), HistoricPredictions::None)
            .unwrap()
            .into_single()
            .unwrap();
        // 5 lag rows and 3 future rows
        assert_eq!(future.len(), 8);
        assert!(m
            .make_future_dataframe(daily(4).into(), None, None, None, HistoricPredictions::None)
            .is_err());
    }

    #[test]
    fn test_future_regressors_required() {
        let mut m = NeuralProphet::new(NeuralProphetConfig::default()).unwrap();
        m.add_future_regressor("temp", None, NormalizeMode::Auto, ComponentMode::Additive)
            .unwrap();
        let df = daily(10);
        let temps = df.clone().with_column("temp", vec![1.0; 10]).unwrap();
        assert!(m
            .make_future_dataframe(temps.clone().into(), None, None, Some(2), HistoricPredictions::None)
            .is_err());
        let future_temp = TimeSeriesFrame::new(vec![]).with_column("temp", vec![]).unwrap();
        let future = m
            .make_future_dataframe(temps.into(), None, Some(&future_temp.into()), Some(2), HistoricPredictions::None)
            .unwrap()
            .into_single()
            .unwrap();
        assert!(future.column("temp").unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_predict_requires_fit() {
        let m = NeuralProphet::new(NeuralProphetConfig::default()).unwrap();
        assert!(matches!(m.predict(daily(10).into(), true, false), Err(TrainError::NotFitted(_))));
        let dir = tempfile::tempdir().unwrap();
        assert!(m.save(dir.path()).is_err());
    }

    #[test]
    fn test_save_load_roundtrip_keeps_state() {
        let config = NeuralProphetConfig::default()
            .with_n_lags(2)
            .with_epochs(2)
            .with_learning_rate(0.05)
            .with_seed(3);
        let mut m = NeuralProphet::new(config).unwrap();
        let df = daily(40);
        m.fit(df.clone().into(), None, None, Progress::None, true).unwrap();

        let dir = tempfile::tempdir().unwrap();
        m.save(dir.path()).unwrap();
        let loaded = NeuralProphet::load(dir.path()).unwrap();

        assert!(loaded.is_fitted());
        assert_eq!(loaded.config(), m.config());
        assert_eq!(loaded.data_freq(), Some(Frequency::DAILY));
        assert_eq!(loaded.layout(), m.layout());

        let yhat = |model: &NeuralProphet| {
            model
                .predict(df.clone().into(), false, false)
                .unwrap()
                .into_single()
                .unwrap()
                .column("yhat1")
                .unwrap()
                .to_vec()
        };
        for (a, b) in yhat(&m).iter().zip(yhat(&loaded)) {
            assert!((a.is_nan() && b.is_nan()) || (a - b).abs() < 1e-6, "{a} != {b}");
        }
    }

    #[test]
    fn test_config_json_defaults() {
        let config: NeuralProphetConfig = serde_json::from_str(r#"{"n_lags": 3, "collect_metrics": null}"#).unwrap();
        assert_eq!(config.n_lags, 3);
        assert_eq!(config.n_changepoints, 10);
        assert!(config.collect_metrics.is_none());
        assert_eq!(NeuralProphetConfig::default().collect_metrics, Some(Metric::defaults()));
    }
}

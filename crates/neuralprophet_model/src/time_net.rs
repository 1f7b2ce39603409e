//! TimeNet: the decomposable forecasting model.
//!
//! ```text
//! yhat = trend + additive + trend.detach() * multiplicative
//! ```
//!
//! Additive terms are the seasonalities (in additive mode), the AR-Net on
//! lagged `y`, one net per lagged covariate, and additive events and
//! future regressors. Multiplicative terms scale the trend.

use burn::module::Param;
use burn::nn::Linear;
use burn::prelude::*;
use burn::tensor::activation::relu;
use neuralprophet_core::Seed;
use neuralprophet_data::{ComponentMode, FeatureLayout, TimeBatch};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::init::{kaiming_linear, xavier_param};
use crate::trend::{Growth, Trend};

/// Feed-forward net from lagged inputs to the forecast steps.
///
/// Hidden layers use ReLU; the output layer has no bias.
#[derive(Module, Debug)]
pub struct ArNet<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl<B: Backend> ArNet<B> {
    fn new(
        d_input: usize,
        d_hidden: usize,
        num_hidden_layers: usize,
        d_output: usize,
        rng: &mut ChaCha8Rng,
        device: &B::Device,
    ) -> Self {
        let mut layers = Vec::with_capacity(num_hidden_layers + 1);
        let mut d_in = d_input;
        for _ in 0..num_hidden_layers {
            layers.push(kaiming_linear(rng, d_in, d_hidden, true, device));
            d_in = d_hidden;
        }
        layers.push(kaiming_linear(rng, d_in, d_output, false, device));
        Self { layers }
    }

    /// Map inputs `[N, d_input]` to `[N, d_output]`.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        self.layers.iter().enumerate().fold(x, |out, (i, layer)| {
            let out = layer.forward(out);
            if i < last {
                relu(out)
            } else {
                out
            }
        })
    }

    /// Weights of the input layer `[d_input, d_out]`.
    pub fn input_weights(&self) -> Tensor<B, 2> {
        self.layers[0].weight.val()
    }
}

/// Everything needed to build a [`TimeNet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeNetConfig {
    /// Inputs the model consumes.
    pub layout: FeatureLayout,
    /// Trend shape.
    pub growth: Growth,
    /// Changepoints in normalized time.
    pub changepoints: Vec<f64>,
    /// Mode shared by all seasonalities.
    pub seasonality_mode: ComponentMode,
    /// Hidden layers of the AR and covariate nets.
    pub num_hidden_layers: usize,
    /// Width of the hidden layers.
    pub d_hidden: usize,
}

impl TimeNetConfig {
    /// Initialize the model with weights drawn from `seed`.
    pub fn init<B: Backend>(&self, device: &B::Device, seed: Seed) -> TimeNet<B> {
        TimeNet::new(self, device, seed)
    }
}

/// The forecasting model.
#[derive(Module, Debug)]
pub struct TimeNet<B: Backend> {
    trend: Option<Trend<B>>,
    seasonalities: Vec<Param<Tensor<B, 1>>>,
    ar: Option<ArNet<B>>,
    covariates: Vec<ArNet<B>>,
    events: Vec<Param<Tensor<B, 1>>>,
    regressors: Vec<Param<Tensor<B, 1>>>,
    season_multiplicative: bool,
    event_multiplicative: Vec<bool>,
    regressor_multiplicative: Vec<bool>,
    n_forecasts: usize,
}

fn weighted_sum<B: Backend>(features: Tensor<B, 3>, weights: Tensor<B, 1>) -> Tensor<B, 2> {
    let [n, f, d] = features.dims();
    (features * weights.reshape([1, 1, d])).sum_dim(2).reshape([n, f])
}

fn sum_all<B: Backend>(terms: Vec<Tensor<B, 2>>) -> Option<Tensor<B, 2>> {
    terms.into_iter().reduce(|acc, t| acc + t)
}

impl<B: Backend> TimeNet<B> {
    /// Create a new model.
    pub fn new(config: &TimeNetConfig, device: &B::Device, seed: Seed) -> Self {
        let mut rng = seed.derive("init").to_rng();
        let layout = &config.layout;
        let n_forecasts = layout.n_forecasts;

        let trend = (config.growth != Growth::Off)
            .then(|| Trend::new(config.growth, &config.changepoints, &mut rng, device));
        let seasonalities = layout
            .seasonalities
            .iter()
            .map(|s| xavier_param(&mut rng, s.dims(), device))
            .collect();
        let ar = (layout.n_lags > 0).then(|| {
            ArNet::new(
                layout.n_lags,
                config.d_hidden,
                config.num_hidden_layers,
                n_forecasts,
                &mut rng,
                device,
            )
        });
        let covariates = layout
            .covariates
            .iter()
            .map(|c| {
                ArNet::new(
                    layout.covariate_inputs(c),
                    config.d_hidden,
                    config.num_hidden_layers,
                    n_forecasts,
                    &mut rng,
                    device,
                )
            })
            .collect();
        let events = layout
            .events
            .iter()
            .map(|e| xavier_param(&mut rng, e.offsets().len(), device))
            .collect();
        let regressors = layout
            .regressors
            .iter()
            .map(|_| xavier_param(&mut rng, 1, device))
            .collect();

        Self {
            trend,
            seasonalities,
            ar,
            covariates,
            events,
            regressors,
            season_multiplicative: config.seasonality_mode == ComponentMode::Multiplicative,
            event_multiplicative: layout
                .events
                .iter()
                .map(|e| e.mode == ComponentMode::Multiplicative)
                .collect(),
            regressor_multiplicative: layout
                .regressors
                .iter()
                .map(|r| r.mode == ComponentMode::Multiplicative)
                .collect(),
            n_forecasts,
        }
    }

    /// Number of forecast steps per sample.
    pub fn n_forecasts(&self) -> usize {
        self.n_forecasts
    }

    /// Trend at normalized times `[N, F]`; zeros without a trend.
    pub fn trend(&self, t: Tensor<B, 2>) -> Tensor<B, 2> {
        match &self.trend {
            Some(trend) => trend.forward(t),
            None => t.zeros_like(),
        }
    }

    /// Effect of seasonality `index` given its Fourier features `[N, F, D]`.
    pub fn seasonality(&self, index: usize, features: Tensor<B, 3>) -> Tensor<B, 2> {
        weighted_sum(features, self.seasonalities[index].val())
    }

    /// AR-Net output for lags `[N, L]`.
    pub fn auto_regression(&self, lags: Tensor<B, 2>) -> Option<Tensor<B, 2>> {
        self.ar.as_ref().map(|ar| ar.forward(lags))
    }

    /// Effect of lagged covariate `index`.
    pub fn covariate(&self, index: usize, lags: Tensor<B, 2>) -> Tensor<B, 2> {
        self.covariates[index].forward(lags)
    }

    /// Effect of event `index` given its window features `[N, F, W]`.
    pub fn event(&self, index: usize, features: Tensor<B, 3>) -> Tensor<B, 2> {
        weighted_sum(features, self.events[index].val())
    }

    /// Effect of future regressor `index` given its values `[N, F]`.
    pub fn regressor(&self, index: usize, values: Tensor<B, 2>) -> Tensor<B, 2> {
        values * self.regressors[index].val().reshape([1, 1])
    }

    fn additive_and_multiplicative(&self, batch: &TimeBatch<B>) -> (Option<Tensor<B, 2>>, Option<Tensor<B, 2>>) {
        let mut additive = Vec::new();
        let mut multiplicative = Vec::new();

        for (i, features) in batch.seasonalities.iter().enumerate() {
            let effect = self.seasonality(i, features.clone());
            if self.season_multiplicative {
                multiplicative.push(effect);
            } else {
                additive.push(effect);
            }
        }
        if let Some(lags) = &batch.lags {
            additive.extend(self.auto_regression(lags.clone()));
        }
        for (i, lags) in batch.covariates.iter().enumerate() {
            additive.push(self.covariate(i, lags.clone()));
        }
        for (i, features) in batch.events.iter().enumerate() {
            let effect = self.event(i, features.clone());
            if self.event_multiplicative[i] {
                multiplicative.push(effect);
            } else {
                additive.push(effect);
            }
        }
        for (i, values) in batch.regressors.iter().enumerate() {
            let effect = self.regressor(i, values.clone());
            if self.regressor_multiplicative[i] {
                multiplicative.push(effect);
            } else {
                additive.push(effect);
            }
        }
        (sum_all(additive), sum_all(multiplicative))
    }

    /// Forecast `[N, F]` in normalized units.
    ///
    /// The trend enters the multiplicative term detached, so multiplicative
    /// components do not pull on the trend parameters.
    pub fn forward(&self, batch: &TimeBatch<B>) -> Tensor<B, 2> {
        let trend = self.trend(batch.time.clone());
        let (additive, multiplicative) = self.additive_and_multiplicative(batch);
        let mut out = trend.clone();
        if let Some(additive) = additive {
            out = out + additive;
        }
        if let Some(multiplicative) = multiplicative {
            out = out + trend.detach() * multiplicative;
        }
        out
    }

    /// Every component of the forecast `[N, F]` in normalized units.
    ///
    /// Names: `trend`, `season_<name>`, `ar`, `lagged_regressor_<name>`,
    /// `events_additive`, `events_multiplicative`, `event_<name>`,
    /// `future_regressors_additive`, `future_regressors_multiplicative` and
    /// `future_regressor_<name>`. Multiplicative components are relative to
    /// the trend. Groups without members are left out.
    pub fn compute_components(&self, batch: &TimeBatch<B>, layout: &FeatureLayout) -> Vec<(String, Tensor<B, 2>)> {
        let mut components = vec![("trend".to_string(), self.trend(batch.time.clone()))];

        for (i, (spec, features)) in layout.seasonalities.iter().zip(&batch.seasonalities).enumerate() {
            components.push((format!("season_{}", spec.name), self.seasonality(i, features.clone())));
        }
        if let Some(ar) = batch.lags.clone().and_then(|lags| self.auto_regression(lags)) {
            components.push(("ar".to_string(), ar));
        }
        for (i, (spec, lags)) in layout.covariates.iter().zip(&batch.covariates).enumerate() {
            components.push((format!("lagged_regressor_{}", spec.name), self.covariate(i, lags.clone())));
        }

        let events: Vec<(String, bool, Tensor<B, 2>)> = layout
            .events
            .iter()
            .zip(&batch.events)
            .enumerate()
            .map(|(i, (spec, features))| {
                (format!("event_{}", spec.name), self.event_multiplicative[i], self.event(i, features.clone()))
            })
            .collect();
        push_groups(&mut components, events, "events");

        let regressors: Vec<(String, bool, Tensor<B, 2>)> = layout
            .regressors
            .iter()
            .zip(&batch.regressors)
            .enumerate()
            .map(|(i, (spec, values))| {
                (
                    format!("future_regressor_{}", spec.name),
                    self.regressor_multiplicative[i],
                    self.regressor(i, values.clone()),
                )
            })
            .collect();
        push_groups(&mut components, regressors, "future_regressors");

        components
    }

    /// Trend module, unless growth is off.
    pub fn trend_module(&self) -> Option<&Trend<B>> {
        self.trend.as_ref()
    }

    /// Input weights of the AR-Net `[n_lags, out]`.
    pub fn ar_weights(&self) -> Option<Tensor<B, 2>> {
        self.ar.as_ref().map(ArNet::input_weights)
    }

    /// Input weights of every covariate net.
    pub fn covariate_weights(&self) -> Vec<Tensor<B, 2>> {
        self.covariates.iter().map(ArNet::input_weights).collect()
    }

    /// Fourier coefficients of every seasonality.
    pub fn season_weights(&self) -> Vec<Tensor<B, 1>> {
        self.seasonalities.iter().map(|p| p.val()).collect()
    }

    /// Window coefficients of every event.
    pub fn event_weights(&self) -> Vec<Tensor<B, 1>> {
        self.events.iter().map(|p| p.val()).collect()
    }

    /// Coefficient of every future regressor.
    pub fn regressor_weights(&self) -> Vec<Tensor<B, 1>> {
        self.regressors.iter().map(|p| p.val()).collect()
    }
}

fn push_groups<B: Backend>(
    components: &mut Vec<(String, Tensor<B, 2>)>,
    items: Vec<(String, bool, Tensor<B, 2>)>,
    group: &str,
) {
    let additive = sum_all(items.iter().filter(|(_, m, _)| !m).map(|(_, _, t)| t.clone()).collect());
    let multiplicative = sum_all(items.iter().filter(|(_, m, _)| *m).map(|(_, _, t)| t.clone()).collect());
    if let Some(t) = additive {
        components.push((format!("{group}_additive"), t));
    }
    if let Some(t) = multiplicative {
        components.push((format!("{group}_multiplicative"), t));
    }
    components.extend(items.into_iter().map(|(name, _, t)| (name, t)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use neuralprophet_data::{CovariateSpec, EventSpec, RegressorSpec, SeasonalitySpec};

    type TestBackend = NdArray<f32>;

    fn config(n_lags: usize, n_forecasts: usize) -> TimeNetConfig {
        TimeNetConfig {
            layout: FeatureLayout {
                n_lags,
                n_forecasts,
                seasonalities: vec![SeasonalitySpec {
                    name: "weekly".to_string(),
                    period: 7.0,
                    fourier_order: 2,
                }],
                events: vec![EventSpec {
                    name: "sale".to_string(),
                    lower_window: -1,
                    upper_window: 0,
                    mode: ComponentMode::Multiplicative,
                }],
                regressors: vec![RegressorSpec {
                    name: "temp".to_string(),
                    mode: ComponentMode::Additive,
                }],
                covariates: vec![CovariateSpec {
                    name: "price".to_string(),
                    only_last_value: false,
                }],
            },
            growth: Growth::Linear,
            changepoints: vec![0.3, 0.6],
            seasonality_mode: ComponentMode::Additive,
            num_hidden_layers: 1,
            d_hidden: 4,
        }
    }

    fn batch<B: Backend>(n: usize, cfg: &TimeNetConfig, device: &B::Device) -> TimeBatch<B> {
        let f = cfg.layout.n_forecasts;
        let l = cfg.layout.n_lags;
        TimeBatch {
            time: Tensor::random([n, f], burn::tensor::Distribution::Default, device),
            seasonalities: vec![Tensor::ones([n, f, 4], device)],
            lags: Some(Tensor::ones([n, l], device)),
            covariates: vec![Tensor::ones([n, l], device)],
            events: vec![Tensor::ones([n, f, 2], device)],
            regressors: vec![Tensor::ones([n, f], device)],
            targets: Tensor::zeros([n, f], device),
            indices: (0..n).collect(),
        }
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let cfg = config(3, 2);
        let model = cfg.init::<TestBackend>(&device, Seed::new(1));
        let out = model.forward(&batch(5, &cfg, &device));
        assert_eq!(out.dims(), [5, 2]);
    }

    #[test]
    fn test_components_sum_to_forecast() {
        let device = Default::default();
        let cfg = config(3, 2);
        let model = cfg.init::<TestBackend>(&device, Seed::new(1));
        let b = batch(4, &cfg, &device);
        let out: Vec<f32> = model.forward(&b).into_data().to_vec().unwrap();

        let components = model.compute_components(&b, &cfg.layout);
        let names: Vec<&str> = components.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "trend",
                "season_weekly",
                "ar",
                "lagged_regressor_price",
                "events_multiplicative",
                "event_sale",
                "future_regressors_additive",
                "future_regressor_temp",
            ]
        );
        let get = |name: &str| -> Vec<f32> {
            components
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t.clone().into_data().to_vec().unwrap())
                .unwrap()
        };
        let trend = get("trend");
        let additive = ["season_weekly", "ar", "lagged_regressor_price", "future_regressors_additive"];
        let mult = get("events_multiplicative");
        for i in 0..out.len() {
            let sum: f32 = additive.iter().map(|n| get(n)[i]).sum();
            let expected = trend[i] + sum + trend[i] * mult[i];
            assert!((out[i] - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let device = Default::default();
        let cfg = config(2, 1);
        let a = cfg.init::<TestBackend>(&device, Seed::new(9));
        let b = cfg.init::<TestBackend>(&device, Seed::new(9));
        let c = cfg.init::<TestBackend>(&device, Seed::new(10));
        let w = |m: &TimeNet<TestBackend>| -> Vec<f32> { m.ar_weights().unwrap().into_data().to_vec().unwrap() };
        assert_eq!(w(&a), w(&b));
        assert_ne!(w(&a), w(&c));
    }

    #[test]
    fn test_growth_off_has_zero_trend() {
        let device = Default::default();
        let mut cfg = config(0, 1);
        cfg.growth = Growth::Off;
        cfg.layout.covariates.clear();
        let model = cfg.init::<TestBackend>(&device, Seed::new(1));
        let trend: Vec<f32> = model
            .trend(Tensor::ones([3, 1], &device))
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(trend, vec![0.0; 3]);
        assert!(model.ar_weights().is_none());
    }

    #[test]
    fn test_multiplicative_terms_do_not_train_trend() {
        type AD = Autodiff<TestBackend>;
        let device = Default::default();
        let mut cfg = config(0, 1);
        cfg.layout.covariates.clear();
        cfg.layout.regressors.clear();
        cfg.layout.seasonalities.clear();
        cfg.changepoints.clear();
        let model = cfg.init::<AD>(&device, Seed::new(3));
        let mut b = batch::<AD>(2, &cfg, &device);
        b.lags = None;
        b.seasonalities.clear();
        b.covariates.clear();
        b.regressors.clear();

        let trend_only = model.trend(b.time.clone()).sum();
        let full = model.forward(&b).sum();
        let grads_trend = trend_only.backward();
        let grads_full = full.backward();
        let k = &model.trend_module().unwrap().k;
        let g1: Vec<f32> = k.val().grad(&grads_trend).unwrap().into_data().to_vec().unwrap();
        let g2: Vec<f32> = k.val().grad(&grads_full).unwrap().into_data().to_vec().unwrap();
        assert!((g1[0] - g2[0]).abs() < 1e-5);
    }
}

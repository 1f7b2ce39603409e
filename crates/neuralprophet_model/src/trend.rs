//! Piecewise trend with changepoints.

use std::str::FromStr;

use burn::module::Param;
use burn::prelude::*;
use burn::tensor::activation::relu;
use chrono::NaiveDateTime;
use neuralprophet_data::TimeParams;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::init::{xavier_param, zeros_param};

/// Shape of the trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Growth {
    /// No trend; the forecast has no level and multiplicative terms vanish.
    Off,
    /// Continuous piecewise-linear trend.
    #[default]
    Linear,
    /// Piecewise-linear trend with a jump allowed at every changepoint.
    Discontinuous,
}

impl FromStr for Growth {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "linear" => Ok(Self::Linear),
            "discontinuous" => Ok(Self::Discontinuous),
            other => Err(ModelError::InvalidConfig(format!("unknown growth {other:?}"))),
        }
    }
}

/// Threshold below which trend changes are not penalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendRegThreshold {
    /// Penalize every change.
    #[default]
    Disabled,
    /// `3 / (3 + (1 + trend_reg) * n_changepoints)`.
    Auto,
    /// A fixed threshold.
    Fixed(f64),
}

/// Trend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Trend shape.
    pub growth: Growth,
    /// Explicit changepoint dates; overrides `n_changepoints`.
    pub changepoints: Option<Vec<NaiveDateTime>>,
    /// Number of evenly spaced changepoints.
    pub n_changepoints: usize,
    /// Share of the training history that receives changepoints.
    pub changepoints_range: f64,
    /// Strength of the penalty on trend changes.
    pub trend_reg: f64,
    /// Changes below the threshold are free.
    pub trend_reg_threshold: TrendRegThreshold,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            growth: Growth::Linear,
            changepoints: None,
            n_changepoints: 10,
            changepoints_range: 0.9,
            trend_reg: 0.0,
            trend_reg_threshold: TrendRegThreshold::Disabled,
        }
    }
}

impl TrendConfig {
    /// Check ranges and align `n_changepoints` with explicit changepoints.
    ///
    /// # Errors
    ///
    /// Returns an error for a range outside `(0, 1]` or a negative penalty.
    pub fn validate(&mut self) -> Result<()> {
        if !(self.changepoints_range > 0.0 && self.changepoints_range <= 1.0) {
            return Err(ModelError::InvalidConfig(format!(
                "changepoints_range must be in (0, 1], got {}",
                self.changepoints_range
            )));
        }
        if self.trend_reg < 0.0 {
            return Err(ModelError::InvalidConfig("trend_reg must be >= 0".to_string()));
        }
        if let TrendRegThreshold::Fixed(v) = self.trend_reg_threshold {
            if v < 0.0 {
                return Err(ModelError::InvalidConfig("trend_reg_threshold must be >= 0".to_string()));
            }
        }
        if let Some(dates) = &mut self.changepoints {
            dates.sort_unstable();
            dates.dedup();
            self.n_changepoints = dates.len();
        }
        if self.growth == Growth::Off {
            self.n_changepoints = 0;
        }
        Ok(())
    }

    /// Changepoint locations in normalized time.
    ///
    /// Explicit dates are normalized with `time`; otherwise the changepoints
    /// split the first `changepoints_range` of `[0, 1]` evenly, excluding 0.
    #[must_use]
    pub fn normalized_changepoints(&self, time: &TimeParams) -> Vec<f64> {
        if self.growth == Growth::Off {
            return Vec::new();
        }
        match &self.changepoints {
            Some(dates) => dates.iter().map(|d| time.normalize(*d)).collect(),
            None => {
                let n = self.n_changepoints;
                (1..=n)
                    .map(|j| self.changepoints_range * j as f64 / (n + 1) as f64)
                    .collect()
            }
        }
    }

    /// Threshold for the trend penalty, if any.
    #[must_use]
    pub fn reg_threshold(&self) -> Option<f64> {
        match self.trend_reg_threshold {
            TrendRegThreshold::Disabled => None,
            TrendRegThreshold::Auto => {
                Some(3.0 / (3.0 + (1.0 + self.trend_reg) * self.n_changepoints.max(1) as f64))
            }
            TrendRegThreshold::Fixed(v) => Some(v),
        }
    }
}

/// Trend parameters.
///
/// ```text
/// linear:        k·t + m + Σ δ_j · relu(t - c_j)
/// discontinuous: (k + Σ_{c_j <= t} δ_j)·t + m + Σ_{c_j <= t} γ_j
/// ```
#[derive(Module, Debug)]
pub struct Trend<B: Backend> {
    pub(crate) k: Param<Tensor<B, 1>>,
    m: Param<Tensor<B, 1>>,
    deltas: Option<Param<Tensor<B, 1>>>,
    offset_deltas: Option<Param<Tensor<B, 1>>>,
    changepoints: Vec<f32>,
}

impl<B: Backend> Trend<B> {
    /// Create trend parameters for the given normalized changepoints.
    pub(crate) fn new(growth: Growth, changepoints: &[f64], rng: &mut ChaCha8Rng, device: &B::Device) -> Self {
        let n_cp = changepoints.len();
        let deltas = (n_cp > 0).then(|| zeros_param(n_cp, device));
        let offset_deltas = (n_cp > 0 && growth == Growth::Discontinuous).then(|| zeros_param(n_cp, device));
        Self {
            k: xavier_param(rng, 1, device),
            m: xavier_param(rng, 1, device),
            deltas,
            offset_deltas,
            changepoints: changepoints.iter().map(|c| *c as f32).collect(),
        }
    }

    /// Trend at normalized times `t` of shape `[N, F]`.
    pub fn forward(&self, t: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, f] = t.dims();
        let device = t.device();
        let base = t.clone() * self.k.val().reshape([1, 1]) + self.m.val().reshape([1, 1]);
        let Some(deltas) = &self.deltas else {
            return base;
        };
        let c = self.changepoints.len();
        let cps = Tensor::<B, 1>::from_floats(self.changepoints.as_slice(), &device).reshape([1, 1, c]);
        let since = t.clone().reshape([n, f, 1]) - cps;
        let deltas = deltas.val().reshape([1, 1, c]);

        match &self.offset_deltas {
            None => base + (relu(since) * deltas).sum_dim(2).reshape([n, f]),
            Some(gammas) => {
                let active = since.greater_equal_elem(0.0).float();
                let rate = (active.clone() * deltas).sum_dim(2).reshape([n, f]);
                let offset = (active * gammas.val().reshape([1, 1, c])).sum_dim(2).reshape([n, f]);
                base + rate * t + offset
            }
        }
    }

    /// Rate changes at the changepoints.
    pub fn deltas(&self) -> Option<Tensor<B, 1>> {
        self.deltas.as_ref().map(|d| d.val())
    }

    /// Base growth rate.
    pub fn rate(&self) -> f32 {
        self.k.val().into_scalar().elem()
    }

    /// Base offset.
    pub fn offset(&self) -> f32 {
        self.m.val().into_scalar().elem()
    }

    /// Normalized changepoint locations.
    pub fn changepoints(&self) -> &[f32] {
        &self.changepoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use chrono::NaiveDate;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    fn values(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_even_changepoints() {
        let config = TrendConfig {
            n_changepoints: 3,
            changepoints_range: 0.8,
            ..Default::default()
        };
        let time = TimeParams {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            span_seconds: 86_400.0,
        };
        let cps = config.normalized_changepoints(&time);
        assert_eq!(cps.len(), 3);
        assert!((cps[0] - 0.2).abs() < 1e-12);
        assert!((cps[2] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_auto_threshold() {
        let config = TrendConfig {
            n_changepoints: 10,
            trend_reg: 1.0,
            trend_reg_threshold: TrendRegThreshold::Auto,
            ..Default::default()
        };
        assert!((config.reg_threshold().unwrap() - 3.0 / 23.0).abs() < 1e-12);
        assert_eq!(TrendConfig::default().reg_threshold(), None);
    }

    #[test]
    fn test_validate_explicit_changepoints() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let mut config = TrendConfig {
            changepoints: Some(vec![day(5), day(2), day(5)]),
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.n_changepoints, 2);

        let mut bad = TrendConfig {
            changepoints_range: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_linear_trend_is_continuous_at_changepoint() {
        let device = Default::default();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut trend = Trend::<TestBackend>::new(Growth::Linear, &[0.5], &mut rng, &device);
        trend.k = Param::from_tensor(Tensor::from_floats([1.0], &device));
        trend.m = Param::from_tensor(Tensor::from_floats([0.0], &device));
        trend.deltas = Some(Param::from_tensor(Tensor::from_floats([-2.0], &device)));

        let t = Tensor::<TestBackend, 1>::from_floats([0.25, 0.5, 0.75, 1.0], &device).reshape([4, 1]);
        let out = values(trend.forward(t));
        let expected = [0.25, 0.5, 0.25, 0.0];
        for (o, e) in out.iter().zip(expected) {
            assert!((o - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_discontinuous_trend_jumps() {
        let device = Default::default();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut trend = Trend::<TestBackend>::new(Growth::Discontinuous, &[0.5], &mut rng, &device);
        trend.k = Param::from_tensor(Tensor::from_floats([0.0], &device));
        trend.m = Param::from_tensor(Tensor::from_floats([1.0], &device));
        trend.deltas = Some(Param::from_tensor(Tensor::from_floats([0.0], &device)));
        trend.offset_deltas = Some(Param::from_tensor(Tensor::from_floats([3.0], &device)));

        let t = Tensor::<TestBackend, 1>::from_floats([0.4, 0.6], &device).reshape([2, 1]);
        assert_eq!(values(trend.forward(t)), vec![1.0, 4.0]);
    }
}

//! Sparsity penalties on model parameters.

use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use crate::time_net::TimeNet;

/// Training progress at which penalties start to apply.
pub const REG_START_PCT: f64 = 0.66;
/// Training progress at which penalties reach full weight.
pub const REG_FULL_PCT: f64 = 1.0;

/// Weight of the penalties at `progress` (epochs done / total epochs).
///
/// Zero until [`REG_START_PCT`], then a cosine ramp up to one at
/// [`REG_FULL_PCT`].
#[must_use]
pub fn delay_weight(progress: f64) -> f64 {
    let reg_progress = (progress - REG_START_PCT) / (REG_FULL_PCT - REG_START_PCT);
    if reg_progress <= 0.0 {
        0.0
    } else if reg_progress < 1.0 {
        1.0 - (1.0 + (std::f64::consts::PI * reg_progress).cos()) / 2.0
    } else {
        1.0
    }
}

/// Sparsity penalty on AR-style input weights.
///
/// `Σ (2 / (1 + exp(-2·sqrt(|w| + 1e-9))) - 1) / n_forecasts`
pub fn reg_func_ar<B: Backend>(weights: Tensor<B, 2>, n_forecasts: usize) -> Tensor<B, 1> {
    let soft = (weights.abs().add_scalar(1e-9).sqrt().mul_scalar(-2.0).exp().add_scalar(1.0))
        .recip()
        .mul_scalar(2.0)
        .sub_scalar(1.0);
    soft.sum().div_scalar(n_forecasts.max(1) as f32)
}

/// Penalty on trend rate changes above `threshold`.
pub fn reg_func_trend<B: Backend>(deltas: Tensor<B, 1>, threshold: Option<f64>) -> Tensor<B, 1> {
    let abs = deltas.abs();
    match threshold {
        Some(th) => relu(abs.sub_scalar(th as f32)).sum(),
        None => abs.sum(),
    }
}

/// Mean absolute value of `weights`.
pub fn reg_func_abs<B: Backend>(weights: Tensor<B, 1>) -> Tensor<B, 1> {
    weights.abs().mean()
}

/// Penalty strengths for every regularized part of a [`TimeNet`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Regularization {
    /// AR weight, already scaled (`1e-4 · ar_reg`).
    pub ar: Option<f64>,
    /// Trend weight.
    pub trend: Option<f64>,
    /// Threshold below which trend changes are free.
    pub trend_threshold: Option<f64>,
    /// Weight shared by all seasonalities.
    pub seasonality: Option<f64>,
    /// Weight per lagged covariate, in layout order.
    pub covariates: Vec<Option<f64>>,
    /// Weight per event, in layout order.
    pub events: Vec<Option<f64>>,
    /// Weight per future regressor, in layout order.
    pub regressors: Vec<Option<f64>>,
}

impl Regularization {
    /// Whether no penalty is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ar.is_none()
            && self.trend.is_none()
            && self.seasonality.is_none()
            && self.covariates.iter().all(Option::is_none)
            && self.events.iter().all(Option::is_none)
            && self.regressors.iter().all(Option::is_none)
    }

    /// Sum of all configured penalties, shape `[1]`.
    ///
    /// Returns `None` when nothing is regularized.
    pub fn penalty<B: Backend>(&self, model: &TimeNet<B>) -> Option<Tensor<B, 1>> {
        let n_forecasts = model.n_forecasts();
        let mut terms: Vec<Tensor<B, 1>> = Vec::new();

        if let (Some(lambda), Some(weights)) = (self.ar, model.ar_weights()) {
            terms.push(reg_func_ar(weights, n_forecasts).mul_scalar(lambda as f32));
        }
        if let Some(lambda) = self.trend {
            if let Some(deltas) = model.trend_module().and_then(|t| t.deltas()) {
                terms.push(reg_func_trend(deltas, self.trend_threshold).mul_scalar(lambda as f32));
            }
        }
        if let Some(lambda) = self.seasonality {
            for weights in model.season_weights() {
                terms.push(reg_func_abs(weights).mul_scalar(lambda as f32));
            }
        }
        for (lambda, weights) in self.covariates.iter().zip(model.covariate_weights()) {
            if let Some(lambda) = lambda {
                terms.push(reg_func_ar(weights, n_forecasts).mul_scalar(*lambda as f32));
            }
        }
        for (lambda, weights) in self.events.iter().zip(model.event_weights()) {
            if let Some(lambda) = lambda {
                terms.push(reg_func_abs(weights).mul_scalar(*lambda as f32));
            }
        }
        for (lambda, weights) in self.regressors.iter().zip(model.regressor_weights()) {
            if let Some(lambda) = lambda {
                terms.push(reg_func_abs(weights).mul_scalar(*lambda as f32));
            }
        }
        terms.into_iter().reduce(|acc, t| acc + t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar()
    }

    #[test]
    fn test_delay_weight() {
        assert_eq!(delay_weight(0.0), 0.0);
        assert_eq!(delay_weight(0.66), 0.0);
        assert!((delay_weight(0.83) - 0.5).abs() < 1e-9);
        assert_eq!(delay_weight(1.0), 1.0);
        assert_eq!(delay_weight(1.5), 1.0);
    }

    #[test]
    fn test_ar_penalty_is_zero_for_zero_weights() {
        let device = Default::default();
        let w = Tensor::<TestBackend, 2>::zeros([3, 2], &device);
        assert!(scalar(reg_func_ar(w, 2)).abs() < 1e-3);

        let w = Tensor::<TestBackend, 2>::ones([3, 2], &device);
        let expected = 6.0 * (2.0 / (1.0 + (-2.0f32).exp()) - 1.0) / 2.0;
        assert!((scalar(reg_func_ar(w, 2)) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_trend_threshold() {
        let device = Default::default();
        let d = Tensor::<TestBackend, 1>::from_floats([0.1, -0.5, 0.3], &device);
        assert!((scalar(reg_func_trend(d.clone(), None)) - 0.9).abs() < 1e-6);
        assert!((scalar(reg_func_trend(d, Some(0.2))) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_empty() {
        let mut reg = Regularization::default();
        assert!(reg.is_empty());
        reg.events = vec![None, Some(0.1)];
        assert!(!reg.is_empty());
    }
}

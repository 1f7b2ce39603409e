//! Loss functions.
//!
//! Losses are computed elementwise so that per-sample weights can be applied
//! before reduction.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// Huber loss (smooth L1).
///
/// L = 0.5 * (y - pred)^2 / delta          if |y - pred| <= delta
/// L = |y - pred| - 0.5 * delta            otherwise
#[derive(Debug, Clone, Copy)]
pub struct HuberLoss {
    /// Threshold between L2 and L1 behavior.
    pub delta: f32,
}

impl HuberLoss {
    /// Create a new Huber loss.
    pub fn new(delta: f32) -> Self {
        Self { delta }
    }

    /// Elementwise loss.
    pub fn forward<B: Backend, const D: usize>(&self, preds: Tensor<B, D>, targets: Tensor<B, D>) -> Tensor<B, D> {
        let abs = (preds - targets).abs();
        let quadratic = abs.clone().clamp_max(self.delta);
        let linear = abs - quadratic.clone();
        quadratic.powf_scalar(2.0).mul_scalar(0.5 / self.delta) + linear
    }
}

impl Default for HuberLoss {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Loss used for training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LossFunc {
    /// Smooth L1 with `delta = 1`.
    #[default]
    Huber,
    /// Squared error.
    #[serde(rename = "MSE")]
    Mse,
    /// Absolute error.
    #[serde(rename = "MAE")]
    Mae,
}

impl LossFunc {
    /// Elementwise loss of `preds` against `targets`.
    pub fn elementwise<B: Backend, const D: usize>(&self, preds: Tensor<B, D>, targets: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Huber => HuberLoss::default().forward(preds, targets),
            Self::Mse => (preds - targets).powf_scalar(2.0),
            Self::Mae => (preds - targets).abs(),
        }
    }

    /// Mean loss, optionally weighted per element.
    pub fn forward<B: Backend>(
        &self,
        preds: Tensor<B, 2>,
        targets: Tensor<B, 2>,
        weights: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 1> {
        let loss = self.elementwise(preds, targets);
        match weights {
            Some(w) => (loss * w).mean(),
            None => loss.mean(),
        }
    }

    /// Loss of a single residual, for host-side metrics.
    pub fn value(&self, diff: f64) -> f64 {
        match self {
            Self::Huber => {
                let abs = diff.abs();
                if abs <= 1.0 {
                    0.5 * diff * diff
                } else {
                    abs - 0.5
                }
            }
            Self::Mse => diff * diff,
            Self::Mae => diff.abs(),
        }
    }

    /// Metric name of the loss.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Huber => "SmoothL1Loss",
            Self::Mse => "MSELoss",
            Self::Mae => "L1Loss",
        }
    }
}

impl fmt::Display for LossFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Huber => "Huber",
            Self::Mse => "MSE",
            Self::Mae => "MAE",
        })
    }
}

impl FromStr for LossFunc {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "huber" | "smoothl1" | "smoothl1loss" => Ok(Self::Huber),
            "mse" | "mseloss" | "l2" => Ok(Self::Mse),
            "mae" | "l1" | "l1loss" => Ok(Self::Mae),
            other => Err(TrainError::InvalidConfig(format!("unknown loss function {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn values(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_huber_regions() {
        let device = Default::default();
        let preds = Tensor::<TestBackend, 2>::from_floats([[0.5, 3.0, -2.0]], &device);
        let targets = Tensor::<TestBackend, 2>::zeros([1, 3], &device);
        let loss = values(LossFunc::Huber.elementwise(preds, targets));
        let expected = [0.125, 2.5, 1.5];
        for (l, e) in loss.iter().zip(expected) {
            assert!((l - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_weighted_mean() {
        let device = Default::default();
        let preds = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0]], &device);
        let targets = Tensor::<TestBackend, 2>::zeros([1, 2], &device);
        let weights = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.5]], &device);
        let loss: f32 = LossFunc::Mae.forward(preds.clone(), targets.clone(), Some(weights)).into_scalar();
        assert!((loss - 1.0).abs() < 1e-6);
        let loss: f32 = LossFunc::Mse.forward(preds, targets, None).into_scalar();
        assert!((loss - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_parse() {
        assert_eq!("huber".parse::<LossFunc>().unwrap(), LossFunc::Huber);
        assert_eq!("MSE".parse::<LossFunc>().unwrap(), LossFunc::Mse);
        assert_eq!("l1".parse::<LossFunc>().unwrap(), LossFunc::Mae);
        assert!("hinge".parse::<LossFunc>().is_err());
        assert_eq!(LossFunc::Huber.name(), "SmoothL1Loss");
    }
}

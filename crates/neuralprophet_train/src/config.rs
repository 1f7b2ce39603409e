//! Training configuration.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};
use crate::losses::LossFunc;
use crate::scheduler::{OneCycleLR, OneCycleLRConfig};

/// Optimizer used for training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OptimizerKind {
    /// AdamW with weight decay `1e-3`.
    #[default]
    AdamW,
    /// SGD with momentum `0.9` and weight decay `1e-4`.
    #[serde(rename = "SGD")]
    Sgd,
}

impl OptimizerKind {
    /// Weight decay of the optimizer.
    pub fn weight_decay(&self) -> f32 {
        match self {
            Self::AdamW => 1e-3,
            Self::Sgd => 1e-4,
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AdamW => "AdamW",
            Self::Sgd => "SGD",
        })
    }
}

impl FromStr for OptimizerKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "adamw" => Ok(Self::AdamW),
            "sgd" => Ok(Self::Sgd),
            other => Err(TrainError::InvalidConfig(format!("unknown optimizer {other:?}"))),
        }
    }
}

/// Batch size for `n_data` samples: `clamp(2^(2 + floor(log10 n)), 16, 512)`, at most `n`.
pub fn auto_batch_size(n_data: usize) -> usize {
    let n = n_data.max(1) as f64;
    let exp = 2.0 + n.log10().floor();
    let batch = 2f64.powf(exp).clamp(16.0, 512.0) as usize;
    batch.min(n_data.max(1))
}

/// Epochs for `n_data` samples: `clamp(floor(2^(2.5·log10(100 + n)) / (n / 1000)), 10, 1000)`.
pub fn auto_epochs(n_data: usize) -> usize {
    let n = n_data.max(1) as f64;
    let epochs = (2f64.powf(2.5 * (100.0 + n).log10()) / (n / 1000.0)).floor();
    epochs.clamp(10.0, 1000.0) as usize
}

/// Hyperparameters of the training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Maximum learning rate; found by a range test when unset.
    pub learning_rate: Option<f64>,
    /// Number of epochs; set from the dataset size when unset.
    pub epochs: Option<usize>,
    /// Batch size; set from the dataset size when unset.
    pub batch_size: Option<usize>,
    /// Training loss.
    pub loss_func: LossFunc,
    /// Optimizer.
    pub optimizer: OptimizerKind,
    /// Weight of the newest sample relative to the oldest.
    pub newer_samples_weight: f64,
    /// Normalized time at which the weight ramp starts.
    pub newer_samples_start: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: None,
            epochs: None,
            batch_size: None,
            loss_func: LossFunc::Huber,
            optimizer: OptimizerKind::AdamW,
            newer_samples_weight: 2.0,
            newer_samples_start: 0.0,
        }
    }
}

impl TrainConfig {
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

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error for non-positive rates or sizes, a sample weight
    /// below 1, or a start outside `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if let Some(lr) = self.learning_rate {
            if !(lr > 0.0 && lr.is_finite()) {
                return Err(TrainError::InvalidLearningRate(format!("{lr}")));
            }
        }
        if self.epochs == Some(0) {
            return Err(TrainError::InvalidConfig("epochs must be > 0".to_string()));
        }
        if self.batch_size == Some(0) {
            return Err(TrainError::InvalidConfig("batch_size must be > 0".to_string()));
        }
        if self.newer_samples_weight < 1.0 {
            return Err(TrainError::InvalidConfig("newer_samples_weight must be >= 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.newer_samples_start) {
            return Err(TrainError::InvalidConfig("newer_samples_start must be in [0, 1)".to_string()));
        }
        Ok(())
    }

    /// Fill unset batch size and epochs from the number of samples.
    pub fn set_auto_batch_epoch(&mut self, n_data: usize) {
        if self.batch_size.is_none() {
            let batch_size = auto_batch_size(n_data);
            tracing::info!("Auto-set batch_size to {batch_size}");
            self.batch_size = Some(batch_size);
        }
        if self.epochs.is_none() {
            let epochs = auto_epochs(n_data);
            tracing::info!("Auto-set epochs to {epochs}");
            self.epochs = Some(epochs);
        }
    }

    /// Batch size, auto-set for `n_data` samples if unset.
    pub fn batch_size_or_auto(&self, n_data: usize) -> usize {
        self.batch_size.unwrap_or_else(|| auto_batch_size(n_data))
    }

    /// Epochs, auto-set for `n_data` samples if unset.
    pub fn epochs_or_auto(&self, n_data: usize) -> usize {
        self.epochs.unwrap_or_else(|| auto_epochs(n_data))
    }

    /// One-cycle schedule peaking at `max_lr`.
    pub fn scheduler(&self, max_lr: f64, total_steps: usize) -> OneCycleLR {
        OneCycleLR::new(OneCycleLRConfig {
            max_lr,
            total_steps: total_steps.max(1),
            ..Default::default()
        })
    }

    /// Per-element loss weights from normalized times `[N, F]`.
    ///
    /// The weight rises along a cosine from `1 / newer_samples_weight` at
    /// `newer_samples_start` to 1 at `t = 1`. Returns `None` when all
    /// samples weigh the same.
    pub fn sample_weight<B: Backend>(&self, t: Tensor<B, 2>) -> Option<Tensor<B, 2>> {
        if self.newer_samples_weight <= 1.0 {
            return None;
        }
        let end_w = self.newer_samples_weight as f32;
        let start = self.newer_samples_start as f32;
        let time = t
            .sub_scalar(start)
            .div_scalar(1.0 - start)
            .clamp(0.0, 1.0)
            .sub_scalar(1.0)
            .mul_scalar(std::f32::consts::PI)
            .cos()
            .mul_scalar(0.5)
            .add_scalar(0.5);
        Some(time.mul_scalar(end_w - 1.0).add_scalar(1.0).div_scalar(end_w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_auto_batch_size() {
        assert_eq!(auto_batch_size(10), 10);
        assert_eq!(auto_batch_size(150), 16);
        assert_eq!(auto_batch_size(5_000), 32);
        assert_eq!(auto_batch_size(50_000), 64);
        assert_eq!(auto_batch_size(50_000_000), 512);
    }

    #[test]
    fn test_auto_epochs() {
        // 2^(2.5 * log10(1100)) / 1 = 2^7.603 ≈ 194.4
        assert_eq!(auto_epochs(1_000), 194);
        assert_eq!(auto_epochs(10), 1000);
        assert_eq!(auto_epochs(1_000_000_000), 10);
    }

    #[test]
    fn test_set_auto_keeps_explicit_values() {
        let mut config = TrainConfig::default().with_batch_size(8);
        config.set_auto_batch_epoch(1_000);
        assert_eq!(config.batch_size, Some(8));
        assert_eq!(config.epochs, Some(194));
    }

    #[test]
    fn test_sample_weight_ramp() {
        let device = Default::default();
        let config = TrainConfig::default();
        let t = Tensor::<TestBackend, 1>::from_floats([0.0, 0.5, 1.0, 1.2], &device).reshape([4, 1]);
        let w: Vec<f32> = config.sample_weight(t).unwrap().into_data().to_vec().unwrap();
        assert!((w[0] - 0.5).abs() < 1e-6);
        assert!((w[1] - 0.75).abs() < 1e-6);
        assert!((w[2] - 1.0).abs() < 1e-6);
        assert!((w[3] - 1.0).abs() < 1e-6);

        let flat = TrainConfig {
            newer_samples_weight: 1.0,
            ..Default::default()
        };
        assert!(flat.sample_weight(Tensor::<TestBackend, 2>::zeros([1, 1], &device)).is_none());
    }

    #[test]
    fn test_validate() {
        assert!(TrainConfig::default().validate().is_ok());
        assert!(TrainConfig::default().with_learning_rate(-1.0).validate().is_err());
        let bad = TrainConfig {
            newer_samples_start: 1.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert_eq!("sgd".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
    }
}

//! Learning rate range test.
//!
//! Trains a copy of the model for a short exponential sweep of learning
//! rates and picks the rate where the smoothed loss falls fastest.

use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use neuralprophet_data::TimeDataLoader;
use neuralprophet_model::TimeNet;

use crate::config::TrainConfig;
use crate::error::{Result, TrainError};
use crate::scheduler::{ExponentialSweepLR, Scheduler};
use crate::trainer::{scalar, with_optimizer};

/// Settings of the range test.
#[derive(Debug, Clone)]
pub struct LrFinderConfig {
    /// First learning rate.
    pub start_lr: f64,
    /// Last learning rate.
    pub end_lr: f64,
    /// Number of steps.
    pub num_steps: usize,
    /// Weight of the newest loss in the running average.
    pub smooth_f: f64,
    /// Stop once the smoothed loss exceeds this multiple of the best loss.
    pub diverge_th: f64,
}

impl LrFinderConfig {
    /// Settings for a dataset of `n_data` samples.
    ///
    /// Steps: `50 + floor(25 · log10(100 + n))`.
    pub fn for_dataset(n_data: usize) -> Self {
        let num_steps = 50 + (25.0 * (100.0 + n_data as f64).log10()).floor() as usize;
        Self {
            start_lr: 1e-7,
            end_lr: 10.0,
            num_steps,
            smooth_f: 0.05,
            diverge_th: 5.0,
        }
    }
}

/// Learning rates and smoothed losses of a range test.
#[derive(Debug, Clone)]
pub struct LrRangeResult {
    /// Learning rate of every step.
    pub lrs: Vec<f64>,
    /// Smoothed loss of every step.
    pub losses: Vec<f64>,
}

impl LrRangeResult {
    /// Learning rate at the steepest descent of the loss curve.
    ///
    /// The first 10 and last 5 points are skipped when the curve is long
    /// enough.
    pub fn suggestion(&self) -> Option<f64> {
        let n = self.losses.len();
        let (skip_start, skip_end) = if n > 20 { (10, 5) } else { (0, 0) };
        let lrs = &self.lrs[skip_start..n - skip_end];
        let losses = &self.losses[skip_start..n - skip_end];
        if losses.len() < 2 {
            return None;
        }
        let grads = gradient(losses);
        let idx = grads
            .iter()
            .enumerate()
            .filter(|(_, g)| g.is_finite())
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)?;
        Some(lrs[idx])
    }
}

/// Finite differences with unit spacing: central inside, one-sided at the ends.
fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    (0..n)
        .map(|i| match i {
            0 => values[1] - values[0],
            i if i == n - 1 => values[n - 1] - values[n - 2],
            i => (values[i + 1] - values[i - 1]) / 2.0,
        })
        .collect()
}

/// Run the range test on a copy of `model`.
pub fn lr_range_test<B: AutodiffBackend>(
    model: &TimeNet<B>,
    loader: &TimeDataLoader,
    config: &TrainConfig,
    finder: &LrFinderConfig,
    device: &B::Device,
) -> Result<LrRangeResult> {
    with_optimizer!(config.optimizer, optim => {
        range_test_with_optimizer(model.clone(), optim, loader, config, finder, device)
    })
}

fn range_test_with_optimizer<B, O>(
    mut model: TimeNet<B>,
    mut optim: O,
    loader: &TimeDataLoader,
    config: &TrainConfig,
    finder: &LrFinderConfig,
    device: &B::Device,
) -> Result<LrRangeResult>
where
    B: AutodiffBackend,
    O: Optimizer<TimeNet<B>, B>,
{
    let schedule = ExponentialSweepLR::new(finder.start_lr, finder.end_lr, finder.num_steps);
    let mut result = LrRangeResult {
        lrs: Vec::with_capacity(finder.num_steps),
        losses: Vec::with_capacity(finder.num_steps),
    };
    let mut best = f64::INFINITY;
    let mut step = 0;
    let mut epoch = 0;

    'sweep: while step < finder.num_steps {
        for batch in loader.iter_epoch::<B>(device, epoch) {
            if step >= finder.num_steps {
                break 'sweep;
            }
            let batch = batch?;
            let lr = schedule.get_lr(step);
            let preds = model.forward(&batch);
            let loss = config.loss_func.forward(preds, batch.targets.clone(), None);
            let value = scalar(loss.clone());

            let smoothed = match result.losses.last() {
                Some(prev) => finder.smooth_f * value + (1.0 - finder.smooth_f) * prev,
                None => value,
            };
            result.lrs.push(lr);
            result.losses.push(smoothed);
            if !smoothed.is_finite() || smoothed > finder.diverge_th * best {
                tracing::debug!("lr range test stopped at lr {lr:.2e}: loss diverged");
                break 'sweep;
            }
            best = best.min(smoothed);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);
            step += 1;
        }
        epoch += 1;
    }
    Ok(result)
}

/// Learning rate suggested by a range test on `model`.
///
/// # Errors
///
/// Returns an error if the test produced too few finite losses.
pub fn find_learning_rate<B: AutodiffBackend>(
    model: &TimeNet<B>,
    loader: &TimeDataLoader,
    config: &TrainConfig,
    device: &B::Device,
) -> Result<f64> {
    let finder = LrFinderConfig::for_dataset(loader.len());
    let result = lr_range_test(model, loader, config, &finder, device)?;
    result
        .suggestion()
        .ok_or_else(|| TrainError::InvalidLearningRate("learning rate range test found no descent".to_string()))
}

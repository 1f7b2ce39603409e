//! Training loop.
//!
//! One step per batch:
//!
//! ```text
//! loss = mean(loss_fn(forward(batch), targets) * sample_weight)
//!      + delay_weight(progress) * regularization(model)
//! ```
//!
//! followed by an optimizer step at the learning rate of the one-cycle
//! schedule.

use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use neuralprophet_data::TimeDataLoader;
use neuralprophet_model::{delay_weight, Regularization, TimeNet};

use crate::callback::{CallbackContext, CallbackList};
use crate::config::TrainConfig;
use crate::error::{Result, TrainError};
use crate::metrics::{MetricsCollection, MetricsFrame, VAL_SUFFIX};
use crate::scheduler::Scheduler;

/// Result of a training run.
#[derive(Debug)]
pub struct TrainingOutput<M> {
    /// Trained model.
    pub model: M,
    /// Metrics per epoch, validation columns suffixed with `_val`.
    pub metrics: Option<MetricsFrame>,
    /// Total training time in seconds.
    pub training_time_secs: f64,
}

/// Runs the training loop for a [`TimeNet`].
pub struct Trainer<'a, B: AutodiffBackend> {
    config: &'a TrainConfig,
    regularization: &'a Regularization,
    learning_rate: f64,
    epochs: usize,
    device: B::Device,
}

/// Host copy of a scalar tensor.
pub(crate) fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}

/// Optimizer configured by `kind`, passed to `$body` as `$optim`.
macro_rules! with_optimizer {
    ($kind:expr, $optim:ident => $body:expr) => {
        match $kind {
            $crate::config::OptimizerKind::AdamW => {
                let $optim = burn::optim::AdamWConfig::new()
                    .with_weight_decay($crate::config::OptimizerKind::AdamW.weight_decay())
                    .init();
                $body
            }
            $crate::config::OptimizerKind::Sgd => {
                let $optim = burn::optim::SgdConfig::new()
                    .with_momentum(Some(burn::optim::momentum::MomentumConfig::new().with_momentum(0.9)))
                    .with_weight_decay(Some(burn::optim::decay::WeightDecayConfig::new(
                        $crate::config::OptimizerKind::Sgd.weight_decay(),
                    )))
                    .init();
                $body
            }
        }
    };
}
pub(crate) use with_optimizer;

impl<'a, B: AutodiffBackend> Trainer<'a, B> {
    /// Create a trainer; `learning_rate` and `epochs` must be resolved.
    pub fn new(
        config: &'a TrainConfig,
        regularization: &'a Regularization,
        learning_rate: f64,
        epochs: usize,
        device: B::Device,
    ) -> Self {
        Self {
            config,
            regularization,
            learning_rate,
            epochs,
            device,
        }
    }

    /// Train `model` on `loader`, optionally evaluating `val_loader` after
    /// every epoch. Without `metrics` nothing is recorded.
    pub fn fit(
        &self,
        model: TimeNet<B>,
        loader: &TimeDataLoader,
        val_loader: Option<&TimeDataLoader>,
        metrics: Option<MetricsCollection>,
        callbacks: &mut CallbackList,
    ) -> Result<TrainingOutput<TimeNet<B>>> {
        with_optimizer!(self.config.optimizer, optim => {
            self.fit_with_optimizer(model, optim, loader, val_loader, metrics, callbacks)
        })
    }

    fn fit_with_optimizer<O>(
        &self,
        model: TimeNet<B>,
        mut optim: O,
        loader: &TimeDataLoader,
        val_loader: Option<&TimeDataLoader>,
        mut metrics: Option<MetricsCollection>,
        callbacks: &mut CallbackList,
    ) -> Result<TrainingOutput<TimeNet<B>>>
    where
        O: Optimizer<TimeNet<B>, B>,
    {
        let start_time = Instant::now();
        let n_batches = loader.n_batches();
        let scheduler = self.config.scheduler(self.learning_rate, self.epochs * n_batches);
        let mut val_metrics = match (&metrics, val_loader) {
            (Some(m), Some(_)) => Some(m.new_like()),
            _ => None,
        };

        let mut ctx = CallbackContext::new(self.epochs, n_batches);
        callbacks.before_fit(&mut ctx)?;

        let mut model = model;
        let mut global_step = 0;
        for epoch in 0..self.epochs {
            ctx.epoch = epoch;
            callbacks.before_epoch(&mut ctx)?;
            if let Some(m) = metrics.as_mut() {
                m.reset();
            }

            for (i, batch) in loader.iter_epoch::<B>(&self.device, epoch).enumerate() {
                let batch = batch?;
                let lr = scheduler.get_lr(global_step);

                let preds = model.forward(&batch);
                let weights = self.config.sample_weight(batch.time.clone());
                let mut loss = self.config.loss_func.forward(preds.clone(), batch.targets.clone(), weights);

                let progress = (epoch as f64 + i as f64 / n_batches as f64) / self.epochs as f64;
                let delay = delay_weight(progress);
                let mut reg_value = 0.0;
                if delay > 0.0 {
                    if let Some(penalty) = self.regularization.penalty(&model) {
                        let penalty = penalty.mul_scalar(delay as f32);
                        reg_value = scalar(penalty.clone());
                        loss = loss + penalty;
                    }
                }

                let loss_value = scalar(loss.clone());
                if !loss_value.is_finite() {
                    return Err(TrainError::Diverged(format!(
                        "loss is {loss_value} at epoch {} batch {i}; try a lower learning rate",
                        epoch + 1
                    )));
                }
                if let Some(m) = metrics.as_mut() {
                    m.update_tensors(preds.detach(), batch.targets.clone(), Some(reg_value))?;
                }

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(lr, model, grads);
                global_step += 1;

                ctx.batch = i;
                ctx.lr = lr;
                ctx.train_loss = Some(loss_value);
                callbacks.after_batch(&mut ctx)?;
            }

            if let Some(m) = metrics.as_mut() {
                ctx.metrics = m.compute(true);
            }
            if let (Some(vm), Some(vl)) = (val_metrics.as_mut(), val_loader) {
                ctx.val_metrics = evaluate_epoch(&model.valid(), vl, vm, &self.device)?;
            }
            callbacks.after_epoch(&mut ctx)?;
            if ctx.stop_training {
                tracing::info!("Training stopped by callback after epoch {}", epoch + 1);
                break;
            }
        }
        callbacks.after_fit(&mut ctx)?;

        let training_time_secs = start_time.elapsed().as_secs_f64();
        tracing::debug!("Train time: {training_time_secs:8.3}s");
        tracing::debug!("Total batches: {global_step}");

        let metrics = metrics.map(|m| {
            let mut frame = m.into_frame();
            if let Some(vm) = val_metrics {
                frame.join_suffixed(vm.stored(), VAL_SUFFIX);
            }
            frame
        });
        Ok(TrainingOutput {
            model,
            metrics,
            training_time_secs,
        })
    }
}

/// Run `model` over `loader` and return the metrics of one pass.
///
/// The values are also stored as a row in `metrics`.
pub fn evaluate_epoch<B: Backend>(
    model: &TimeNet<B>,
    loader: &TimeDataLoader,
    metrics: &mut MetricsCollection,
    device: &B::Device,
) -> Result<Vec<(String, f64)>> {
    metrics.reset();
    for batch in loader.iter::<B>(device) {
        let batch = batch?;
        let preds = model.forward(&batch);
        metrics.update_tensors(preds, batch.targets, None)?;
    }
    Ok(metrics.compute(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerKind;
    use crate::losses::LossFunc;
    use crate::metrics::Metric;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use chrono::{Duration, NaiveDate};
    use neuralprophet_core::Seed;
    use neuralprophet_data::{ComponentMode, FeatureLayout, TimeDataset, TimeSeriesFrame};
    use neuralprophet_model::{Growth, TimeNetConfig};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn linear_dataset(n: usize) -> (TimeDataset, FeatureLayout) {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let ds: Vec<_> = (0..n).map(|i| start + Duration::days(i as i64)).collect();
        let t: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
        let y: Vec<f64> = t.iter().map(|t| 0.2 + 0.6 * t).collect();
        let frame = TimeSeriesFrame::new(ds)
            .with_column("t", t)
            .unwrap()
            .with_column("y_scaled", y)
            .unwrap();
        let layout = FeatureLayout::new(0, 1);
        (TimeDataset::new(&frame, &layout, false).unwrap(), layout)
    }

    fn net_config(layout: FeatureLayout) -> TimeNetConfig {
        TimeNetConfig {
            layout,
            growth: Growth::Linear,
            changepoints: Vec::new(),
            seasonality_mode: ComponentMode::Additive,
            num_hidden_layers: 0,
            d_hidden: 1,
        }
    }

    #[test]
    fn test_fit_reduces_loss_on_linear_trend() {
        let device = Default::default();
        let (dataset, layout) = linear_dataset(64);
        let loader = TimeDataLoader::builder(dataset.clone())
            .batch_size(16)
            .shuffle(true)
            .seed(Seed::new(0))
            .build()
            .unwrap();
        let val_loader = TimeDataLoader::builder(dataset).batch_size(64).build().unwrap();
        let model = net_config(layout).init::<TestBackend>(&device, Seed::new(0));

        let config = TrainConfig::default().with_loss_func(LossFunc::Mse);
        let reg = Regularization::default();
        let trainer = Trainer::<TestBackend>::new(&config, &reg, 0.1, 30, device);
        let metrics = MetricsCollection::new(LossFunc::Mse, &[Metric::Mae], true);
        let out = trainer
            .fit(model, &loader, Some(&val_loader), Some(metrics), &mut CallbackList::new())
            .unwrap();

        let frame = out.metrics.unwrap();
        assert_eq!(frame.len(), 30);
        assert_eq!(
            frame.columns().to_vec(),
            vec!["MSELoss", "MAE", "RegLoss", "MSELoss_val", "MAE_val"]
        );
        let mae = frame.column("MAE").unwrap();
        assert!(mae[29] < mae[0]);
        assert!(frame.get(29, "MAE_val").unwrap() < 0.15);
    }

    #[test]
    fn test_fit_without_metrics() {
        let device = Default::default();
        let (dataset, layout) = linear_dataset(20);
        let loader = TimeDataLoader::builder(dataset).batch_size(8).build().unwrap();
        let model = net_config(layout).init::<TestBackend>(&device, Seed::new(1));
        let config = TrainConfig::default().with_optimizer(OptimizerKind::Sgd);
        let reg = Regularization::default();
        let out = Trainer::<TestBackend>::new(&config, &reg, 0.01, 2, device)
            .fit(model, &loader, None, None, &mut CallbackList::new())
            .unwrap();
        assert!(out.metrics.is_none());
    }
}

//! Callback system for training hooks.
//!
//! The trainer reports progress through callbacks. [`Progress`] picks the
//! standard set: an `indicatif` bar, per-epoch `tracing` lines, or a live
//! terminal loss chart (cargo feature `live`).

use std::fmt;
use std::str::FromStr;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Result, TrainError};
use crate::metrics::{format_epoch_metrics, VAL_SUFFIX};

/// Context passed to callbacks containing training state.
#[derive(Debug, Clone)]
pub struct CallbackContext {
    /// Current epoch (0-indexed).
    pub epoch: usize,
    /// Total number of epochs.
    pub n_epochs: usize,
    /// Current batch (0-indexed).
    pub batch: usize,
    /// Total number of batches in epoch.
    pub n_batches: usize,
    /// Current learning rate.
    pub lr: f64,
    /// Loss of the last training batch, including regularization.
    pub train_loss: Option<f64>,
    /// Training metrics of the last epoch.
    pub metrics: Vec<(String, f64)>,
    /// Validation metrics of the last epoch.
    pub val_metrics: Vec<(String, f64)>,
    /// Whether to stop training.
    pub stop_training: bool,
}

impl CallbackContext {
    /// Create a new callback context.
    pub fn new(n_epochs: usize, n_batches: usize) -> Self {
        Self {
            epoch: 0,
            n_epochs,
            batch: 0,
            n_batches,
            lr: 0.0,
            train_loss: None,
            metrics: Vec::new(),
            val_metrics: Vec::new(),
            stop_training: false,
        }
    }

    /// Get progress as a fraction (0.0 to 1.0).
    pub fn progress(&self) -> f64 {
        let total_batches = (self.n_epochs * self.n_batches).max(1);
        let current = self.epoch * self.n_batches + self.batch;
        current as f64 / total_batches as f64
    }

    /// Training and validation metrics, validation names suffixed.
    pub fn all_metrics(&self) -> Vec<(String, f64)> {
        let mut all = self.metrics.clone();
        all.extend(self.val_metrics.iter().map(|(k, v)| (format!("{k}{VAL_SUFFIX}"), *v)));
        all
    }
}

/// Trait for training callbacks.
///
/// Callbacks allow customization of the training loop at various points.
pub trait Callback: Send {
    /// Called before training starts.
    fn before_fit(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        Ok(())
    }

    /// Called after training completes.
    fn after_fit(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        Ok(())
    }

    /// Called before each epoch.
    fn before_epoch(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        Ok(())
    }

    /// Called after each epoch, with metrics filled in.
    fn after_epoch(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        Ok(())
    }

    /// Called after each training batch.
    fn after_batch(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        Ok(())
    }

    /// Get the callback name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A list of callbacks.
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn Callback>>,
}

impl CallbackList {
    /// Create a new empty callback list.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Add a callback.
    pub fn add<C: Callback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    /// Number of callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Names of the callbacks in call order.
    pub fn names(&self) -> Vec<&str> {
        self.callbacks.iter().map(|cb| cb.name()).collect()
    }

    /// Call before_fit on all callbacks.
    pub fn before_fit(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|cb| cb.before_fit(ctx))
    }

    /// Call after_fit on all callbacks.
    pub fn after_fit(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|cb| cb.after_fit(ctx))
    }

    /// Call before_epoch on all callbacks.
    pub fn before_epoch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|cb| cb.before_epoch(ctx))
    }

    /// Call after_epoch on all callbacks.
    pub fn after_epoch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|cb| cb.after_epoch(ctx))
    }

    /// Call after_batch on all callbacks.
    pub fn after_batch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|cb| cb.after_batch(ctx))
    }
}

/// How training progress is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Progress {
    /// Progress bar with the latest metrics.
    #[default]
    Bar,
    /// One log line per epoch.
    Print,
    /// Live chart of the loss.
    Plot,
    /// Live chart of all metrics.
    PlotAll,
    /// Nothing.
    None,
}

impl FromStr for Progress {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bar" => Ok(Self::Bar),
            "print" => Ok(Self::Print),
            "plot" => Ok(Self::Plot),
            "plot-all" => Ok(Self::PlotAll),
            "none" => Ok(Self::None),
            other => Err(TrainError::InvalidConfig(format!(
                "unknown progress {other:?}; valid: bar, print, plot, plot-all, none"
            ))),
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bar => "bar",
            Self::Print => "print",
            Self::Plot => "plot",
            Self::PlotAll => "plot-all",
            Self::None => "none",
        })
    }
}

impl Progress {
    /// Callbacks showing this kind of progress.
    ///
    /// Without metrics only a bar can be shown; plots need the `live`
    /// feature and fall back to a bar otherwise.
    pub fn callbacks(self, with_metrics: bool) -> CallbackList {
        let mut list = CallbackList::new();
        let progress = match self {
            Self::Print | Self::Plot | Self::PlotAll if !with_metrics => {
                tracing::warn!("Can not show {self} progress as no metrics are collected.");
                Self::Bar
            }
            Self::Plot | Self::PlotAll if !cfg!(feature = "live") => {
                tracing::warn!("To plot live loss, enable the `live` feature. Showing a progress bar instead.");
                Self::Bar
            }
            other => other,
        };
        match progress {
            Self::Bar => list.add(ProgressBarCallback::new()),
            Self::Print => list.add(PrintCallback),
            #[cfg(feature = "live")]
            Self::Plot => list.add(ShowGraphCallback::new()),
            #[cfg(feature = "live")]
            Self::PlotAll => list.add(ShowGraphCallback::new().all_metrics(true)),
            _ => {}
        }
        list
    }
}

/// Progress bar over epochs.
pub struct ProgressBarCallback {
    bar: Option<ProgressBar>,
}

impl ProgressBarCallback {
    /// Create a new progress bar callback.
    pub fn new() -> Self {
        Self { bar: None }
    }
}

impl Default for ProgressBarCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl Callback for ProgressBarCallback {
    fn before_fit(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        let bar = ProgressBar::new(ctx.n_epochs as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} epochs ({msg})")
            .map_err(|e| TrainError::InvalidConfig(format!("progress template: {e}")))?
            .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        self.bar = Some(bar);
        Ok(())
    }

    fn after_epoch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        if let Some(bar) = &self.bar {
            bar.set_message(format_epoch_metrics(None, &ctx.all_metrics()));
            bar.inc(1);
        }
        Ok(())
    }

    fn after_fit(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ProgressBarCallback"
    }
}

/// Logs the metrics of every epoch through `tracing`.
pub struct PrintCallback;

impl Callback for PrintCallback {
    fn before_fit(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        tracing::info!("Starting training for {} epochs", ctx.n_epochs);
        Ok(())
    }

    fn after_epoch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        tracing::info!("{}", format_epoch_metrics(Some(ctx.epoch), &ctx.all_metrics()));
        Ok(())
    }

    fn after_fit(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        tracing::info!("Training completed");
        Ok(())
    }

    fn name(&self) -> &str {
        "PrintCallback"
    }
}

/// Live ASCII charts of the training metrics.
///
/// The first metric (the loss) is shown on a log scale; with
/// [`all_metrics`](Self::all_metrics) every metric gets a chart.
#[cfg(feature = "live")]
pub struct ShowGraphCallback {
    history: Vec<(String, Vec<f64>)>,
    all_metrics: bool,
    width: usize,
    height: usize,
}

#[cfg(feature = "live")]
impl Default for ShowGraphCallback {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            all_metrics: false,
            width: 50,
            height: 10,
        }
    }
}

#[cfg(feature = "live")]
impl ShowGraphCallback {
    /// Create a new show graph callback with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chart every metric, not only the loss.
    #[must_use]
    pub fn all_metrics(mut self, all: bool) -> Self {
        self.all_metrics = all;
        self
    }

    /// Set the graph width in characters.
    #[must_use]
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(20);
        self
    }

    fn record(&mut self, name: String, value: f64) {
        match self.history.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value),
            None => self.history.push((name, vec![value])),
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (name, values) in &self.history {
            out.push_str(&crate::plot::line_chart(name, values, self.width, self.height));
            out.push('\n');
        }
        out
    }
}

#[cfg(feature = "live")]
impl Callback for ShowGraphCallback {
    fn before_fit(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        self.history.clear();
        Ok(())
    }

    fn after_epoch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        let mut push_group = |metrics: &[(String, f64)], prefix: &str| {
            for (i, (name, value)) in metrics.iter().enumerate() {
                if i == 0 {
                    self.record(format!("{prefix}log-{name}"), value.max(f64::MIN_POSITIVE).ln());
                } else if self.all_metrics {
                    self.record(format!("{prefix}{name}"), *value);
                }
            }
        };
        push_group(&ctx.metrics, "");
        push_group(&ctx.val_metrics, "val_");

        let every = 1 + ctx.n_epochs / 20;
        if ctx.epoch % every == 0 || ctx.epoch + 1 == ctx.n_epochs {
            print!("{}", self.render());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ShowGraphCallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingCallback {
        epochs: usize,
    }

    impl Callback for CountingCallback {
        fn after_epoch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
            self.epochs += 1;
            if self.epochs == 2 {
                ctx.stop_training = true;
            }
            Ok(())
        }
    }

    #[test]
    fn test_callback_context() {
        let mut ctx = CallbackContext::new(10, 100);
        assert_eq!(ctx.epoch, 0);
        assert_eq!(ctx.progress(), 0.0);
        ctx.epoch = 5;
        assert!((ctx.progress() - 0.5).abs() < 1e-12);

        ctx.metrics = vec![("MAE".to_string(), 1.0)];
        ctx.val_metrics = vec![("MAE".to_string(), 2.0)];
        assert_eq!(ctx.all_metrics()[1].0, "MAE_val");
    }

    #[test]
    fn test_callback_list_can_stop() {
        let mut list = CallbackList::new();
        list.add(CountingCallback { epochs: 0 });
        let mut ctx = CallbackContext::new(10, 1);
        list.after_epoch(&mut ctx).unwrap();
        assert!(!ctx.stop_training);
        list.after_epoch(&mut ctx).unwrap();
        assert!(ctx.stop_training);
    }

    #[test]
    fn test_progress_callbacks() {
        assert_eq!("plot-all".parse::<Progress>().unwrap(), Progress::PlotAll);
        assert!("fancy".parse::<Progress>().is_err());
        assert!(Progress::None.callbacks(true).is_empty());
        assert_eq!(Progress::Print.callbacks(true).names(), vec!["PrintCallback"]);
        assert_eq!(Progress::Print.callbacks(false).names(), vec!["ProgressBarCallback"]);
        #[cfg(not(feature = "live"))]
        assert_eq!(Progress::Plot.callbacks(true).names(), vec!["ProgressBarCallback"]);
    }
}

//! Training and evaluation metrics.
//!
//! A [`MetricsCollection`] accumulates batch statistics over an epoch and
//! stores one row per epoch in a [`MetricsFrame`].

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};
use crate::losses::LossFunc;

/// Name of the regularization value metric.
pub const REG_LOSS: &str = "RegLoss";
/// Suffix of validation columns.
pub const VAL_SUFFIX: &str = "_val";

/// A batch metric on predictions and targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Mean absolute error.
    #[serde(rename = "mae")]
    Mae,
    /// Mean squared error.
    #[serde(rename = "mse")]
    Mse,
    /// Root mean squared error.
    #[serde(rename = "rmse")]
    Rmse,
}

impl Metric {
    /// Column name of the metric.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mae => "MAE",
            Self::Mse => "MSE",
            Self::Rmse => "RMSE",
        }
    }

    /// Metrics collected when none are chosen.
    pub fn defaults() -> Vec<Self> {
        vec![Self::Mae, Self::Rmse]
    }

    fn term(&self, diff: f64) -> f64 {
        match self {
            Self::Mae => diff.abs(),
            Self::Mse | Self::Rmse => diff * diff,
        }
    }

    fn finish(&self, mean: f64) -> f64 {
        match self {
            Self::Rmse => mean.sqrt(),
            _ => mean,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mae" => Ok(Self::Mae),
            "mse" => Ok(Self::Mse),
            "rmse" => Ok(Self::Rmse),
            other => Err(TrainError::InvalidConfig(format!(
                "unsupported metric {other:?}; valid: mae, rmse, mse"
            ))),
        }
    }
}

/// Metrics per epoch with ordered columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsFrame {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl MetricsFrame {
    /// Create an empty frame with these columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row given as `(column, value)` pairs in column order.
    ///
    /// # Errors
    ///
    /// Returns an error if the columns differ from the frame's.
    pub fn push(&mut self, row: &[(String, f64)]) -> Result<()> {
        if self.columns.is_empty() && self.rows.is_empty() {
            self.columns = row.iter().map(|(c, _)| c.clone()).collect();
        }
        if row.len() != self.columns.len() || row.iter().zip(&self.columns).any(|((c, _), col)| c != col) {
            return Err(TrainError::InvalidInput(format!(
                "metric row does not match columns {:?}",
                self.columns
            )));
        }
        self.rows.push(row.iter().map(|(_, v)| *v).collect());
        Ok(())
    }

    /// Values of a column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Value at `row` of column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.rows.get(row).map(|r| r[idx])
    }

    /// Last row as `(column, value)` pairs.
    pub fn last(&self) -> Option<Vec<(String, f64)>> {
        self.rows
            .last()
            .map(|r| self.columns.iter().cloned().zip(r.iter().copied()).collect())
    }

    /// Append the columns of `other` with `suffix`, aligned by row.
    ///
    /// Missing rows in `other` are filled with NaN.
    pub fn join_suffixed(&mut self, other: &MetricsFrame, suffix: &str) {
        for (c, col) in other.columns.iter().enumerate() {
            self.columns.push(format!("{col}{suffix}"));
            for (i, row) in self.rows.iter_mut().enumerate() {
                row.push(other.rows.get(i).map_or(f64::NAN, |r| r[c]));
            }
        }
    }

    /// Write the frame as CSV.
    pub fn to_csv_string(&self) -> String {
        let mut out = self.columns.join(",");
        out.push('\n');
        for row in &self.rows {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for MetricsFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", format_metrics_header(&self.columns))?;
        for row in &self.rows {
            let values: Vec<String> = row.iter().map(|v| format!("{v:>12.4e}")).collect();
            writeln!(f, "{}", values.join(" "))?;
        }
        Ok(())
    }
}

fn format_metrics_header(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("{c:>12}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One line of epoch metrics, e.g. for progress printing.
pub fn format_epoch_metrics(epoch: Option<usize>, metrics: &[(String, f64)]) -> String {
    let values: Vec<String> = metrics.iter().map(|(k, v)| format!("{k}={v:.4e}")).collect();
    match epoch {
        Some(e) => format!("Epoch {}: {}", e + 1, values.join(", ")),
        None => values.join(", "),
    }
}

/// Accumulates metrics over batches.
#[derive(Debug, Clone)]
pub struct MetricsCollection {
    loss: LossFunc,
    metrics: Vec<Metric>,
    with_reg_loss: bool,
    specific_target: Option<usize>,
    shift_scale: Option<(f64, f64)>,
    loss_sum: f64,
    sums: Vec<f64>,
    reg_sum: f64,
    n_values: usize,
    n_samples: usize,
    total_updates: usize,
    stored: MetricsFrame,
}

impl MetricsCollection {
    /// Create a collection reporting the loss and `metrics`.
    ///
    /// With `with_reg_loss` the collection also averages the regularization
    /// term passed to [`update`](Self::update).
    pub fn new(loss: LossFunc, metrics: &[Metric], with_reg_loss: bool) -> Self {
        let mut collection = Self {
            loss,
            metrics: metrics.to_vec(),
            with_reg_loss,
            specific_target: None,
            shift_scale: None,
            loss_sum: 0.0,
            sums: vec![0.0; metrics.len()],
            reg_sum: 0.0,
            n_values: 0,
            n_samples: 0,
            total_updates: 0,
            stored: MetricsFrame::default(),
        };
        collection.stored = MetricsFrame::new(collection.names());
        collection
    }

    /// A fresh collection with the same metrics and no regularization value.
    pub fn new_like(&self) -> Self {
        let mut other = Self::new(self.loss, &self.metrics, false);
        other.specific_target = self.specific_target;
        other.shift_scale = self.shift_scale;
        other
    }

    /// Column names in report order.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![self.loss.name().to_string()];
        names.extend(self.metrics.iter().map(|m| m.name().to_string()));
        if self.with_reg_loss {
            names.push(REG_LOSS.to_string());
        }
        names
    }

    /// Restrict metrics to the forecast step at index `target_pos`.
    pub fn add_specific_target(&mut self, target_pos: usize) {
        self.specific_target = Some(target_pos);
    }

    /// Report metrics in original units, `value * scale + shift`.
    pub fn set_shift_scale(&mut self, shift: f64, scale: f64) {
        self.shift_scale = Some((shift, scale));
    }

    /// Clear the epoch accumulators.
    pub fn reset(&mut self) {
        self.loss_sum = 0.0;
        self.sums.iter_mut().for_each(|s| *s = 0.0);
        self.reg_sum = 0.0;
        self.n_values = 0;
        self.n_samples = 0;
    }

    /// Number of batches seen since creation.
    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    /// Add a batch of row-major `[n, n_forecasts]` predictions and targets.
    pub fn update(&mut self, preds: &[f32], targets: &[f32], n_forecasts: usize, reg_loss: Option<f64>) {
        let n_forecasts = n_forecasts.max(1);
        let n = preds.len() / n_forecasts;
        for (i, (p, t)) in preds.iter().zip(targets).enumerate() {
            if self.specific_target.is_some_and(|pos| i % n_forecasts != pos) {
                continue;
            }
            let (p, t) = (f64::from(*p), f64::from(*t));
            self.loss_sum += self.loss.value(p - t);
            let (p, t) = match self.shift_scale {
                Some((shift, scale)) => (p * scale + shift, t * scale + shift),
                None => (p, t),
            };
            for (sum, metric) in self.sums.iter_mut().zip(&self.metrics) {
                *sum += metric.term(p - t);
            }
            self.n_values += 1;
        }
        if let Some(reg) = reg_loss {
            self.reg_sum += reg * n as f64;
        }
        self.n_samples += n;
        self.total_updates += 1;
    }

    /// Add a batch of tensors.
    pub fn update_tensors<B: Backend>(
        &mut self,
        preds: Tensor<B, 2>,
        targets: Tensor<B, 2>,
        reg_loss: Option<f64>,
    ) -> Result<()> {
        let [_, n_forecasts] = preds.dims();
        let preds = tensor_values(preds)?;
        let targets = tensor_values(targets)?;
        self.update(&preds, &targets, n_forecasts, reg_loss);
        Ok(())
    }

    /// Epoch values in report order; with `save` they are stored as a row.
    pub fn compute(&mut self, save: bool) -> Vec<(String, f64)> {
        let denom = self.n_values.max(1) as f64;
        let mut values = vec![(self.loss.name().to_string(), self.loss_sum / denom)];
        for (sum, metric) in self.sums.iter().zip(&self.metrics) {
            values.push((metric.name().to_string(), metric.finish(sum / denom)));
        }
        if self.with_reg_loss {
            values.push((REG_LOSS.to_string(), self.reg_sum / self.n_samples.max(1) as f64));
        }
        if save {
            // Column set is fixed at construction.
            let _ = self.stored.push(&values);
        }
        values
    }

    /// Stored epoch rows.
    pub fn stored(&self) -> &MetricsFrame {
        &self.stored
    }

    /// Take the stored rows.
    pub fn into_frame(self) -> MetricsFrame {
        self.stored
    }
}

/// Copy a 2D tensor to the host as `f32`.
pub fn tensor_values<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TrainError::InvalidInput(format!("cannot read tensor: {e:?}")))
}

/// Symmetric total percentage error between true and estimated weights.
///
/// `100 · Σ|v - e| / (Σ|v| + Σ|e|)`
pub fn symmetric_total_percentage_error(values: &[f64], estimates: &[f64]) -> f64 {
    let sum_abs_diff: f64 = values.iter().zip(estimates).map(|(v, e)| (v - e).abs()).sum();
    let sum_abs: f64 = values.iter().map(|v| v.abs()).sum::<f64>() + estimates.iter().map(|e| e.abs()).sum::<f64>();
    if sum_abs == 0.0 {
        return 0.0;
    }
    100.0 * sum_abs_diff / sum_abs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names() {
        let collection = MetricsCollection::new(LossFunc::Huber, &Metric::defaults(), true);
        assert_eq!(collection.names(), vec!["SmoothL1Loss", "MAE", "RMSE", "RegLoss"]);
    }

    #[test]
    fn test_epoch_average_is_weighted_by_batch_size() {
        let mut collection = MetricsCollection::new(LossFunc::Mae, &[Metric::Mae, Metric::Rmse], true);
        collection.update(&[1.0], &[0.0], 1, Some(1.0));
        collection.update(&[0.0, 0.0, 0.0], &[0.0, 0.0, 0.0], 1, Some(0.0));
        let values = collection.compute(true);
        assert!((values[0].1 - 0.25).abs() < 1e-12);
        assert!((values[1].1 - 0.25).abs() < 1e-12);
        assert!((values[2].1 - 0.5).abs() < 1e-12);
        assert!((values[3].1 - 0.25).abs() < 1e-12);
        assert_eq!(collection.stored().len(), 1);
    }

    #[test]
    fn test_specific_target_and_shift_scale() {
        let mut collection = MetricsCollection::new(LossFunc::Mae, &[Metric::Mae], false);
        collection.add_specific_target(1);
        collection.set_shift_scale(5.0, 10.0);
        // two samples, two steps; only step 1 counts
        collection.update(&[0.0, 1.0, 0.0, 0.5], &[9.0, 0.0, 9.0, 0.0], 2, None);
        let values = collection.compute(false);
        assert!((values[0].1 - 0.75).abs() < 1e-12);
        assert!((values[1].1 - 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_frame_join_suffixed() {
        let mut train = MetricsFrame::default();
        train.push(&[("MAE".to_string(), 1.0)]).unwrap();
        train.push(&[("MAE".to_string(), 0.5)]).unwrap();
        let mut val = MetricsFrame::default();
        val.push(&[("MAE".to_string(), 2.0)]).unwrap();
        train.join_suffixed(&val, VAL_SUFFIX);
        assert_eq!(train.columns(), &["MAE".to_string(), "MAE_val".to_string()]);
        assert_eq!(train.get(0, "MAE_val"), Some(2.0));
        assert!(train.get(1, "MAE_val").unwrap().is_nan());
        assert!(train.push(&[("RMSE".to_string(), 1.0)]).is_err());
    }

    #[test]
    fn test_parse_metric() {
        assert_eq!("RMSE".parse::<Metric>().unwrap(), Metric::Rmse);
        assert!("mape".parse::<Metric>().is_err());
    }

    #[test]
    fn test_stpe() {
        assert_eq!(symmetric_total_percentage_error(&[1.0, -1.0], &[1.0, -1.0]), 0.0);
        assert!((symmetric_total_percentage_error(&[1.0], &[0.0]) - 100.0).abs() < 1e-12);
    }
}

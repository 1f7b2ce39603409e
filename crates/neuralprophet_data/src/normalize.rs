//! Data normalization.
//!
//! Time is mapped to `t ∈ [0, 1]` over the training range; `y`, lagged
//! covariates and future regressors get a shift and a scale. Parameters can
//! be global (fitted on all series concatenated) or local per named series.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use crate::frame::{TimeSeriesFrame, SINGLE_FRAME_KEY};

/// How a numeric column is shifted and scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeMode {
    /// `minmax` for binary columns, `soft` otherwise.
    #[default]
    Auto,
    /// No scaling.
    Off,
    /// Minimum to 0, maximum to 1.
    Minmax,
    /// Zero mean, unit variance.
    Standardize,
    /// Minimum to 0, 95th percentile to 1.
    Soft,
    /// Minimum to 0.1, 90th percentile to 0.9.
    Soft1,
}

impl FromStr for NormalizeMode {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "off" => Ok(Self::Off),
            "minmax" => Ok(Self::Minmax),
            "standardize" => Ok(Self::Standardize),
            "soft" => Ok(Self::Soft),
            "soft1" => Ok(Self::Soft1),
            other => Err(DataError::Normalization(format!("unknown normalization mode {other:?}"))),
        }
    }
}

/// `normalized = (value - shift) / scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShiftScale {
    /// Subtracted first.
    pub shift: f64,
    /// Divided by second. Never zero.
    pub scale: f64,
}

impl Default for ShiftScale {
    fn default() -> Self {
        Self { shift: 0.0, scale: 1.0 }
    }
}

impl ShiftScale {
    /// Fit parameters on the finite values of a column.
    #[must_use]
    pub fn fit(values: &[f64], mode: NormalizeMode) -> Self {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self::default();
        }
        finite.sort_by(f64::total_cmp);
        let min = finite[0];
        let max = finite[finite.len() - 1];

        let mode = match mode {
            NormalizeMode::Auto if finite.iter().all(|v| *v == 0.0 || *v == 1.0) => NormalizeMode::Minmax,
            NormalizeMode::Auto => NormalizeMode::Soft,
            other => other,
        };
        let (shift, scale) = match mode {
            NormalizeMode::Off | NormalizeMode::Auto => (0.0, 1.0),
            NormalizeMode::Minmax => (min, max - min),
            NormalizeMode::Standardize => {
                let n = finite.len() as f64;
                let mean = finite.iter().sum::<f64>() / n;
                let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
                (mean, var.sqrt())
            }
            NormalizeMode::Soft => (min, quantile(&finite, 0.95) - min),
            NormalizeMode::Soft1 => {
                let scale = (quantile(&finite, 0.9) - min) / 0.8;
                (min - 0.1 * scale, scale)
            }
        };
        let scale = if scale.abs() < f64::EPSILON || !scale.is_finite() { 1.0 } else { scale };
        Self { shift, scale }
    }

    /// Normalize one value.
    #[must_use]
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.shift) / self.scale
    }

    /// Undo [`apply`](Self::apply).
    #[must_use]
    pub fn invert(&self, value: f64) -> f64 {
        value * self.scale + self.shift
    }
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Maps timestamps to `t`, with `t = 0` at the first and `t = 1` at the
/// last training timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeParams {
    /// Timestamp mapped to 0.
    pub start: NaiveDateTime,
    /// Seconds mapped to a unit of `t`.
    pub span_seconds: f64,
}

impl TimeParams {
    /// Fit on a date column.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty column.
    pub fn fit(ds: &[NaiveDateTime]) -> Result<Self> {
        let start = ds.iter().min().copied().ok_or(DataError::EmptyFrame)?;
        let end = ds.iter().max().copied().ok_or(DataError::EmptyFrame)?;
        let span = (end - start).num_seconds() as f64;
        Ok(Self {
            start,
            span_seconds: if span > 0.0 { span } else { 1.0 },
        })
    }

    /// Normalized time of a timestamp.
    #[must_use]
    pub fn normalize(&self, ds: NaiveDateTime) -> f64 {
        (ds - self.start).num_seconds() as f64 / self.span_seconds
    }

    /// Timestamp of a normalized time.
    #[must_use]
    pub fn denormalize(&self, t: f64) -> NaiveDateTime {
        self.start + Duration::seconds((t * self.span_seconds).round() as i64)
    }
}

/// Normalization parameters of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataParams {
    /// Time mapping.
    pub time: TimeParams,
    /// Per-column shift and scale (`y`, covariates, regressors).
    pub columns: BTreeMap<String, ShiftScale>,
}

impl DataParams {
    /// Fit on a frame. `columns` lists each column with its mode; absent
    /// columns are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty frame.
    pub fn fit(frame: &TimeSeriesFrame, columns: &[(String, NormalizeMode)]) -> Result<Self> {
        let time = TimeParams::fit(frame.ds())?;
        let columns = columns
            .iter()
            .filter_map(|(name, mode)| frame.column(name).map(|v| (name.clone(), ShiftScale::fit(v, *mode))))
            .collect();
        Ok(Self { time, columns })
    }

    /// Parameters of `y`.
    #[must_use]
    pub fn y(&self) -> ShiftScale {
        self.columns.get("y").copied().unwrap_or_default()
    }
}

/// Global and per-series normalization parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    /// Mode used for `y`.
    pub mode: NormalizeMode,
    /// Use one set of parameters for all series.
    pub global_normalization: bool,
    /// Share the time mapping across series even with local parameters.
    pub global_time_normalization: bool,
    /// Fall back to global parameters for series unseen during fit.
    pub unknown_data_normalization: bool,
    global: Option<DataParams>,
    local: BTreeMap<String, DataParams>,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mode: NormalizeMode::Auto,
            global_normalization: false,
            global_time_normalization: true,
            unknown_data_normalization: false,
            global: None,
            local: BTreeMap::new(),
        }
    }
}

impl Normalization {
    /// Fit global and local parameters.
    ///
    /// `extra_columns` lists covariates and regressors with their own modes.
    /// A single series always uses global normalization.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame is empty.
    pub fn init_data_params(
        &mut self,
        frames: &BTreeMap<String, TimeSeriesFrame>,
        extra_columns: &[(String, NormalizeMode)],
    ) -> Result<()> {
        if frames.len() == 1 && !self.global_normalization {
            tracing::info!("Setting normalization to global as only one dataframe provided for training");
            self.global_normalization = true;
        }
        let mut columns = vec![("y".to_string(), self.mode)];
        columns.extend(extra_columns.iter().cloned());

        let merged = TimeSeriesFrame::concat(frames.values());
        self.global = Some(DataParams::fit(&merged, &columns)?);
        self.local = frames
            .iter()
            .map(|(name, frame)| DataParams::fit(frame, &columns).map(|p| (name.clone(), p)))
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// Parameters fitted on all series together.
    #[must_use]
    pub fn global_params(&self) -> Option<&DataParams> {
        self.global.as_ref()
    }

    /// Parameters to apply to the series called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error before fitting, or for an unknown series when
    /// neither global nor unknown-data normalization is enabled.
    pub fn get_data_params(&self, name: &str) -> Result<DataParams> {
        let global = self
            .global
            .as_ref()
            .ok_or_else(|| DataError::Normalization("normalization parameters not initialized".to_string()))?;
        let mut params = if self.global_normalization {
            global.clone()
        } else if let Some(local) = self.local.get(name).filter(|_| name != SINGLE_FRAME_KEY) {
            local.clone()
        } else if self.unknown_data_normalization {
            global.clone()
        } else {
            return Err(DataError::Normalization(format!(
                "unknown series {name:?}: enable global_normalization or unknown_data_normalization to predict on it"
            )));
        };
        if self.global_time_normalization {
            params.time = global.time;
        }
        Ok(params)
    }
}

/// Apply parameters: adds `t` and `y_scaled`, scales other known columns in place.
///
/// # Errors
///
/// Returns an error if column lengths disagree.
pub fn normalize(frame: &TimeSeriesFrame, params: &DataParams) -> Result<TimeSeriesFrame> {
    let mut out = frame.clone();
    for (name, ss) in &params.columns {
        if name == "y" {
            continue;
        }
        if let Some(values) = out.column_mut(name) {
            values.iter_mut().for_each(|v| *v = ss.apply(*v));
        }
    }
    let t = frame.ds().iter().map(|d| params.time.normalize(*d)).collect();
    out.set_column("t", t)?;
    if let Some(y) = frame.column("y") {
        let ss = params.y();
        out.set_column("y_scaled", y.iter().map(|v| ss.apply(*v)).collect())?;
    }
    Ok(out)
}

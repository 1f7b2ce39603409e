//! Missing dates and missing values.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use neuralprophet_core::Frequency;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use crate::frame::TimeSeriesFrame;

/// What the imputation step needs to know about the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingDataConfig {
    /// Number of lagged `y` inputs.
    pub n_lags: usize,
    /// Forecast steps per sample.
    pub n_forecasts: usize,
    /// Impute instead of failing on gaps.
    pub impute_missing: bool,
    /// Gap length filled by linear interpolation from each side.
    pub impute_limit_linear: usize,
    /// Window of the centered rolling mean for longer gaps.
    pub impute_rolling: usize,
    /// Lagged covariate columns.
    pub covariates: Vec<String>,
    /// Future regressor columns.
    pub regressors: Vec<String>,
    /// Event indicator columns.
    pub events: Vec<String>,
}

impl Default for MissingDataConfig {
    fn default() -> Self {
        Self {
            n_lags: 0,
            n_forecasts: 1,
            impute_missing: true,
            impute_limit_linear: 5,
            impute_rolling: 20,
            covariates: Vec::new(),
            regressors: Vec::new(),
            events: Vec::new(),
        }
    }
}

/// Reindex a frame onto the regular grid between its first and last date.
///
/// Inserted rows hold `NaN` in every column. Rows off the grid are dropped.
/// Returns the reindexed frame and the number of inserted rows.
///
/// # Errors
///
/// Propagates column errors from rebuilding the frame.
pub fn add_missing_dates_nan(frame: &TimeSeriesFrame, freq: Frequency) -> Result<(TimeSeriesFrame, usize)> {
    let (Some(first), Some(last)) = (frame.first_date(), frame.last_date()) else {
        return Ok((frame.clone(), 0));
    };
    let grid = freq.date_range(first, last);
    let position: HashMap<NaiveDateTime, usize> =
        frame.ds().iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut out = TimeSeriesFrame::new(grid.clone());
    for name in frame.column_names() {
        let source = frame.column(name).unwrap_or_default();
        let values = grid
            .iter()
            .map(|d| position.get(d).map_or(f64::NAN, |&i| source[i]))
            .collect();
        out.set_column(name, values)?;
    }

    let kept = grid.iter().filter(|d| position.contains_key(d)).count();
    if kept < frame.len() {
        tracing::warn!(
            "Dropped {} rows whose timestamps are not on the {freq} grid",
            frame.len() - kept
        );
    }
    let added = grid.len() - kept;
    Ok((out, added))
}

/// Fill gaps linearly, then with a centered rolling mean.
///
/// Interior gaps are interpolated for up to `limit_linear` values from each
/// side; leading and trailing gaps take the nearest observation for up to
/// `limit_linear` values. Whatever remains is filled by the mean of the
/// observations in a centered window of `rolling` values (offsets
/// `-rolling/2 ..= (rolling-1)/2`), as long as the window holds at least one.
/// A `rolling` of zero skips the second pass.
///
/// Returns the number of values still missing.
pub fn fill_linear_then_rolling_avg(values: &mut [f64], limit_linear: usize, rolling: usize) -> usize {
    let n = values.len();
    let observed: Vec<usize> = (0..n).filter(|&i| !values[i].is_nan()).collect();
    if observed.is_empty() {
        return n;
    }

    let original = values.to_vec();
    let mut i = 0;
    while i < n {
        if !original[i].is_nan() {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && original[i].is_nan() {
            i += 1;
        }
        let end = i;
        let left = start.checked_sub(1);
        let right = (end < n).then_some(end);
        for (offset, j) in (start..end).enumerate() {
            let from_left = offset + 1;
            let from_right = end - j;
            let filled = match (left, right) {
                (Some(l), Some(r)) if from_left <= limit_linear || from_right <= limit_linear => {
                    let w = (j - l) as f64 / (r - l) as f64;
                    Some(original[l] + w * (original[r] - original[l]))
                }
                (Some(l), None) if from_left <= limit_linear => Some(original[l]),
                (None, Some(r)) if from_right <= limit_linear => Some(original[r]),
                _ => None,
            };
            if let Some(v) = filled {
                values[j] = v;
            }
        }
    }

    if rolling > 0 {
        let interpolated = values.to_vec();
        let before = rolling / 2;
        let after = rolling - 1 - before;
        for j in 0..n {
            if !interpolated[j].is_nan() {
                continue;
            }
            let lo = j.saturating_sub(before);
            let hi = (j + after).min(n - 1);
            let window: Vec<f64> = interpolated[lo..=hi].iter().copied().filter(|v| !v.is_nan()).collect();
            if !window.is_empty() {
                values[j] = window.iter().sum::<f64>() / window.len() as f64;
            }
        }
    }
    values.iter().filter(|v| v.is_nan()).count()
}

fn nan_run_at_end(values: &[f64]) -> usize {
    values.iter().rev().take_while(|v| v.is_nan()).count()
}

/// Prepare one frame's missing data for training or prediction.
///
/// # Errors
///
/// Returns [`DataError::MissingData`] when gaps exist but imputation is
/// disabled, or when gaps are too long to impute.
pub fn handle_missing_data(
    frame: TimeSeriesFrame,
    freq: Frequency,
    config: &MissingDataConfig,
    predicting: bool,
) -> Result<TimeSeriesFrame> {
    let mut df = frame;

    if config.n_lags == 0 && !predicting {
        if let Some(y) = df.column("y") {
            let is_nan: Vec<bool> = y.iter().map(|v| v.is_nan()).collect();
            let n_nan = is_nan.iter().filter(|b| **b).count();
            if n_nan > 0 {
                df.retain_rows(|i| !is_nan[i]);
                tracing::info!("dropped {n_nan} NaN rows in 'y'");
            }
        }
    }

    if config.n_lags > 0 {
        let (reindexed, missing_dates) = add_missing_dates_nan(&df, freq)?;
        df = reindexed;
        if missing_dates > 0 {
            if config.impute_missing {
                tracing::info!("{missing_dates} missing dates added");
            } else {
                return Err(DataError::MissingData(format!(
                    "{missing_dates} missing dates found. Please preprocess data manually or set impute_missing to true"
                )));
            }
        }
    }

    let reg_nan_at_end = config
        .regressors
        .iter()
        .filter_map(|name| df.column(name))
        .map(nan_run_at_end)
        .max()
        .unwrap_or(0);
    if reg_nan_at_end > 0 {
        df = df.slice(0..df.len() - reg_nan_at_end);
        tracing::info!("Dropped {reg_nan_at_end} rows at end due to missing future regressor values");
    }

    let mut end_to_append = None;
    let mut nan_at_end = df.column("y").map_or(0, nan_run_at_end);
    if nan_at_end > 0 {
        if predicting {
            if config.n_forecasts > 1 && config.n_forecasts < nan_at_end {
                let surplus = nan_at_end - config.n_forecasts;
                df = df.slice(0..df.len() - surplus);
                nan_at_end = config.n_forecasts;
                tracing::info!(
                    "y has more trailing NaN values than n_forecasts can predict. Dropped {surplus} rows at end"
                );
            }
            end_to_append = Some(df.tail(nan_at_end));
            df = df.slice(0..df.len() - nan_at_end);
        } else {
            df = df.slice(0..df.len() - nan_at_end);
            tracing::info!(
                "Dropped {nan_at_end} consecutive NaNs at end. Training data can only be imputed up to last observation"
            );
        }
    }

    let mut data_columns: Vec<&str> = Vec::new();
    if config.n_lags > 0 {
        data_columns.push("y");
    }
    data_columns.extend(config.covariates.iter().map(String::as_str));
    data_columns.extend(config.regressors.iter().map(String::as_str));
    data_columns.extend(config.events.iter().map(String::as_str));

    for column in data_columns {
        let is_event = config.events.iter().any(|e| e == column);
        let Some(values) = df.column_mut(column) else {
            continue;
        };
        let n_nan = values.iter().filter(|v| v.is_nan()).count();
        if n_nan == 0 {
            continue;
        }
        if !config.impute_missing {
            return Err(DataError::MissingData(
                "Missing values found. Please preprocess data manually or set impute_missing to true".to_string(),
            ));
        }
        let remaining = if is_event {
            values.iter_mut().filter(|v| v.is_nan()).for_each(|v| *v = 0.0);
            0
        } else {
            fill_linear_then_rolling_avg(values, config.impute_limit_linear, config.impute_rolling)
        };
        tracing::info!("{} NaN values in column {column} were auto-imputed", n_nan - remaining);
        if remaining > 0 {
            return Err(DataError::MissingData(format!(
                "More than {} consecutive missing values encountered in column {column}. {remaining} NA remain. \
                 Please preprocess data manually",
                2 * config.impute_limit_linear + config.impute_rolling
            )));
        }
    }

    if let Some(tail) = end_to_append {
        df = TimeSeriesFrame::concat([&df, &tail]);
    }
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::{daily_dates, daily_frame};

    #[test]
    fn test_add_missing_dates() {
        let frame = daily_frame((2024, 1, 1), &[1.0, 2.0, 3.0, 4.0]).select_rows(&[0, 1, 3]);
        let (filled, added) = add_missing_dates_nan(&frame, Frequency::DAILY).unwrap();
        assert_eq!(added, 1);
        assert_eq!(filled.len(), 4);
        assert!(filled.column("y").unwrap()[2].is_nan());
    }

    #[test]
    fn test_linear_fill_short_gap() {
        let mut values = vec![1.0, f64::NAN, f64::NAN, 4.0];
        assert_eq!(fill_linear_then_rolling_avg(&mut values, 5, 20), 0);
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_edges_take_nearest_value() {
        let mut values = vec![f64::NAN, 2.0, 3.0, f64::NAN];
        assert_eq!(fill_linear_then_rolling_avg(&mut values, 5, 20), 0);
        assert_eq!(values, vec![2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn test_long_gap_uses_rolling_mean_or_fails() {
        let mut values: Vec<f64> = (0..60).map(|i| i as f64).collect();
        for v in &mut values[20..34] {
            *v = f64::NAN;
        }
        assert_eq!(fill_linear_then_rolling_avg(&mut values, 5, 20), 0);

        let mut values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        for v in &mut values[20..80] {
            *v = f64::NAN;
        }
        assert!(fill_linear_then_rolling_avg(&mut values, 5, 20) > 0);
    }

    #[test]
    fn test_rolling_mean_from_single_observation() {
        let mut values = vec![5.0, f64::NAN, f64::NAN, f64::NAN];
        assert_eq!(fill_linear_then_rolling_avg(&mut values, 0, 20), 0);
        assert_eq!(values, vec![5.0, 5.0, 5.0, 5.0]);

        // Default limits: one observation followed by a long gap.
        let mut values = vec![f64::NAN; 16];
        values[0] = 2.0;
        assert_eq!(fill_linear_then_rolling_avg(&mut values, 5, 20), 0);
        assert!(values.iter().all(|v| *v == 2.0));
    }

    #[test]
    fn test_rolling_window_spans_rolling_values() {
        // Window of 20 covers offsets -10..=9.
        let mut values = vec![f64::NAN; 12];
        values[0] = 1.0;
        values[11] = 100.0;
        assert_eq!(fill_linear_then_rolling_avg(&mut values, 0, 20), 0);
        assert_eq!(values[1], 1.0);
        assert_eq!(values[2], 50.5);
        assert_eq!(values[10], 50.5);
    }

    #[test]
    fn test_long_gap_imputed_from_single_observation() {
        let config = MissingDataConfig {
            covariates: vec!["temp".to_string()],
            ..Default::default()
        };
        let mut temp = vec![f64::NAN; 16];
        temp[0] = 3.0;
        let frame = TimeSeriesFrame::from_series(daily_dates((2024, 1, 1), 16), vec![1.0; 16])
            .unwrap()
            .with_column("temp", temp)
            .unwrap();
        let out = handle_missing_data(frame, Frequency::DAILY, &config, false).unwrap();
        assert_eq!(out.len(), 16);
        assert!(out.column("temp").unwrap().iter().all(|v| *v == 3.0));
    }

    #[test]
    fn test_training_drops_nan_rows_without_lags() {
        let frame = daily_frame((2024, 1, 1), &[1.0, f64::NAN, 3.0, f64::NAN]);
        let out = handle_missing_data(frame, Frequency::DAILY, &MissingDataConfig::default(), false).unwrap();
        assert_eq!(out.column("y").unwrap(), &[1.0, 3.0]);
    }

    #[test]
    fn test_lags_impute_gaps_and_keep_future_rows() {
        let config = MissingDataConfig {
            n_lags: 2,
            n_forecasts: 2,
            ..Default::default()
        };
        let y = [1.0, f64::NAN, 3.0, 4.0, f64::NAN, f64::NAN, f64::NAN];
        let frame = daily_frame((2024, 1, 1), &y);
        let out = handle_missing_data(frame.clone(), Frequency::DAILY, &config, true).unwrap();
        // One surplus trailing NaN is dropped, two are kept for the horizon.
        assert_eq!(out.len(), 6);
        let values = out.column("y").unwrap();
        assert_eq!(values[1], 2.0);
        assert!(values[4].is_nan() && values[5].is_nan());

        let trained = handle_missing_data(frame, Frequency::DAILY, &config, false).unwrap();
        assert_eq!(trained.len(), 4);
    }

    #[test]
    fn test_disabled_imputation_fails() {
        let config = MissingDataConfig {
            n_lags: 1,
            impute_missing: false,
            ..Default::default()
        };
        let frame = daily_frame((2024, 1, 1), &[1.0, 2.0, 3.0]).select_rows(&[0, 2]);
        assert!(matches!(
            handle_missing_data(frame, Frequency::DAILY, &config, false),
            Err(DataError::MissingData(_))
        ));
    }

    #[test]
    fn test_regressor_nan_at_end_truncates() {
        let config = MissingDataConfig {
            regressors: vec!["temp".to_string()],
            ..Default::default()
        };
        let frame = TimeSeriesFrame::from_series(daily_dates((2024, 1, 1), 3), vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_column("temp", vec![5.0, f64::NAN, f64::NAN])
            .unwrap();
        let out = handle_missing_data(frame, Frequency::DAILY, &config, false).unwrap();
        assert_eq!(out.len(), 1);
    }
}

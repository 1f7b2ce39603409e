//! Time-ordered train/validation splits and cross-validation folds.
//!
//! All splits keep temporal order: validation data is always later than
//! training data. Sample counts follow the windowing of [`TimeDataset`]:
//! a frame of `n` rows yields `n - n_lags + 1 - n_forecasts` samples.
//!
//! [`TimeDataset`]: crate::TimeDataset

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::error::{DataError, Result};
use crate::frame::{merge_unique_dates, TimeSeriesFrame};

type FrameMap = BTreeMap<String, TimeSeriesFrame>;

/// Train and validation frames.
pub type TrainValid = (TimeSeriesFrame, TimeSeriesFrame);

fn n_valid_samples(n_samples: usize, valid_p: f64) -> Result<usize> {
    if valid_p > 0.0 && valid_p < 1.0 {
        Ok(((n_samples as f64 * valid_p) as usize).max(1))
    } else if valid_p >= 1.0 && valid_p.fract() == 0.0 {
        Ok(valid_p as usize)
    } else {
        Err(DataError::SplitError(format!(
            "valid_p must be a fraction in (0, 1) or a whole number of samples, got {valid_p}"
        )))
    }
}

/// Split one frame so that no target row is shared.
///
/// `valid_p` is a fraction of samples in `(0, 1)` or an absolute sample
/// count `>= 1`. With `inputs_overbleed`, validation starts `n_lags` rows
/// early so that its first sample has a full lag window.
///
/// # Errors
///
/// Returns an error if fewer than one training sample would remain.
pub fn split_df(
    frame: &TimeSeriesFrame,
    n_lags: usize,
    n_forecasts: usize,
    valid_p: f64,
    inputs_overbleed: bool,
) -> Result<TrainValid> {
    let n_samples = (frame.len() + 2) as i64 - n_lags as i64 - 2 * n_forecasts as i64;
    let n_samples = if inputs_overbleed { n_samples } else { n_samples - n_lags as i64 };
    if n_samples < 2 {
        return Err(DataError::InsufficientData(format!(
            "{} rows are too few to split with n_lags={n_lags} and n_forecasts={n_forecasts}",
            frame.len()
        )));
    }
    let n_samples = n_samples as usize;
    let n_valid = n_valid_samples(n_samples, valid_p)?;
    if n_valid >= n_samples {
        return Err(DataError::SplitError(format!(
            "validation takes {n_valid} of {n_samples} samples, leaving none for training"
        )));
    }
    let n_train = n_samples - n_valid;

    let split_idx_train = n_train + n_lags + n_forecasts - 1;
    let split_idx_val = if inputs_overbleed { split_idx_train - n_lags } else { split_idx_train };
    Ok((frame.slice(0..split_idx_train), frame.slice(split_idx_val..frame.len())))
}

fn split_at_timestamp(
    frames: &FrameMap,
    n_lags: usize,
    inputs_overbleed: bool,
    threshold: NaiveDateTime,
) -> (FrameMap, FrameMap) {
    let mut train = FrameMap::new();
    let mut valid = FrameMap::new();
    for (name, frame) in frames {
        let n_before = frame.ds().iter().filter(|d| **d < threshold).count();
        if n_before == frame.len() {
            train.insert(name.clone(), frame.clone());
        } else if n_before == 0 {
            valid.insert(name.clone(), frame.clone());
        } else {
            let start = if inputs_overbleed { n_before.saturating_sub(n_lags) } else { n_before };
            train.insert(name.clone(), frame.slice(0..n_before));
            valid.insert(name.clone(), frame.slice(start..frame.len()));
        }
    }
    (train, valid)
}

/// Split named frames into training and validation maps.
///
/// With `local_split`, every frame is split on its own by [`split_df`].
/// Otherwise one threshold timestamp is found on the merged dates of all
/// frames; rows before it train, rows from it on validate. Frames that lie
/// entirely on one side appear only in that map.
///
/// # Errors
///
/// Returns an error if a split leaves no training samples.
pub fn split_frames(
    frames: &FrameMap,
    n_lags: usize,
    n_forecasts: usize,
    valid_p: f64,
    inputs_overbleed: bool,
    local_split: bool,
) -> Result<(FrameMap, FrameMap)> {
    if local_split {
        let mut train = FrameMap::new();
        let mut valid = FrameMap::new();
        for (name, frame) in frames {
            let (t, v) = split_df(frame, n_lags, n_forecasts, valid_p, inputs_overbleed)?;
            train.insert(name.clone(), t);
            valid.insert(name.clone(), v);
        }
        return Ok((train, valid));
    }

    let merged = merge_unique_dates(frames);
    let (_, merged_valid) = split_df(&merged, n_lags, n_forecasts, valid_p, false)?;
    let threshold = merged_valid.first_date().ok_or(DataError::EmptyDataset)?;
    Ok(split_at_timestamp(frames, n_lags, inputs_overbleed, threshold))
}

/// Rolling-origin cross-validation folds, oldest first.
///
/// Each fold validates on `max(1, fold_pct * samples)` samples; consecutive
/// validation windows overlap by `fold_overlap_pct` of a fold.
///
/// # Errors
///
/// Returns an error if the overlap is not smaller than a fold, or if the
/// first fold would train on fewer samples than one fold validates.
pub fn crossvalidation_split_df(
    frame: &TimeSeriesFrame,
    n_lags: usize,
    n_forecasts: usize,
    k: usize,
    fold_pct: f64,
    fold_overlap_pct: f64,
) -> Result<Vec<TrainValid>> {
    if k == 0 {
        return Err(DataError::SplitError("k must be at least 1".to_string()));
    }
    let total = (frame.len() + 2) as i64 - n_lags as i64 - 2 * n_forecasts as i64;
    if total < 2 {
        return Err(DataError::InsufficientData(format!(
            "{} rows are too few for cross-validation",
            frame.len()
        )));
    }
    let samples_fold = ((fold_pct * total as f64) as i64).max(1);
    let samples_overlap = (fold_overlap_pct * samples_fold as f64) as i64;
    if samples_overlap >= samples_fold {
        return Err(DataError::SplitError(format!(
            "overlap of {samples_overlap} samples must be smaller than a fold of {samples_fold}"
        )));
    }
    let min_train = total - samples_fold - (k as i64 - 1) * (samples_fold - samples_overlap);
    if min_train < samples_fold {
        return Err(DataError::SplitError(format!(
            "first fold would train on {min_train} samples, fewer than the {samples_fold} it validates"
        )));
    }

    let mut folds = Vec::with_capacity(k);
    let mut fold_frame = frame.clone();
    for _ in 0..k {
        folds.push(split_df(&fold_frame, n_lags, n_forecasts, samples_fold as f64, true)?);
        let split_idx = fold_frame.len() - samples_fold as usize + samples_overlap as usize;
        fold_frame = fold_frame.slice(0..split_idx);
    }
    folds.reverse();
    Ok(folds)
}

/// Nested folds: validation folds for tuning and test folds for evaluation.
///
/// Test folds take `test_pct / k` of the samples each, without overlap.
/// Validation folds are cut from the training part of the oldest test fold.
///
/// # Errors
///
/// Returns an error if either set of folds cannot be formed.
pub fn double_crossvalidation_split_df(
    frame: &TimeSeriesFrame,
    n_lags: usize,
    n_forecasts: usize,
    k: usize,
    valid_pct: f64,
    test_pct: f64,
) -> Result<(Vec<TrainValid>, Vec<TrainValid>)> {
    if !(0.0..1.0).contains(&test_pct) {
        return Err(DataError::SplitError(format!("test_pct must be in [0, 1), got {test_pct}")));
    }
    let folds_test = crossvalidation_split_df(frame, n_lags, n_forecasts, k, test_pct / k as f64, 0.0)?;
    let train = &folds_test
        .first()
        .ok_or_else(|| DataError::SplitError("no test folds".to_string()))?
        .0;
    let fold_pct_val = valid_pct / k as f64 / (1.0 - test_pct);
    let folds_val = crossvalidation_split_df(train, n_lags, n_forecasts, k, fold_pct_val, 0.0)?;
    Ok((folds_val, folds_test))
}

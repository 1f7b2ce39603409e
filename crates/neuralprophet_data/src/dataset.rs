//! Windowed samples of a normalized frame.
//!
//! Sample `i` of a frame with `n_lags = L` and `n_forecasts = F` reads its
//! lag window from rows `i..i+L` and its targets from rows `i+L..i+L+F`,
//! so a frame of `n` rows yields `n - L + 1 - F` samples.

use std::collections::BTreeMap;

use ndarray::{concatenate, s, Array2, Array3, Axis};

use crate::error::{DataError, Result};
use crate::events::shifted_indicator;
use crate::features::fourier_features;
use crate::frame::TimeSeriesFrame;
use crate::layout::FeatureLayout;

/// Model inputs and targets of one or more normalized frames.
///
/// Every array has the sample dimension first. Feature groups are kept in
/// the order of the [`FeatureLayout`] they were built with.
#[derive(Debug, Clone)]
pub struct TimeDataset {
    layout: FeatureLayout,
    /// Normalized time of each target `(N, F)`.
    time: Array2<f32>,
    /// Fourier features per seasonality `(N, F, D)`.
    seasonalities: Vec<Array3<f32>>,
    /// Lagged `y_scaled` `(N, L)`.
    lags: Array2<f32>,
    /// Lagged covariate values per covariate `(N, L or 1)`.
    covariates: Vec<Array2<f32>>,
    /// Event window features per event `(N, F, offsets)`.
    events: Vec<Array3<f32>>,
    /// Future regressor values per regressor `(N, F)`.
    regressors: Vec<Array2<f32>>,
    /// `y_scaled` at the targets `(N, F)`.
    targets: Array2<f32>,
}

fn column_f32(frame: &TimeSeriesFrame, name: &str) -> Result<Vec<f32>> {
    Ok(frame.require(name)?.iter().map(|v| *v as f32).collect())
}

fn nan_error(what: &str, predict_mode: bool) -> DataError {
    if predict_mode {
        DataError::MissingData(format!("{what} contains NaN values; impute the data before predicting"))
    } else {
        DataError::MissingData(format!("{what} contains NaN values; impute the data before training"))
    }
}

impl TimeDataset {
    /// Build the samples of one normalized frame.
    ///
    /// The frame needs `t`, and `y_scaled` whenever lags are used or targets
    /// are needed. In `predict_mode`, missing targets become 0 and `y_scaled`
    /// may be absent for a model without lags.
    ///
    /// # Errors
    ///
    /// Returns an error if columns are missing, there are too few rows, or
    /// model inputs contain `NaN`.
    pub fn new(frame: &TimeSeriesFrame, layout: &FeatureLayout, predict_mode: bool) -> Result<Self> {
        let n_lags = layout.n_lags;
        let n_forecasts = layout.n_forecasts;
        if n_forecasts == 0 {
            return Err(DataError::InvalidInput("n_forecasts must be at least 1".to_string()));
        }
        let n = frame.len();
        if n_lags == 0 && !layout.covariates.is_empty() {
            return Err(DataError::InvalidInput("lagged covariates require n_lags > 0".to_string()));
        }
        if n < n_lags + n_forecasts {
            return Err(DataError::InsufficientData(format!(
                "{n} rows cannot form a sample with n_lags={n_lags} and n_forecasts={n_forecasts}"
            )));
        }
        let n_samples = n + 1 - n_lags - n_forecasts;

        let t = column_f32(frame, "t")?;
        let y_scaled = match frame.column("y_scaled") {
            Some(_) => Some(column_f32(frame, "y_scaled")?),
            None if predict_mode && n_lags == 0 => None,
            None => return Err(DataError::MissingColumn("y_scaled".to_string())),
        };

        let target_rows = |i: usize| (i + n_lags)..(i + n_lags + n_forecasts);

        let time = Array2::from_shape_fn((n_samples, n_forecasts), |(i, f)| t[i + n_lags + f]);

        let mut targets = Array2::<f32>::zeros((n_samples, n_forecasts));
        if let Some(y) = &y_scaled {
            for i in 0..n_samples {
                for (f, row) in target_rows(i).enumerate() {
                    let v = y[row];
                    if v.is_nan() {
                        if !predict_mode {
                            return Err(nan_error("target y", false));
                        }
                    } else {
                        targets[[i, f]] = v;
                    }
                }
            }
        }

        let mut lags = Array2::<f32>::zeros((n_samples, n_lags));
        if n_lags > 0 {
            let y = y_scaled.as_ref().ok_or_else(|| DataError::MissingColumn("y_scaled".to_string()))?;
            for i in 0..n_samples {
                for l in 0..n_lags {
                    let v = y[i + l];
                    if v.is_nan() {
                        return Err(nan_error("lagged y", predict_mode));
                    }
                    lags[[i, l]] = v;
                }
            }
        }

        let seasonalities = layout
            .seasonalities
            .iter()
            .map(|season| {
                let per_row = fourier_features(frame.ds(), season.period, season.fourier_order);
                Array3::from_shape_fn((n_samples, n_forecasts, season.dims()), |(i, f, d)| {
                    per_row[[i + n_lags + f, d]]
                })
            })
            .collect();

        let covariates = layout
            .covariates
            .iter()
            .map(|cov| {
                let values = column_f32(frame, &cov.name)?;
                let width = layout.covariate_inputs(cov);
                let offset = n_lags - width;
                let arr = Array2::from_shape_fn((n_samples, width), |(i, l)| values[i + offset + l]);
                if arr.iter().any(|v| v.is_nan()) {
                    return Err(nan_error(&format!("covariate {}", cov.name), predict_mode));
                }
                Ok(arr)
            })
            .collect::<Result<Vec<_>>>()?;

        let events = layout
            .events
            .iter()
            .map(|event| {
                let indicator: Vec<f64> = frame
                    .column(&event.name)
                    .map_or_else(|| vec![0.0; n], |v| v.iter().map(|x| if x.is_nan() { 0.0 } else { *x }).collect());
                let shifted: Vec<Vec<f64>> = event
                    .offsets()
                    .into_iter()
                    .map(|o| shifted_indicator(&indicator, o))
                    .collect();
                Array3::from_shape_fn((n_samples, n_forecasts, shifted.len()), |(i, f, w)| {
                    shifted[w][i + n_lags + f] as f32
                })
            })
            .collect();

        let regressors = layout
            .regressors
            .iter()
            .map(|reg| {
                let values = column_f32(frame, &reg.name)?;
                let arr = Array2::from_shape_fn((n_samples, n_forecasts), |(i, f)| values[i + n_lags + f]);
                if arr.iter().any(|v| v.is_nan()) {
                    return Err(nan_error(&format!("regressor {}", reg.name), predict_mode));
                }
                Ok(arr)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            layout: layout.clone(),
            time,
            seasonalities,
            lags,
            covariates,
            events,
            regressors,
            targets,
        })
    }

    /// Build and stack the samples of several frames.
    ///
    /// # Errors
    ///
    /// Returns an error if any frame fails [`TimeDataset::new`] or no frames are given.
    pub fn from_frames(
        frames: &BTreeMap<String, TimeSeriesFrame>,
        layout: &FeatureLayout,
        predict_mode: bool,
    ) -> Result<Self> {
        let parts = frames
            .values()
            .map(|frame| Self::new(frame, layout, predict_mode))
            .collect::<Result<Vec<_>>>()?;
        Self::concat(parts)
    }

    /// Stack datasets built with the same layout.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty input or mismatched layouts.
    pub fn concat(parts: Vec<Self>) -> Result<Self> {
        let mut iter = parts.into_iter();
        let first = iter.next().ok_or(DataError::EmptyDataset)?;
        iter.try_fold(first, |acc, next| acc.append(next))
    }

    fn append(self, other: Self) -> Result<Self> {
        if self.layout != other.layout {
            return Err(DataError::InvalidInput("cannot stack datasets with different layouts".to_string()));
        }
        let cat2 = |a: Array2<f32>, b: Array2<f32>| {
            concatenate(Axis(0), &[a.view(), b.view()]).map_err(|e| DataError::InvalidShape(e.to_string()))
        };
        let cat3 = |a: Array3<f32>, b: Array3<f32>| {
            concatenate(Axis(0), &[a.view(), b.view()]).map_err(|e| DataError::InvalidShape(e.to_string()))
        };
        let zip2 = |a: Vec<Array2<f32>>, b: Vec<Array2<f32>>| {
            a.into_iter().zip(b).map(|(x, y)| cat2(x, y)).collect::<Result<Vec<_>>>()
        };
        let zip3 = |a: Vec<Array3<f32>>, b: Vec<Array3<f32>>| {
            a.into_iter().zip(b).map(|(x, y)| cat3(x, y)).collect::<Result<Vec<_>>>()
        };
        Ok(Self {
            layout: self.layout,
            time: cat2(self.time, other.time)?,
            seasonalities: zip3(self.seasonalities, other.seasonalities)?,
            lags: cat2(self.lags, other.lags)?,
            covariates: zip2(self.covariates, other.covariates)?,
            events: zip3(self.events, other.events)?,
            regressors: zip2(self.regressors, other.regressors)?,
            targets: cat2(self.targets, other.targets)?,
        })
    }

    /// Get the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.time.nrows()
    }

    /// Check if the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The layout the samples follow.
    #[must_use]
    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    /// Normalized target times `(N, F)`.
    #[must_use]
    pub fn time(&self) -> &Array2<f32> {
        &self.time
    }

    /// Seasonal features, one `(N, F, D)` array per seasonality.
    #[must_use]
    pub fn seasonalities(&self) -> &[Array3<f32>] {
        &self.seasonalities
    }

    /// Lagged values `(N, L)`.
    #[must_use]
    pub fn lags(&self) -> &Array2<f32> {
        &self.lags
    }

    /// Covariate inputs, one array per covariate.
    #[must_use]
    pub fn covariates(&self) -> &[Array2<f32>] {
        &self.covariates
    }

    /// Event features, one `(N, F, offsets)` array per event.
    #[must_use]
    pub fn events(&self) -> &[Array3<f32>] {
        &self.events
    }

    /// Regressor values, one `(N, F)` array per regressor.
    #[must_use]
    pub fn regressors(&self) -> &[Array2<f32>] {
        &self.regressors
    }

    /// Targets `(N, F)`.
    #[must_use]
    pub fn targets(&self) -> &Array2<f32> {
        &self.targets
    }

    /// Copy of the first `n` samples.
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            layout: self.layout.clone(),
            time: self.time.slice(s![..n, ..]).to_owned(),
            seasonalities: self.seasonalities.iter().map(|a| a.slice(s![..n, .., ..]).to_owned()).collect(),
            lags: self.lags.slice(s![..n, ..]).to_owned(),
            covariates: self.covariates.iter().map(|a| a.slice(s![..n, ..]).to_owned()).collect(),
            events: self.events.iter().map(|a| a.slice(s![..n, .., ..]).to_owned()).collect(),
            regressors: self.regressors.iter().map(|a| a.slice(s![..n, ..]).to_owned()).collect(),
            targets: self.targets.slice(s![..n, ..]).to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::daily_frame;
    use crate::layout::{ComponentMode, CovariateSpec, EventSpec, RegressorSpec, SeasonalitySpec};
    use crate::normalize::{normalize, DataParams, NormalizeMode};

    fn prepared(y: &[f64]) -> TimeSeriesFrame {
        let frame = daily_frame((2024, 1, 1), y);
        let params = DataParams::fit(&frame, &[("y".to_string(), NormalizeMode::Off)]).unwrap();
        normalize(&frame, &params).unwrap()
    }

    #[test]
    fn test_windows_with_lags() {
        let y: Vec<f64> = (0..10).map(f64::from).collect();
        let frame = prepared(&y);
        let ds = TimeDataset::new(&frame, &FeatureLayout::new(3, 2), false).unwrap();
        assert_eq!(ds.len(), 10 - 3 + 1 - 2);
        assert_eq!(ds.lags().row(0).to_vec(), vec![0.0, 1.0, 2.0]);
        assert_eq!(ds.targets().row(0).to_vec(), vec![3.0, 4.0]);
        assert_eq!(ds.targets().row(5).to_vec(), vec![8.0, 9.0]);
        assert!((ds.time()[[0, 0]] - 3.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_one_sample_per_row_without_lags() {
        let frame = prepared(&[1.0, 2.0, 3.0]);
        let ds = TimeDataset::new(&frame, &FeatureLayout::new(0, 1), false).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.lags().shape(), &[3, 0]);
    }

    #[test]
    fn test_predict_mode_allows_future_targets() {
        let frame = prepared(&[1.0, 2.0, 3.0, f64::NAN, f64::NAN]);
        let layout = FeatureLayout::new(3, 2);
        assert!(TimeDataset::new(&frame, &layout, false).is_err());
        let ds = TimeDataset::new(&frame, &layout, true).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.targets().row(0).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_insufficient_rows() {
        let frame = prepared(&[1.0, 2.0]);
        assert!(matches!(
            TimeDataset::new(&frame, &FeatureLayout::new(2, 1), false),
            Err(DataError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_exogenous_features() {
        let y: Vec<f64> = (0..6).map(f64::from).collect();
        let frame = prepared(&y)
            .with_column("promo", vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0])
            .unwrap()
            .with_column("temp", vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0])
            .unwrap()
            .with_column("price", vec![1.0; 6])
            .unwrap();
        let layout = FeatureLayout {
            n_lags: 2,
            n_forecasts: 1,
            seasonalities: vec![SeasonalitySpec {
                name: "weekly".to_string(),
                period: 7.0,
                fourier_order: 2,
            }],
            events: vec![EventSpec {
                name: "promo".to_string(),
                lower_window: 0,
                upper_window: 1,
                mode: ComponentMode::Additive,
            }],
            regressors: vec![RegressorSpec {
                name: "price".to_string(),
                mode: ComponentMode::Multiplicative,
            }],
            covariates: vec![CovariateSpec {
                name: "temp".to_string(),
                only_last_value: true,
            }],
        };
        let ds = TimeDataset::new(&frame, &layout, false).unwrap();
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.seasonalities()[0].shape(), &[4, 1, 4]);
        // Sample 0 targets row 2, the event day; sample 1 the day after.
        assert_eq!(ds.events()[0].slice(s![0, 0, ..]).to_vec(), vec![1.0, 0.0]);
        assert_eq!(ds.events()[0].slice(s![1, 0, ..]).to_vec(), vec![0.0, 1.0]);
        assert_eq!(ds.covariates()[0].row(0).to_vec(), vec![11.0]);
        assert_eq!(ds.regressors()[0].shape(), &[4, 1]);
    }

    #[test]
    fn test_concat_frames() {
        let mut frames = BTreeMap::new();
        frames.insert("a".to_string(), prepared(&[1.0, 2.0, 3.0, 4.0]));
        frames.insert("b".to_string(), prepared(&[5.0, 6.0, 7.0]));
        let ds = TimeDataset::from_frames(&frames, &FeatureLayout::new(1, 1), false).unwrap();
        assert_eq!(ds.len(), 3 + 2);
        assert_eq!(ds.head(2).len(), 2);
    }
}

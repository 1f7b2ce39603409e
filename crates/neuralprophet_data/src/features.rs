//! Fourier features for seasonalities.

use std::f64::consts::PI;

use chrono::NaiveDateTime;
use ndarray::Array2;

/// Days since the Unix epoch.
#[must_use]
pub fn days_since_epoch(ds: NaiveDateTime) -> f64 {
    ds.and_utc().timestamp() as f64 / 86_400.0
}

/// Fourier basis of a seasonality with `period` days.
///
/// Row `i` holds `sin(2πk·d_i/period)` for `k = 1..=order`, followed by the
/// matching cosines, where `d_i` is the date in days since the epoch.
#[must_use]
pub fn fourier_features(ds: &[NaiveDateTime], period: f64, order: usize) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((ds.len(), 2 * order));
    for (i, date) in ds.iter().enumerate() {
        let d = days_since_epoch(*date);
        for k in 0..order {
            let x = 2.0 * PI * (k + 1) as f64 * d / period;
            out[[i, k]] = x.sin() as f32;
            out[[i, order + k]] = x.cos() as f32;
        }
    }
    out
}

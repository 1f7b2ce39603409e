//! Description of the model inputs built from a frame.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::DataError;

/// How a component combines with the trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComponentMode {
    /// Added to the forecast.
    #[default]
    Additive,
    /// Scales the trend.
    Multiplicative,
}

impl FromStr for ComponentMode {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, DataError> {
        match s.to_lowercase().as_str() {
            "additive" => Ok(Self::Additive),
            "multiplicative" => Ok(Self::Multiplicative),
            other => Err(DataError::InvalidInput(format!(
                "mode must be \"additive\" or \"multiplicative\", got {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for ComponentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Additive => write!(f, "additive"),
            Self::Multiplicative => write!(f, "multiplicative"),
        }
    }
}

/// One Fourier seasonality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalitySpec {
    /// Seasonality name (`yearly`, `weekly`, `daily` or custom).
    pub name: String,
    /// Period in days.
    pub period: f64,
    /// Number of Fourier pairs.
    pub fourier_order: usize,
}

impl SeasonalitySpec {
    /// Number of feature columns (`sin` and `cos` per order).
    #[must_use]
    pub fn dims(&self) -> usize {
        2 * self.fourier_order
    }
}

/// One user event with its window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    /// Event name, also the indicator column name.
    pub name: String,
    /// Days before the event that are affected (`<= 0`).
    pub lower_window: i32,
    /// Days after the event that are affected (`>= 0`).
    pub upper_window: i32,
    /// Component mode.
    pub mode: ComponentMode,
}

impl EventSpec {
    /// Window offsets from `lower_window` to `upper_window`.
    #[must_use]
    pub fn offsets(&self) -> Vec<i32> {
        (self.lower_window..=self.upper_window).collect()
    }

    /// Feature names of all offsets.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.offsets()
            .into_iter()
            .map(|o| event_offset_name(&self.name, o))
            .collect()
    }
}

/// Feature name of an event offset: `event_<name>`, `event_<name>_+1`, `event_<name>_-1`.
#[must_use]
pub fn event_offset_name(event: &str, offset: i32) -> String {
    match offset {
        0 => format!("event_{event}"),
        o if o > 0 => format!("event_{event}_+{o}"),
        o => format!("event_{event}_{o}"),
    }
}

/// A regressor known in the future.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressorSpec {
    /// Column name.
    pub name: String,
    /// Component mode.
    pub mode: ComponentMode,
}

/// A lagged covariate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovariateSpec {
    /// Column name.
    pub name: String,
    /// Feed only the most recent value instead of `n_lags` values.
    pub only_last_value: bool,
}

/// Everything the dataset needs to turn a frame into model inputs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureLayout {
    /// Lagged `y` inputs.
    pub n_lags: usize,
    /// Forecast steps per sample.
    pub n_forecasts: usize,
    /// Seasonalities in model order.
    pub seasonalities: Vec<SeasonalitySpec>,
    /// Events in model order.
    pub events: Vec<EventSpec>,
    /// Future regressors in model order.
    pub regressors: Vec<RegressorSpec>,
    /// Lagged covariates in model order.
    pub covariates: Vec<CovariateSpec>,
}

impl FeatureLayout {
    /// A layout with only lags and horizon.
    #[must_use]
    pub fn new(n_lags: usize, n_forecasts: usize) -> Self {
        Self {
            n_lags,
            n_forecasts,
            ..Self::default()
        }
    }

    /// Inputs per sample of a covariate.
    #[must_use]
    pub fn covariate_inputs(&self, covariate: &CovariateSpec) -> usize {
        if covariate.only_last_value {
            1
        } else {
            self.n_lags
        }
    }

    /// Names of the frame columns the layout reads besides `y`.
    #[must_use]
    pub fn exogenous_columns(&self) -> Vec<String> {
        self.covariates
            .iter()
            .map(|c| c.name.clone())
            .chain(self.events.iter().map(|e| e.name.clone()))
            .chain(self.regressors.iter().map(|r| r.name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_feature_names() {
        let spec = EventSpec {
            name: "launch".to_string(),
            lower_window: -1,
            upper_window: 1,
            mode: ComponentMode::Additive,
        };
        assert_eq!(
            spec.feature_names(),
            vec!["event_launch_-1", "event_launch", "event_launch_+1"]
        );
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Multiplicative".parse::<ComponentMode>().unwrap(), ComponentMode::Multiplicative);
        assert!("both".parse::<ComponentMode>().is_err());
    }
}

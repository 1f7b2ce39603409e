//! Configuration of the auto-regression and the exogenous inputs.

use neuralprophet_data::{ComponentMode, NormalizeMode};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Turn a user regularization strength into a penalty weight.
///
/// Negative values are rejected; 0 means no penalty.
///
/// # Errors
///
/// Returns an error for a negative value.
pub fn regularization_lambda(regularization: Option<f64>) -> Result<Option<f64>> {
    match regularization {
        Some(r) if r < 0.0 => Err(ModelError::InvalidConfig("regularization must be >= 0".to_string())),
        Some(r) if r == 0.0 => Ok(None),
        other => Ok(other),
    }
}

/// Auto-regression on lagged `y` and the shape of its net.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArConfig {
    /// Number of lagged values fed to the net.
    pub n_lags: usize,
    /// Hidden layers of the net; 0 gives a linear AR model.
    pub num_hidden_layers: usize,
    /// Width of the hidden layers; defaults to `n_lags + n_forecasts`.
    pub d_hidden: Option<usize>,
    /// Sparsity penalty on the AR weights.
    pub ar_reg: Option<f64>,
}

impl Default for ArConfig {
    fn default() -> Self {
        Self {
            n_lags: 0,
            num_hidden_layers: 0,
            d_hidden: None,
            ar_reg: None,
        }
    }
}

impl ArConfig {
    /// Penalty weight on the AR weights: `1e-4 * ar_reg`.
    #[must_use]
    pub fn reg_lambda(&self) -> Option<f64> {
        self.ar_reg.filter(|r| *r > 0.0).map(|r| 1e-4 * r)
    }

    /// Width of the hidden layers for a model with `n_forecasts` outputs.
    #[must_use]
    pub fn hidden_width(&self, n_forecasts: usize) -> usize {
        self.d_hidden.unwrap_or(self.n_lags + n_forecasts)
    }

    /// Check the penalty.
    ///
    /// # Errors
    ///
    /// Returns an error for a negative `ar_reg`.
    pub fn validate(&self) -> Result<()> {
        if self.ar_reg.is_some_and(|r| r < 0.0) {
            return Err(ModelError::InvalidConfig("ar_reg must be >= 0".to_string()));
        }
        Ok(())
    }
}

/// A lagged covariate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovariateConfig {
    /// Column name.
    pub name: String,
    /// Penalty weight on the covariate net's input weights.
    pub reg_lambda: Option<f64>,
    /// Normalization of the column.
    pub normalize: NormalizeMode,
    /// Use only the most recent value instead of `n_lags` values.
    pub only_last_value: bool,
}

/// A regressor whose future values are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressorConfig {
    /// Column name.
    pub name: String,
    /// Penalty weight on the coefficient.
    pub reg_lambda: Option<f64>,
    /// Normalization of the column.
    pub normalize: NormalizeMode,
    /// Additive or multiplicative effect.
    pub mode: ComponentMode,
}

/// A user event with a window of affected days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Event name.
    pub name: String,
    /// First affected day relative to the event (`<= 0`).
    pub lower_window: i32,
    /// Last affected day relative to the event (`>= 0`).
    pub upper_window: i32,
    /// Penalty weight on the coefficients.
    pub reg_lambda: Option<f64>,
    /// Additive or multiplicative effect.
    pub mode: ComponentMode,
}

impl EventConfig {
    /// Check the window.
    ///
    /// # Errors
    ///
    /// Returns an error if `lower_window > 0` or `upper_window < 0`.
    pub fn validate(&self) -> Result<()> {
        if self.lower_window > 0 {
            return Err(ModelError::InvalidConfig(format!(
                "lower_window of event {:?} must be <= 0",
                self.name
            )));
        }
        if self.upper_window < 0 {
            return Err(ModelError::InvalidConfig(format!(
                "upper_window of event {:?} must be >= 0",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regularization_lambda() {
        assert_eq!(regularization_lambda(None).unwrap(), None);
        assert_eq!(regularization_lambda(Some(0.0)).unwrap(), None);
        assert_eq!(regularization_lambda(Some(0.5)).unwrap(), Some(0.5));
        assert!(regularization_lambda(Some(-1.0)).is_err());
    }

    #[test]
    fn test_ar_defaults() {
        let ar = ArConfig {
            n_lags: 5,
            ar_reg: Some(2.0),
            ..Default::default()
        };
        assert_eq!(ar.hidden_width(3), 8);
        assert!((ar.reg_lambda().unwrap() - 2e-4).abs() < 1e-15);
        assert_eq!(ArConfig::default().reg_lambda(), None);
    }

    #[test]
    fn test_event_window() {
        let event = EventConfig {
            name: "launch".to_string(),
            lower_window: 1,
            upper_window: 0,
            reg_lambda: None,
            mode: ComponentMode::Additive,
        };
        assert!(event.validate().is_err());
    }
}

//! Seasonality configuration and automatic selection.

use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use neuralprophet_data::{ComponentMode, SeasonalitySpec};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// How a built-in seasonality is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeasonArg {
    /// Enabled when the history is long and fine enough.
    #[default]
    Auto,
    /// Always enabled with the default Fourier order.
    Enabled,
    /// Never enabled.
    Disabled,
    /// Always enabled with this Fourier order; 0 disables.
    Order(usize),
}

impl FromStr for SeasonArg {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "true" | "on" => Ok(Self::Enabled),
            "false" | "off" => Ok(Self::Disabled),
            other => other
                .parse::<usize>()
                .map(Self::Order)
                .map_err(|_| ModelError::InvalidConfig(format!("invalid seasonality argument {other:?}"))),
        }
    }
}

/// Built-in seasonalities: name, period in days, default Fourier order.
pub const BUILTIN_SEASONALITIES: [(&str, f64, usize); 3] =
    [("yearly", 365.25, 6), ("weekly", 7.0, 4), ("daily", 1.0, 6)];

/// All seasonalities of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalityConfig {
    /// Mode shared by all seasonalities.
    pub mode: ComponentMode,
    /// Penalty on Fourier coefficients; 0 disables.
    pub reg_lambda: f64,
    /// Yearly seasonality.
    pub yearly: SeasonArg,
    /// Weekly seasonality.
    pub weekly: SeasonArg,
    /// Daily seasonality.
    pub daily: SeasonArg,
    /// User seasonalities, always enabled.
    pub custom: Vec<SeasonalitySpec>,
}

impl Default for SeasonalityConfig {
    fn default() -> Self {
        Self {
            mode: ComponentMode::Additive,
            reg_lambda: 0.0,
            yearly: SeasonArg::Auto,
            weekly: SeasonArg::Auto,
            daily: SeasonArg::Auto,
            custom: Vec::new(),
        }
    }
}

impl SeasonalityConfig {
    /// Add a user seasonality.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-positive period or order.
    pub fn add_custom(&mut self, name: &str, period: f64, fourier_order: usize) -> Result<()> {
        if fourier_order == 0 {
            return Err(ModelError::InvalidConfig("Fourier order must be > 0".to_string()));
        }
        if !(period > 0.0) {
            return Err(ModelError::InvalidConfig(format!("period must be > 0, got {period}")));
        }
        self.custom.retain(|s| s.name != name);
        self.custom.push(SeasonalitySpec {
            name: name.to_string(),
            period,
            fourier_order,
        });
        Ok(())
    }

    fn arg(&self, name: &str) -> SeasonArg {
        match name {
            "yearly" => self.yearly,
            "weekly" => self.weekly,
            _ => self.daily,
        }
    }

    /// Seasonalities to model for a training history with these dates.
    ///
    /// Auto rules: yearly needs two years of history; weekly needs two weeks
    /// and a step below one week; daily needs two days and a step below one
    /// day. Custom seasonalities follow the built-ins.
    #[must_use]
    pub fn resolve(&self, ds: &[NaiveDateTime]) -> Vec<SeasonalitySpec> {
        let mut dates = ds.to_vec();
        dates.sort_unstable();
        let span = match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => *last - *first,
            _ => Duration::zero(),
        };
        let min_step = dates
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|d| *d > Duration::zero())
            .min()
            .unwrap_or_else(Duration::zero);

        let auto_disable = |name: &str| match name {
            "yearly" => span < Duration::days(730),
            "weekly" => span < Duration::weeks(2) || min_step >= Duration::weeks(1),
            _ => span < Duration::days(2) || min_step >= Duration::days(1),
        };

        let mut out = Vec::new();
        for (name, period, default_order) in BUILTIN_SEASONALITIES {
            let order = match self.arg(name) {
                SeasonArg::Auto if auto_disable(name) => {
                    tracing::info!(
                        "Disabling {name} seasonality. Run NeuralProphet with {name}_seasonality=true to override this."
                    );
                    0
                }
                SeasonArg::Auto | SeasonArg::Enabled => default_order,
                SeasonArg::Disabled => 0,
                SeasonArg::Order(n) => n,
            };
            if order > 0 {
                out.push(SeasonalitySpec {
                    name: name.to_string(),
                    period,
                    fourier_order: order,
                });
            }
        }
        out.extend(self.custom.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dates(n: i64, step: Duration) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        (0..n).map(|i| start + step * i as i32).collect()
    }

    fn names(specs: &[SeasonalitySpec]) -> Vec<&str> {
        specs.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_auto_daily_data() {
        let config = SeasonalityConfig::default();
        assert_eq!(names(&config.resolve(&dates(60, Duration::days(1)))), vec!["weekly"]);
        assert_eq!(
            names(&config.resolve(&dates(800, Duration::days(1)))),
            vec!["yearly", "weekly"]
        );
    }

    #[test]
    fn test_auto_hourly_data() {
        let config = SeasonalityConfig::default();
        assert_eq!(names(&config.resolve(&dates(24 * 20, Duration::hours(1)))), vec!["weekly", "daily"]);
    }

    #[test]
    fn test_explicit_args_and_custom() {
        let mut config = SeasonalityConfig {
            yearly: SeasonArg::Order(3),
            weekly: SeasonArg::Disabled,
            daily: SeasonArg::Disabled,
            ..Default::default()
        };
        config.add_custom("monthly", 30.5, 5).unwrap();
        let specs = config.resolve(&dates(10, Duration::days(1)));
        assert_eq!(names(&specs), vec!["yearly", "monthly"]);
        assert_eq!(specs[0].fourier_order, 3);
        assert!(config.add_custom("bad", 7.0, 0).is_err());
    }

    #[test]
    fn test_parse_arg() {
        assert_eq!("auto".parse::<SeasonArg>().unwrap(), SeasonArg::Auto);
        assert_eq!("False".parse::<SeasonArg>().unwrap(), SeasonArg::Disabled);
        assert_eq!("8".parse::<SeasonArg>().unwrap(), SeasonArg::Order(8));
        assert!("sometimes".parse::<SeasonArg>().is_err());
    }
}

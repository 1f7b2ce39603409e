//! Terminal charts of forecasts, components and parameters.
//!
//! Charts are rendered into a `String` of box-drawing characters so they
//! can be printed, logged or written to a file.

use std::fmt::Write as _;

use neuralprophet_data::TimeSeriesFrame;

use crate::error::{Result, TrainError};

/// Default chart width in characters.
pub const DEFAULT_WIDTH: usize = 60;
/// Default chart height in characters.
pub const DEFAULT_HEIGHT: usize = 12;

const GLYPHS: [char; 6] = ['█', '•', '+', 'x', 'o', '*'];

/// A chart of one or more series sharing the x axis.
#[derive(Debug, Clone)]
pub struct Chart {
    title: String,
    width: usize,
    height: usize,
    x_label: String,
    series: Vec<(String, Vec<f64>, char)>,
}

impl Chart {
    /// Empty chart with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            x_label: String::new(),
            series: Vec::new(),
        }
    }

    /// Set the plot area size in characters.
    #[must_use]
    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.width = width.max(20);
        self.height = height.max(5);
        self
    }

    /// Set the label below the x axis.
    #[must_use]
    pub fn with_x_label(mut self, label: impl Into<String>) -> Self {
        self.x_label = label.into();
        self
    }

    /// Add a series; `NaN` values are left blank.
    #[must_use]
    pub fn with_series(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        let glyph = GLYPHS[self.series.len() % GLYPHS.len()];
        self.series.push((name.into(), values, glyph));
        self
    }

    /// Render the chart. Later series are drawn over earlier ones.
    pub fn render(&self) -> String {
        let finite = || {
            self.series
                .iter()
                .flat_map(|(_, v, _)| v.iter().copied())
                .filter(|v| v.is_finite())
        };
        let min_val = finite().fold(f64::INFINITY, f64::min);
        let max_val = finite().fold(f64::NEG_INFINITY, f64::max);
        let n_points = self.series.iter().map(|(_, v, _)| v.len()).max().unwrap_or(0);

        let mut output = String::new();
        let header_remaining = self.width.saturating_sub(self.title.chars().count() + 4);
        let _ = writeln!(output, "┌─ {} {}┐", self.title, "─".repeat(header_remaining + 9));
        if !min_val.is_finite() {
            let _ = writeln!(output, "│ no data{}│", " ".repeat(self.width));
            let _ = writeln!(output, "└{}┘", "─".repeat(self.width + 8));
            return output;
        }
        let range = (max_val - min_val).max(1e-9);

        let mut grid = vec![vec![' '; self.width]; self.height];
        for (_, values, glyph) in &self.series {
            for (col, cell) in (0..self.width).map(|c| (c, c * n_points / self.width)) {
                let Some(v) = values.get(cell).filter(|v| v.is_finite()) else {
                    continue;
                };
                let normalized = (v - min_val) / range;
                let row = (((1.0 - normalized) * (self.height - 1) as f64).round() as usize).min(self.height - 1);
                grid[row][col] = *glyph;
            }
        }

        for (i, row) in grid.iter().enumerate() {
            let label = if i == 0 {
                format!("{max_val:>7.3}")
            } else if i == self.height - 1 {
                format!("{min_val:>7.3}")
            } else {
                " ".repeat(7)
            };
            let _ = writeln!(output, "│{label} {}│", row.iter().collect::<String>());
        }
        let _ = writeln!(output, "└{}┘", "─".repeat(self.width + 8));

        if !self.x_label.is_empty() {
            let _ = writeln!(output, "        {}", self.x_label);
        }
        if self.series.len() > 1 {
            let legend: Vec<String> = self.series.iter().map(|(n, _, g)| format!("{g} {n}")).collect();
            let _ = writeln!(output, "        {}", legend.join("   "));
        }
        output
    }
}

/// Chart of one series against its index, as used for live loss plots.
pub fn line_chart(name: &str, values: &[f64], width: usize, height: usize) -> String {
    Chart::new(name)
        .with_size(width, height)
        .with_x_label(format!("Epochs: 1 → {}", values.len()))
        .with_series(name, values.to_vec())
        .render()
}

fn date_label(frame: &TimeSeriesFrame) -> String {
    match (frame.first_date(), frame.last_date()) {
        (Some(first), Some(last)) => format!("ds: {first} → {last}"),
        _ => "ds".to_string(),
    }
}

fn yhat_columns(frame: &TimeSeriesFrame) -> Vec<String> {
    let mut cols: Vec<(usize, String)> = frame
        .column_names()
        .filter_map(|c| c.strip_prefix("yhat").and_then(|n| n.parse().ok()).map(|n: usize| (n, c.to_string())))
        .collect();
    cols.sort();
    cols.into_iter().map(|(_, c)| c).collect()
}

/// Actual values and forecasts of a `predict` output.
///
/// With `highlight` only `yhat<highlight>` is drawn, otherwise every step.
///
/// # Errors
///
/// Returns an error if the frame has no `yhat` columns.
pub fn plot_forecast(forecast: &TimeSeriesFrame, highlight: Option<usize>) -> Result<String> {
    let yhats = yhat_columns(forecast);
    if yhats.is_empty() {
        return Err(TrainError::InvalidInput("forecast has no yhat columns".to_string()));
    }
    let mut chart = Chart::new("Forecast").with_x_label(date_label(forecast));
    if let Some(y) = forecast.column("y") {
        chart = chart.with_series("y", y.to_vec());
    }
    for name in yhats {
        if highlight.is_some_and(|h| name != format!("yhat{h}")) {
            continue;
        }
        let values = forecast.require(&name)?.to_vec();
        chart = chart.with_series(name, values);
    }
    Ok(chart.render())
}

/// The most recent forecast, one line per forecast origin.
///
/// Origin `j` (0 = latest) predicts row `len - n_forecasts + k - j` with
/// `yhat<k + 1>`.
///
/// # Errors
///
/// Returns an error if the frame lacks `yhat` columns for `n_forecasts` steps.
pub fn plot_last_forecast(
    forecast: &TimeSeriesFrame,
    n_forecasts: usize,
    include_previous_forecasts: usize,
) -> Result<String> {
    let n = forecast.len();
    let mut chart = Chart::new("Last forecast").with_x_label(date_label(forecast));
    if let Some(y) = forecast.column("y") {
        chart = chart.with_series("y", y.to_vec());
    }
    for j in 0..=include_previous_forecasts {
        let mut line = vec![f64::NAN; n];
        for k in 0..n_forecasts {
            let Some(row) = (n + k).checked_sub(n_forecasts + j) else {
                continue;
            };
            if row < n {
                line[row] = forecast.require(&format!("yhat{}", k + 1))?[row];
            }
        }
        let name = if j == 0 { "latest".to_string() } else { format!("origin -{j}") };
        chart = chart.with_series(name, line);
    }
    Ok(chart.render())
}

/// One chart per component column.
///
/// Lagged components are drawn for the `highlight` step (or step 1).
pub fn plot_components(forecast: &TimeSeriesFrame, components: &[String], highlight: Option<usize>) -> String {
    let step = highlight.unwrap_or(1);
    let mut out = String::new();
    for name in components {
        let values = forecast
            .column(name)
            .or_else(|| forecast.column(&format!("{name}{step}")));
        if let Some(values) = values {
            out.push_str(&Chart::new(name.as_str()).with_series(name.as_str(), values.to_vec()).render());
            out.push('\n');
        }
    }
    out
}

/// Bar listing of named coefficients.
pub fn coefficient_table(title: &str, coefficients: &[(String, f64)]) -> String {
    let mut out = format!("{title}\n");
    let max_abs = coefficients
        .iter()
        .map(|(_, v)| v.abs())
        .fold(0.0_f64, f64::max)
        .max(1e-12);
    let name_width = coefficients.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
    for (name, value) in coefficients {
        let bar = ((value.abs() / max_abs) * 30.0).round() as usize;
        let sign = if *value < 0.0 { '-' } else { '+' };
        let _ = writeln!(out, "  {name:<name_width$} {value:>10.4} {sign}{}", "█".repeat(bar));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn frame(n: usize) -> TimeSeriesFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let ds = (0..n).map(|i| start + Duration::days(i as i64)).collect();
        let y: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut yhat1 = y.clone();
        yhat1[0] = f64::NAN;
        TimeSeriesFrame::from_series(ds, y)
            .unwrap()
            .with_column("yhat1", yhat1)
            .unwrap()
    }

    #[test]
    fn test_line_chart_dimensions() {
        let chart = line_chart("loss", &[3.0, 2.0, 1.5, 1.0], 30, 6);
        let lines: Vec<&str> = chart.lines().collect();
        assert!(lines[0].contains("loss"));
        // header, 6 grid rows, footer, x label
        assert_eq!(lines.len(), 9);
        assert!(lines[1].contains("3.000"));
        assert!(lines[6].contains("1.000"));
    }

    #[test]
    fn test_chart_without_data() {
        let chart = Chart::new("empty").with_series("a", vec![f64::NAN]).render();
        assert!(chart.contains("no data"));
    }

    #[test]
    fn test_plot_forecast() {
        let out = plot_forecast(&frame(10), None).unwrap();
        assert!(out.contains("yhat1"));
        assert!(plot_forecast(&TimeSeriesFrame::from_series(vec![], vec![]).unwrap(), None).is_err());
    }

    #[test]
    fn test_coefficient_table() {
        let out = coefficient_table("Events", &[("a".to_string(), 1.0), ("b".to_string(), -0.5)]);
        assert!(out.contains("-███████████████"));
        assert_eq!(out.lines().count(), 3);
    }
}

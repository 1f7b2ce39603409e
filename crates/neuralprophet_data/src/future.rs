//! Frames of future dates to forecast on.

use chrono::NaiveDateTime;
use neuralprophet_core::Frequency;

use crate::error::{DataError, Result};
use crate::events::convert_events_to_features;
use crate::frame::{EventsFrame, TimeSeriesFrame};

/// Inputs known about the future.
#[derive(Debug, Clone, Copy, Default)]
pub struct FutureInputs<'a> {
    /// Names of configured events.
    pub event_names: &'a [String],
    /// Event occurrences, if supplied.
    pub events: Option<&'a EventsFrame>,
    /// Names of configured future regressors.
    pub regressor_names: &'a [String],
    /// Future regressor values, one row per future period in order.
    pub regressors: Option<&'a TimeSeriesFrame>,
}

/// The next `periods` dates after `last_date`, with known future inputs.
///
/// Event indicators are set from `inputs.events`; regressor values are
/// copied row by row from `inputs.regressors`. Every other name in `columns`
/// is added as an all-`NaN` column, except the derived `t` and `y_scaled`.
///
/// # Errors
///
/// Returns an error if a regressor has no future values.
pub fn make_future_df(
    columns: &[String],
    last_date: NaiveDateTime,
    periods: usize,
    freq: Frequency,
    inputs: FutureInputs<'_>,
) -> Result<TimeSeriesFrame> {
    let dates = freq.dates_after(last_date, periods);
    let mut future = TimeSeriesFrame::new(dates);

    if !inputs.event_names.is_empty() {
        let empty = EventsFrame::new();
        future = convert_events_to_features(&future, inputs.event_names, inputs.events.unwrap_or(&empty))?;
    }

    if let Some(regressors) = inputs.regressors {
        for name in inputs.regressor_names {
            let source = regressors.column(name).ok_or_else(|| {
                DataError::MissingData(format!("Future values of user specified regressor {name} not provided"))
            })?;
            let values = (0..periods).map(|i| source.get(i).copied().unwrap_or(f64::NAN)).collect();
            future.set_column(name, values)?;
        }
    }

    for column in columns {
        if column != "t" && column != "y_scaled" && !future.has_column(column) {
            future.set_column(column, vec![f64::NAN; periods])?;
        }
    }
    Ok(future)
}

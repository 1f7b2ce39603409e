//! Validation of user-supplied frames.

use crate::error::{DataError, Result};
use crate::frame::TimeSeriesFrame;

/// Validate and clean a frame before it enters the pipeline.
///
/// - the frame must have rows and unique timestamps;
/// - `y` (when `check_y`) and every column in `required` must exist and hold
///   at least one finite value; infinities become `NaN`;
/// - rows are sorted by `ds`.
///
/// # Errors
///
/// Returns the first violated condition.
pub fn check_dataframe(
    mut frame: TimeSeriesFrame,
    check_y: bool,
    required: &[String],
) -> Result<TimeSeriesFrame> {
    if frame.is_empty() {
        return Err(DataError::EmptyFrame);
    }
    frame.sort_by_ds();
    if let Some(pair) = frame.ds().windows(2).find(|w| w[0] == w[1]) {
        return Err(DataError::DuplicateDates(pair[0].to_string()));
    }

    let mut columns: Vec<&str> = Vec::new();
    if check_y {
        columns.push("y");
    }
    columns.extend(required.iter().map(String::as_str));

    for name in columns {
        let values = frame
            .column_mut(name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))?;
        for v in values.iter_mut() {
            if v.is_infinite() {
                *v = f64::NAN;
            }
        }
        if values.iter().all(|v| v.is_nan()) {
            return Err(DataError::AllNan(name.to_string()));
        }
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::{daily_dates, daily_frame};

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(matches!(
            check_dataframe(TimeSeriesFrame::default(), true, &[]),
            Err(DataError::EmptyFrame)
        ));

        let mut dates = daily_dates((2024, 1, 1), 3);
        dates[2] = dates[1];
        let frame = TimeSeriesFrame::from_series(dates, vec![1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(
            check_dataframe(frame, true, &[]),
            Err(DataError::DuplicateDates(_))
        ));
    }

    #[test]
    fn test_requires_columns_with_values() {
        let frame = daily_frame((2024, 1, 1), &[f64::NAN, f64::INFINITY]);
        assert!(matches!(
            check_dataframe(frame.clone(), true, &[]),
            Err(DataError::AllNan(_))
        ));
        assert!(check_dataframe(frame.clone(), false, &[]).is_ok());
        assert!(matches!(
            check_dataframe(frame, false, &["temp".to_string()]),
            Err(DataError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_sorts_and_cleans_infinities() {
        let frame = daily_frame((2024, 1, 1), &[1.0, f64::NEG_INFINITY, 3.0]).select_rows(&[2, 1, 0]);
        let checked = check_dataframe(frame, true, &[]).unwrap();
        let y = checked.column("y").unwrap();
        assert_eq!(y[0], 1.0);
        assert!(y[1].is_nan());
    }
}

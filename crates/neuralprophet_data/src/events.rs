//! Event indicators and their windows.

use crate::error::Result;
use crate::frame::{EventsFrame, TimeSeriesFrame};

/// Add one 0/1 indicator column per event, 1 where `ds` is an event date.
///
/// Existing indicator columns are overwritten.
///
/// # Errors
///
/// Returns an error only if the frame is internally inconsistent.
pub fn convert_events_to_features(
    frame: &TimeSeriesFrame,
    event_names: &[String],
    events: &EventsFrame,
) -> Result<TimeSeriesFrame> {
    let mut out = frame.clone();
    for name in event_names {
        let dates = events.dates_for(name);
        let indicator = frame
            .ds()
            .iter()
            .map(|d| if dates.contains(d) { 1.0 } else { 0.0 })
            .collect();
        out.set_column(name, indicator)?;
    }
    Ok(out)
}

/// Shift an indicator so that row `i` holds the value at row `i - offset`.
///
/// A positive offset marks the days after an event, a negative one the days
/// before it. Rows shifted in from outside the frame are 0.
#[must_use]
pub fn shifted_indicator(indicator: &[f64], offset: i32) -> Vec<f64> {
    let n = indicator.len() as i64;
    (0..n)
        .map(|i| {
            let src = i - i64::from(offset);
            if (0..n).contains(&src) {
                indicator[src as usize]
            } else {
                0.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::{daily_dates, daily_frame};

    #[test]
    fn test_indicator_columns() {
        let frame = daily_frame((2024, 1, 1), &[1.0, 2.0, 3.0, 4.0]);
        let dates = daily_dates((2024, 1, 1), 4);
        let events = EventsFrame::new().with_event("promo", &[dates[1]]);
        let out = convert_events_to_features(&frame, &["promo".to_string(), "other".to_string()], &events).unwrap();
        assert_eq!(out.column("promo").unwrap(), &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(out.column("other").unwrap(), &[0.0; 4]);
    }

    #[test]
    fn test_shifted_indicator() {
        let ind = [0.0, 1.0, 0.0, 0.0];
        assert_eq!(shifted_indicator(&ind, 1), vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(shifted_indicator(&ind, -1), vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(shifted_indicator(&ind, 0), ind.to_vec());
    }
}

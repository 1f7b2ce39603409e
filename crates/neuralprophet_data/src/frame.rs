//! Tabular time series containers.
//!
//! A [`TimeSeriesFrame`] holds one series: a `ds` timestamp column plus any
//! number of named `f64` columns (`y`, regressors, events, ...). Missing
//! values are stored as `NaN`. [`Frames`] bundles one unnamed frame or a
//! map of named frames, which is how several series are fitted together.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// Key under which a single unnamed frame is processed.
pub const SINGLE_FRAME_KEY: &str = "__df__";

/// One time series in column-major layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeSeriesFrame {
    ds: Vec<NaiveDateTime>,
    columns: Vec<(String, Vec<f64>)>,
}

impl TimeSeriesFrame {
    /// Create a frame holding only timestamps.
    #[must_use]
    pub fn new(ds: Vec<NaiveDateTime>) -> Self {
        Self {
            ds,
            columns: Vec::new(),
        }
    }

    /// Create a frame from `ds` and `y` columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the columns have different lengths.
    pub fn from_series(ds: Vec<NaiveDateTime>, y: Vec<f64>) -> Result<Self> {
        Self::new(ds).with_column("y", y)
    }

    /// Builder-style [`set_column`](Self::set_column).
    ///
    /// # Errors
    ///
    /// Returns an error if `values` does not match the number of rows.
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Result<Self> {
        self.set_column(name, values)?;
        Ok(self)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ds.len()
    }

    /// Whether the frame has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ds.is_empty()
    }

    /// The timestamp column.
    #[must_use]
    pub fn ds(&self) -> &[NaiveDateTime] {
        &self.ds
    }

    /// First timestamp.
    #[must_use]
    pub fn first_date(&self) -> Option<NaiveDateTime> {
        self.ds.first().copied()
    }

    /// Last timestamp.
    #[must_use]
    pub fn last_date(&self) -> Option<NaiveDateTime> {
        self.ds.last().copied()
    }

    /// Get a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Get a mutable column by name.
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        self.columns
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Get a column or fail with [`DataError::MissingColumn`].
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist.
    pub fn require(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    /// Whether a column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Column names in insertion order (without `ds`).
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Insert or replace a column.
    ///
    /// # Errors
    ///
    /// Returns an error if `values` does not match the number of rows.
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if values.len() != self.ds.len() {
            return Err(DataError::InvalidShape(format!(
                "column {name:?} has {} values but the frame has {} rows",
                values.len(),
                self.ds.len()
            )));
        }
        match self.column_mut(name) {
            Some(existing) => *existing = values,
            None => self.columns.push((name.to_string(), values)),
        }
        Ok(())
    }

    /// Remove a column, returning its values.
    pub fn remove_column(&mut self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(idx).1)
    }

    /// Copy the given rows, in the given order.
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            ds: rows.iter().map(|&i| self.ds[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(n, v)| (n.clone(), rows.iter().map(|&i| v[i]).collect()))
                .collect(),
        }
    }

    /// Copy a contiguous row range.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            ds: self.ds[start..end].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(n, v)| (n.clone(), v[start..end].to_vec()))
                .collect(),
        }
    }

    /// Copy the last `n` rows.
    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let len = self.len();
        self.slice(len.saturating_sub(n)..len)
    }

    /// Keep rows where `keep` returns true.
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(usize) -> bool,
    {
        let rows: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        if rows.len() != self.len() {
            *self = self.select_rows(&rows);
        }
    }

    /// Append rows with the given dates; every column gets `NaN`.
    pub fn append_dates(&mut self, dates: &[NaiveDateTime]) {
        self.ds.extend_from_slice(dates);
        for (_, values) in &mut self.columns {
            values.extend(std::iter::repeat(f64::NAN).take(dates.len()));
        }
    }

    /// Sort rows by timestamp.
    pub fn sort_by_ds(&mut self) {
        if self.ds.windows(2).all(|w| w[0] <= w[1]) {
            return;
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.ds[i]);
        *self = self.select_rows(&order);
    }

    /// Stack frames vertically.
    ///
    /// Columns are the union of all inputs in first-seen order; a frame
    /// without a column contributes `NaN`.
    #[must_use]
    pub fn concat<'a, I>(frames: I) -> Self
    where
        I: IntoIterator<Item = &'a TimeSeriesFrame>,
    {
        let frames: Vec<&TimeSeriesFrame> = frames.into_iter().collect();
        let mut names: Vec<String> = Vec::new();
        for frame in &frames {
            for name in frame.column_names() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        let mut out = Self::new(frames.iter().flat_map(|f| f.ds.iter().copied()).collect());
        out.columns = names
            .into_iter()
            .map(|name| {
                let values = frames
                    .iter()
                    .flat_map(|f| match f.column(&name) {
                        Some(v) => v.to_vec(),
                        None => vec![f64::NAN; f.len()],
                    })
                    .collect();
                (name, values)
            })
            .collect();
        out
    }
}

/// One unnamed series or several named series.
///
/// Operations accept either form and return results in the same form.
#[derive(Debug, Clone, PartialEq)]
pub enum Frames {
    /// A single series, processed under [`SINGLE_FRAME_KEY`].
    Single(TimeSeriesFrame),
    /// Named series fitted jointly.
    Named(BTreeMap<String, TimeSeriesFrame>),
}

impl Frames {
    /// Split into a name-keyed map and whether the input was a single frame.
    #[must_use]
    pub fn into_map(self) -> (BTreeMap<String, TimeSeriesFrame>, bool) {
        match self {
            Self::Single(frame) => {
                let mut map = BTreeMap::new();
                map.insert(SINGLE_FRAME_KEY.to_string(), frame);
                (map, true)
            }
            Self::Named(map) => (map, false),
        }
    }

    /// Rebuild from a map, undoing [`into_map`](Self::into_map).
    #[must_use]
    pub fn from_map(mut map: BTreeMap<String, TimeSeriesFrame>, single: bool) -> Self {
        if single && map.len() == 1 {
            if let Some(frame) = map.remove(SINGLE_FRAME_KEY) {
                return Self::Single(frame);
            }
        }
        Self::Named(map)
    }

    /// Unwrap a single frame.
    ///
    /// # Errors
    ///
    /// Returns an error if several named frames are held.
    pub fn into_single(self) -> Result<TimeSeriesFrame> {
        match self {
            Self::Single(frame) => Ok(frame),
            Self::Named(mut map) if map.len() == 1 => {
                let key = map.keys().next().cloned().unwrap_or_default();
                map.remove(&key).ok_or(DataError::EmptyDataset)
            }
            Self::Named(map) => Err(DataError::InvalidInput(format!(
                "expected a single dataframe, got {} named dataframes",
                map.len()
            ))),
        }
    }

    /// Borrow a single frame, if this is one.
    #[must_use]
    pub fn as_single(&self) -> Option<&TimeSeriesFrame> {
        match self {
            Self::Single(frame) => Some(frame),
            Self::Named(_) => None,
        }
    }

    /// Look up a frame by name; the single frame answers to [`SINGLE_FRAME_KEY`].
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TimeSeriesFrame> {
        match self {
            Self::Single(frame) if name == SINGLE_FRAME_KEY => Some(frame),
            Self::Single(_) => None,
            Self::Named(map) => map.get(name),
        }
    }

    /// Number of series.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Named(map) => map.len(),
        }
    }

    /// Whether no series are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<TimeSeriesFrame> for Frames {
    fn from(frame: TimeSeriesFrame) -> Self {
        Self::Single(frame)
    }
}

impl From<BTreeMap<String, TimeSeriesFrame>> for Frames {
    fn from(map: BTreeMap<String, TimeSeriesFrame>) -> Self {
        Self::Named(map)
    }
}

/// Concatenate all frames of a map, sort by `ds` and keep the first row per timestamp.
#[must_use]
pub fn merge_unique_dates(frames: &BTreeMap<String, TimeSeriesFrame>) -> TimeSeriesFrame {
    let mut merged = TimeSeriesFrame::concat(frames.values());
    let mut order: Vec<usize> = (0..merged.len()).collect();
    order.sort_by_key(|&i| merged.ds[i]);
    let mut seen = BTreeSet::new();
    order.retain(|&i| seen.insert(merged.ds[i]));
    merged = merged.select_rows(&order);
    merged
}

/// Event occurrences: one row per (event name, date).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventsFrame {
    rows: Vec<(String, NaiveDateTime)>,
}

impl EventsFrame {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one occurrence.
    pub fn push(&mut self, event: &str, ds: NaiveDateTime) {
        self.rows.push((event.to_string(), ds));
    }

    /// Builder-style [`push`](Self::push) for several dates of one event.
    #[must_use]
    pub fn with_event(mut self, event: &str, dates: &[NaiveDateTime]) -> Self {
        for &ds in dates {
            self.push(event, ds);
        }
        self
    }

    /// Dates on which `event` occurs.
    #[must_use]
    pub fn dates_for(&self, event: &str) -> BTreeSet<NaiveDateTime> {
        self.rows
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, ds)| *ds)
            .collect()
    }

    /// Distinct event names.
    #[must_use]
    pub fn names(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[(String, NaiveDateTime)] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    pub(crate) fn daily_dates(start: (i32, u32, u32), n: usize) -> Vec<NaiveDateTime> {
        let first = NaiveDate::from_ymd_opt(start.0, start.1, start.2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| first + Duration::days(i as i64)).collect()
    }

    pub(crate) fn daily_frame(start: (i32, u32, u32), y: &[f64]) -> TimeSeriesFrame {
        TimeSeriesFrame::from_series(daily_dates(start, y.len()), y.to_vec()).unwrap()
    }

    #[test]
    fn test_set_column_checks_length() {
        let mut frame = daily_frame((2024, 1, 1), &[1.0, 2.0, 3.0]);
        assert!(frame.set_column("x", vec![1.0]).is_err());
        frame.set_column("x", vec![4.0, 5.0, 6.0]).unwrap();
        assert_eq!(frame.column_names().collect::<Vec<_>>(), vec!["y", "x"]);
        frame.set_column("y", vec![0.0; 3]).unwrap();
        assert_eq!(frame.column("y").unwrap(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_slice_tail_and_sort() {
        let mut frame = daily_frame((2024, 1, 1), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frame.slice(1..3).column("y").unwrap(), &[2.0, 3.0]);
        assert_eq!(frame.tail(10).len(), 4);

        frame = frame.select_rows(&[3, 0, 2, 1]);
        frame.sort_by_ds();
        assert_eq!(frame.column("y").unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_concat_fills_missing_columns() {
        let a = daily_frame((2024, 1, 1), &[1.0, 2.0]);
        let b = daily_frame((2024, 1, 3), &[3.0])
            .with_column("x", vec![9.0])
            .unwrap();
        let merged = TimeSeriesFrame::concat([&a, &b]);
        assert_eq!(merged.len(), 3);
        let x = merged.column("x").unwrap();
        assert!(x[0].is_nan() && x[1].is_nan());
        assert_eq!(x[2], 9.0);
    }

    #[test]
    fn test_frames_round_trip_shape() {
        let frame = daily_frame((2024, 1, 1), &[1.0]);
        let (map, single) = Frames::from(frame.clone()).into_map();
        assert!(map.contains_key(SINGLE_FRAME_KEY));
        assert_eq!(Frames::from_map(map, single), Frames::Single(frame));
    }

    #[test]
    fn test_merge_unique_dates() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), daily_frame((2024, 1, 1), &[1.0, 2.0, 3.0]));
        map.insert("b".to_string(), daily_frame((2024, 1, 2), &[5.0, 6.0, 7.0]));
        let merged = merge_unique_dates(&map);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.column("y").unwrap(), &[1.0, 2.0, 3.0, 7.0]);
    }
}

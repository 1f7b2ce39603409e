//! Sampling frequencies of `ds` timestamps.
//!
//! Frequencies use pandas-style aliases (`D`, `H`, `5min`, `MS`, ...), so
//! configuration files written for other forecasting tools keep working.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// Spacing between consecutive observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    /// A fixed number of seconds (`S`, `min`, `H`, `D`, `W` and multiples).
    Fixed(i64),
    /// First day of every n-th month (`MS`, `QS`, `YS`).
    MonthStart(u32),
    /// Last day of every n-th month (`M`, `Q`, `Y`).
    MonthEnd(u32),
}

impl Frequency {
    /// Daily frequency.
    pub const DAILY: Self = Self::Fixed(SECONDS_PER_DAY);

    /// Parse a frequency, treating `"auto"` as "infer from data".
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFrequency`] for unknown aliases.
    pub fn parse_optional(s: &str) -> Result<Option<Self>> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(None)
        } else {
            s.parse().map(Some)
        }
    }

    /// Approximate step length in days, used for auto seasonality rules.
    #[must_use]
    pub fn approx_days(&self) -> f64 {
        match self {
            Self::Fixed(seconds) => *seconds as f64 / SECONDS_PER_DAY as f64,
            Self::MonthStart(months) | Self::MonthEnd(months) => f64::from(*months) * 30.44,
        }
    }

    /// Whether `date` lies on this frequency's grid anchor.
    #[must_use]
    pub fn is_anchored(&self, date: NaiveDateTime) -> bool {
        match self {
            Self::Fixed(_) => true,
            Self::MonthStart(_) => date.day() == 1,
            Self::MonthEnd(_) => is_month_end(date.date()),
        }
    }

    /// The first grid date strictly after `date`.
    #[must_use]
    pub fn next_after(&self, date: NaiveDateTime) -> NaiveDateTime {
        match *self {
            Self::Fixed(seconds) => date + Duration::seconds(seconds),
            Self::MonthStart(months) => {
                let first = date.date().with_day(1).unwrap_or(date.date());
                let next = if date.day() == 1 {
                    first.checked_add_months(Months::new(months))
                } else {
                    first.checked_add_months(Months::new(1))
                };
                next.unwrap_or(first).and_time(date.time())
            }
            Self::MonthEnd(months) => {
                let step = if is_month_end(date.date()) { months } else { 0 };
                let first = date.date().with_day(1).unwrap_or(date.date());
                let target = first.checked_add_months(Months::new(step)).unwrap_or(first);
                last_day_of_month(target).and_time(date.time())
            }
        }
    }

    /// Step `n` grid points forward from `date`.
    #[must_use]
    pub fn advance(&self, date: NaiveDateTime, n: usize) -> NaiveDateTime {
        (0..n).fold(date, |d, _| self.next_after(d))
    }

    /// All grid dates from `start` up to and including `end`.
    #[must_use]
    pub fn date_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDateTime> {
        let mut dates = Vec::new();
        let mut current = start;
        while current <= end {
            dates.push(current);
            let next = self.next_after(current);
            if next <= current {
                break;
            }
            current = next;
        }
        dates
    }

    /// The next `periods` grid dates strictly after `last`.
    #[must_use]
    pub fn dates_after(&self, last: NaiveDateTime, periods: usize) -> Vec<NaiveDateTime> {
        let mut dates = Vec::with_capacity(periods);
        let mut current = last;
        for _ in 0..periods {
            current = self.next_after(current);
            dates.push(current);
        }
        dates
    }

    /// Infer the frequency of one sorted date column.
    ///
    /// The most common delta wins. Deltas of about a month, quarter or year
    /// become calendar frequencies when the dates sit on month starts or ends.
    ///
    /// # Errors
    ///
    /// Returns an error for fewer than two dates or a non-positive delta.
    pub fn infer(dates: &[NaiveDateTime]) -> Result<Self> {
        if dates.len() < 2 {
            return Err(CoreError::FrequencyInference(
                "at least two timestamps are required".to_string(),
            ));
        }
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for pair in dates.windows(2) {
            let delta = (pair[1] - pair[0]).num_seconds();
            *counts.entry(delta).or_default() += 1;
        }
        let (delta, count) = counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .ok_or_else(|| CoreError::FrequencyInference("no deltas".to_string()))?;
        if delta <= 0 {
            return Err(CoreError::FrequencyInference(format!(
                "timestamps must be strictly increasing, found delta of {delta}s"
            )));
        }
        let share = count as f64 / (dates.len() - 1) as f64;
        if share < 0.9 {
            tracing::warn!(
                "Most common time step covers only {:.0}% of the data, the series may be irregular",
                share * 100.0
            );
        }

        let days = delta / SECONDS_PER_DAY;
        let months = match days {
            28..=31 => Some(1),
            89..=92 => Some(3),
            365 | 366 => Some(12),
            _ => None,
        };
        if let Some(months) = months {
            if dates.iter().all(|d| d.day() == 1) {
                return Ok(Self::MonthStart(months));
            }
            if dates.iter().all(|d| is_month_end(d.date())) {
                return Ok(Self::MonthEnd(months));
            }
        }
        Ok(Self::Fixed(delta))
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| CoreError::InvalidFrequency(s.to_string()))?;
        let (count, unit) = trimmed.split_at(split);
        let count: u32 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| CoreError::InvalidFrequency(s.to_string()))?
        };
        if count == 0 {
            return Err(CoreError::InvalidFrequency(s.to_string()));
        }
        let seconds = |unit_seconds: i64| Self::Fixed(unit_seconds * i64::from(count));
        let freq = match unit {
            "S" | "s" => seconds(1),
            "T" | "min" => seconds(60),
            "H" | "h" => seconds(3600),
            "D" | "d" => seconds(SECONDS_PER_DAY),
            "W" | "w" => seconds(7 * SECONDS_PER_DAY),
            "MS" => Self::MonthStart(count),
            "M" => Self::MonthEnd(count),
            "QS" => Self::MonthStart(3 * count),
            "Q" => Self::MonthEnd(3 * count),
            "YS" | "AS" => Self::MonthStart(12 * count),
            "Y" | "A" => Self::MonthEnd(12 * count),
            _ => return Err(CoreError::InvalidFrequency(s.to_string())),
        };
        Ok(freq)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let with_count = |f: &mut fmt::Formatter<'_>, n: i64, unit: &str| {
            if n == 1 {
                write!(f, "{unit}")
            } else {
                write!(f, "{n}{unit}")
            }
        };
        match *self {
            Self::Fixed(s) if s % (7 * SECONDS_PER_DAY) == 0 => {
                with_count(f, s / (7 * SECONDS_PER_DAY), "W")
            }
            Self::Fixed(s) if s % SECONDS_PER_DAY == 0 => with_count(f, s / SECONDS_PER_DAY, "D"),
            Self::Fixed(s) if s % 3600 == 0 => with_count(f, s / 3600, "H"),
            Self::Fixed(s) if s % 60 == 0 => with_count(f, s / 60, "min"),
            Self::Fixed(s) => with_count(f, s, "S"),
            Self::MonthStart(m) if m % 12 == 0 => with_count(f, i64::from(m / 12), "YS"),
            Self::MonthStart(m) => with_count(f, i64::from(m), "MS"),
            Self::MonthEnd(m) if m % 12 == 0 => with_count(f, i64::from(m / 12), "Y"),
            Self::MonthEnd(m) => with_count(f, i64::from(m), "M"),
        }
    }
}

/// Infer one frequency shared by several named series.
///
/// An explicit `freq` overrides inference but is logged when it disagrees
/// with the data. Series that disagree with each other are an error when the
/// model uses lags, since lag windows then mix different time steps.
///
/// # Errors
///
/// Returns an error when no frequency can be determined, or when series
/// disagree and `n_lags > 0`.
pub fn infer_frequency<'a, I>(series: I, n_lags: usize, freq: Option<Frequency>) -> Result<Frequency>
where
    I: IntoIterator<Item = (&'a str, &'a [NaiveDateTime])>,
{
    let mut inferred: Vec<(String, Frequency)> = Vec::new();
    for (name, dates) in series {
        match Frequency::infer(dates) {
            Ok(f) => inferred.push((name.to_string(), f)),
            Err(e) if freq.is_some() => {
                tracing::debug!("Could not infer frequency of {name}: {e}");
            }
            Err(e) => return Err(e),
        }
    }

    let distinct: Vec<Frequency> = inferred.iter().fold(Vec::new(), |mut acc, (_, f)| {
        if !acc.contains(f) {
            acc.push(*f);
        }
        acc
    });
    if distinct.len() > 1 {
        let msg = format!(
            "series have different frequencies: {}",
            inferred
                .iter()
                .map(|(n, f)| format!("{n}={f}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        if n_lags > 0 {
            return Err(CoreError::FrequencyInference(msg));
        }
        tracing::warn!("{msg}");
    }

    match (freq, distinct.first()) {
        (Some(given), Some(found)) => {
            if given != *found {
                tracing::warn!("Using frequency {given}, but the data looks like {found}");
            }
            Ok(given)
        }
        (Some(given), None) => Ok(given),
        (None, Some(found)) => {
            tracing::info!("Inferred data frequency: {found}");
            Ok(*found)
        }
        (None, None) => Err(CoreError::FrequencyInference(
            "no series to infer a frequency from".to_string(),
        )),
    }
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

fn is_month_end(date: NaiveDate) -> bool {
    last_day_of_month(date) == date
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("D".parse::<Frequency>().unwrap(), Frequency::DAILY);
        assert_eq!("5min".parse::<Frequency>().unwrap(), Frequency::Fixed(300));
        assert_eq!("MS".parse::<Frequency>().unwrap(), Frequency::MonthStart(1));
        assert_eq!("QS".parse::<Frequency>().unwrap(), Frequency::MonthStart(3));
        assert_eq!("Y".parse::<Frequency>().unwrap(), Frequency::MonthEnd(12));
        assert!("fortnight".parse::<Frequency>().is_err());
        assert_eq!(Frequency::parse_optional("auto").unwrap(), None);
    }

    #[test]
    fn test_display_round_trips_common_aliases() {
        for alias in ["D", "H", "W", "15min", "MS", "M", "YS"] {
            let freq: Frequency = alias.parse().unwrap();
            assert_eq!(freq.to_string(), alias);
        }
    }

    #[test]
    fn test_month_steps_snap_to_anchor() {
        let ms = Frequency::MonthStart(1);
        assert_eq!(ms.next_after(day(2024, 1, 1)), day(2024, 2, 1));
        assert_eq!(ms.next_after(day(2024, 1, 15)), day(2024, 2, 1));

        let me = Frequency::MonthEnd(1);
        assert_eq!(me.next_after(day(2024, 1, 31)), day(2024, 2, 29));
        assert_eq!(me.next_after(day(2024, 2, 29)), day(2024, 3, 31));
        assert_eq!(me.next_after(day(2024, 2, 10)), day(2024, 2, 29));
    }

    #[test]
    fn test_infer_daily_and_monthly() {
        let daily: Vec<_> = (0..10).map(|i| day(2024, 1, 1) + Duration::days(i)).collect();
        assert_eq!(Frequency::infer(&daily).unwrap(), Frequency::DAILY);

        let monthly: Vec<_> = (1..=6).map(|m| day(2023, m, 1)).collect();
        assert_eq!(Frequency::infer(&monthly).unwrap(), Frequency::MonthStart(1));
    }

    #[test]
    fn test_infer_ignores_gaps() {
        let mut dates: Vec<_> = (0..20).map(|i| day(2024, 1, 1) + Duration::days(i)).collect();
        dates.remove(5);
        assert_eq!(Frequency::infer(&dates).unwrap(), Frequency::DAILY);
    }

    #[test]
    fn test_date_range_and_dates_after() {
        let range = Frequency::DAILY.date_range(day(2024, 1, 1), day(2024, 1, 5));
        assert_eq!(range.len(), 5);
        let future = Frequency::DAILY.dates_after(day(2024, 1, 5), 3);
        assert_eq!(future, vec![day(2024, 1, 6), day(2024, 1, 7), day(2024, 1, 8)]);
    }

    #[test]
    fn test_infer_frequency_across_series() {
        let a: Vec<_> = (0..5).map(|i| day(2024, 1, 1) + Duration::days(i)).collect();
        let b: Vec<_> = (0..5).map(|i| day(2024, 1, 1) + Duration::hours(i)).collect();

        let same = infer_frequency([("a", a.as_slice()), ("b", a.as_slice())], 3, None).unwrap();
        assert_eq!(same, Frequency::DAILY);

        assert!(infer_frequency([("a", a.as_slice()), ("b", b.as_slice())], 3, None).is_err());
        assert!(infer_frequency([("a", a.as_slice()), ("b", b.as_slice())], 0, None).is_ok());

        let forced = infer_frequency([("a", a.as_slice())], 0, Some(Frequency::Fixed(3600))).unwrap();
        assert_eq!(forced, Frequency::Fixed(3600));
    }
}

//! CSV input and output.
//!
//! Input files need a `ds` column; every other column is parsed as a float.
//! Empty cells and `nan`/`NA`/`?` markers become `NaN`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{DataError, Result};
use crate::frame::{EventsFrame, TimeSeriesFrame};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];

/// Format used when writing `ds`.
pub const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a timestamp cell.
///
/// # Errors
///
/// Returns [`DataError::Parse`] for unknown formats and for timestamps with
/// a timezone offset, which are not supported.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(DataError::Parse("found an empty value in column ds".to_string()));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return Ok(dt);
            }
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    if DateTime::parse_from_rfc3339(s).is_ok() || DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%z").is_ok() {
        return Err(DataError::Parse(format!(
            "column ds has timezone specified ({s:?}), which is not supported. Remove timezone"
        )));
    }
    Err(DataError::Parse(format!("cannot parse {s:?} as a timestamp")))
}

fn parse_value(raw: &str, column: &str) -> Result<f64> {
    let s = raw.trim();
    match s {
        "" | "nan" | "NaN" | "NAN" | "NA" | "null" | "None" | "?" => Ok(f64::NAN),
        _ => s
            .parse::<f64>()
            .map_err(|_| DataError::Parse(format!("cannot parse {s:?} in column {column:?} as a number"))),
    }
}

/// Read a frame from any CSV source.
///
/// # Errors
///
/// Returns an error if the header lacks `ds` or a cell cannot be parsed.
pub fn read_csv_from_reader<R: Read>(reader: R) -> Result<TimeSeriesFrame> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let ds_idx = headers
        .iter()
        .position(|h| h.trim() == "ds")
        .ok_or_else(|| DataError::MissingColumn("ds".to_string()))?;
    let value_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| *i != ds_idx && !h.trim().is_empty())
        .map(|(i, h)| (i, h.trim().to_string()))
        .collect();

    let mut ds = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); value_cols.len()];
    for record in reader.records() {
        let record = record?;
        ds.push(parse_timestamp(record.get(ds_idx).unwrap_or_default())?);
        for (slot, (idx, name)) in values.iter_mut().zip(&value_cols) {
            slot.push(parse_value(record.get(*idx).unwrap_or_default(), name)?);
        }
    }

    let mut frame = TimeSeriesFrame::new(ds);
    for ((_, name), column) in value_cols.into_iter().zip(values) {
        frame.set_column(&name, column)?;
    }
    tracing::debug!("Read {} rows with columns {:?}", frame.len(), frame.column_names().collect::<Vec<_>>());
    Ok(frame)
}

/// Read a frame from a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<TimeSeriesFrame> {
    let file = File::open(path.as_ref())?;
    read_csv_from_reader(BufReader::new(file))
}

/// Write a frame as CSV: `ds` first, then columns in order, `NaN` as empty.
///
/// # Errors
///
/// Returns an error on I/O failure.
pub fn write_csv_to_writer<W: Write>(frame: &TimeSeriesFrame, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    let names: Vec<&str> = frame.column_names().collect();
    let mut header = vec!["ds"];
    header.extend(names.iter().copied());
    writer.write_record(&header)?;

    let columns: Vec<&[f64]> = names.iter().filter_map(|n| frame.column(n)).collect();
    for (row, ds) in frame.ds().iter().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(ds.format(OUTPUT_DATE_FORMAT).to_string());
        for column in &columns {
            let v = column[row];
            record.push(if v.is_nan() { String::new() } else { v.to_string() });
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a frame to a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_csv<P: AsRef<Path>>(frame: &TimeSeriesFrame, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_csv_to_writer(frame, BufWriter::new(file))
}

/// Read an events table with columns `event` and `ds`.
///
/// # Errors
///
/// Returns an error if a column is missing or a date cannot be parsed.
pub fn read_events_csv<P: AsRef<Path>>(path: P) -> Result<EventsFrame> {
    let file = File::open(path.as_ref())?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));
    let headers = reader.headers()?.clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    };
    let (event_idx, ds_idx) = (find("event")?, find("ds")?);

    let mut events = EventsFrame::new();
    for record in reader.records() {
        let record = record?;
        let name = record.get(event_idx).unwrap_or_default().trim();
        events.push(name, parse_timestamp(record.get(ds_idx).unwrap_or_default())?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-05").unwrap(), expected);
        assert_eq!(parse_timestamp("2024/03/05").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-05 00:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03").unwrap().date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_parse_timestamp_rejects_timezone() {
        let err = parse_timestamp("2024-03-05T10:00:00+02:00").unwrap_err();
        assert!(err.to_string().contains("timezone"));
    }

    #[test]
    fn test_read_csv_with_missing_values() {
        let csv = "ds,y,temp\n2024-01-01,1.5,10\n2024-01-02,,11\n2024-01-03,3.0,nan\n";
        let frame = read_csv_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(frame.len(), 3);
        let y = frame.column("y").unwrap();
        assert_eq!(y[0], 1.5);
        assert!(y[1].is_nan());
        assert!(frame.column("temp").unwrap()[2].is_nan());
    }

    #[test]
    fn test_read_csv_requires_ds() {
        let csv = "date,y\n2024-01-01,1\n";
        assert!(matches!(
            read_csv_from_reader(csv.as_bytes()),
            Err(DataError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_write_then_read_file() {
        let csv = "ds,y\n2024-01-01,1\n2024-01-02,\n";
        let frame = read_csv_from_reader(csv.as_bytes()).unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        write_csv(&frame, file.path()).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("ds,y\n2024-01-01 00:00:00,1\n2024-01-02 00:00:00,\n"));

        let back = read_csv(file.path()).unwrap();
        assert_eq!(back.ds(), frame.ds());
    }

    #[test]
    fn test_read_events_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "event,ds\nsuperbowl,2024-02-11\nsuperbowl,2023-02-12").unwrap();
        let events = read_events_csv(file.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events.dates_for("superbowl").len(), 2);
    }
}

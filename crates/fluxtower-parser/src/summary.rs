use chrono::NaiveDateTime;
use csv::StringRecord;
use polars::prelude::*;

use crate::errors::ParserError;

const NAME: &str = "EP_SUMMARY";

/// Column holding the combined `date` + `time` stamp of each averaging period.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// EddyPro writes this value for quantities it could not compute.
pub const MISSING_VALUE_SENTINEL: f64 = -9999.0;

const DATE_COLUMN: &str = "date";
const TIME_COLUMN: &str = "time";

#[derive(Debug, Clone)]
pub struct ParsedSummary {
    /// One row per averaging period: `timestamp` followed by every numeric column of the file.
    pub df: DataFrame,
    /// Columns dropped because they held non-numeric values (file names, version strings).
    pub skipped_columns: Vec<String>,
}

/// Parses a tab-separated EddyPro `*_EP-Summary.txt` file.
///
/// The first row names the columns, the second row carries units and is ignored. The
/// `date` (`YYYY-MM-DD`) and `time` (`HH:MM`) columns are combined into a naive
/// `timestamp`. Empty cells, `NaN` and the `-9999` sentinel become nulls.
pub fn parse_ep_summary(content: &str) -> Result<ParsedSummary, ParserError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let header = records
        .next()
        .ok_or_else(|| ParserError::FormatMismatch {
            parser: NAME,
            reason: "file is empty".to_string(),
        })?
        .map_err(csv_error)?;
    let columns: Vec<String> = header.iter().map(|name| name.trim().to_string()).collect();

    let date_idx = find_column(&columns, DATE_COLUMN)?;
    let time_idx = find_column(&columns, TIME_COLUMN)?;

    records
        .next()
        .ok_or_else(|| ParserError::InvalidHeader {
            parser: NAME,
            row_index: 1,
            message: "missing units row".to_string(),
        })?
        .map_err(csv_error)?;

    let mut timestamps: Vec<i64> = Vec::new();
    let mut raw_values: Vec<Vec<String>> = vec![Vec::new(); columns.len()];

    for (offset, record) in records.enumerate() {
        let line_index = offset + 2;
        let record = record.map_err(csv_error)?;
        if is_blank(&record) {
            continue;
        }

        let date = record.get(date_idx).unwrap_or_default();
        let time = record.get(time_idx).unwrap_or_default();
        timestamps.push(parse_timestamp(date, time, line_index)?);

        for (idx, values) in raw_values.iter_mut().enumerate() {
            values.push(record.get(idx).unwrap_or_default().trim().to_string());
        }
    }

    if timestamps.is_empty() {
        return Err(ParserError::EmptyData { parser: NAME });
    }

    let ts_series = Series::new(TIMESTAMP_COLUMN.into(), timestamps)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .map_err(|err| ParserError::Validation {
            parser: NAME,
            message: format!("failed to cast timestamp column: {err}"),
        })?;

    let mut frame_columns: Vec<Column> = vec![ts_series.into()];
    let mut skipped_columns = Vec::new();

    for (idx, (name, values)) in columns.iter().zip(raw_values).enumerate() {
        if idx == date_idx || idx == time_idx || name.is_empty() {
            continue;
        }
        match parse_numeric_column(&values) {
            Some(parsed) => frame_columns.push(Series::new(name.as_str().into(), parsed).into()),
            None => skipped_columns.push(name.clone()),
        }
    }

    let df = DataFrame::new(frame_columns).map_err(|err| ParserError::Validation {
        parser: NAME,
        message: format!("failed to build summary dataframe: {err}"),
    })?;

    Ok(ParsedSummary {
        df,
        skipped_columns,
    })
}

fn find_column(columns: &[String], wanted: &str) -> Result<usize, ParserError> {
    columns
        .iter()
        .position(|name| name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| ParserError::FormatMismatch {
            parser: NAME,
            reason: format!("missing '{wanted}' column"),
        })
}

fn csv_error(source: csv::Error) -> ParserError {
    ParserError::Csv {
        parser: NAME,
        source,
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|value| value.trim().is_empty())
}

fn parse_timestamp(date: &str, time: &str, line_index: usize) -> Result<i64, ParserError> {
    static FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];
    let combined = format!("{} {}", date.trim(), time.trim());
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&combined, fmt) {
            return Ok(dt.and_utc().timestamp_micros());
        }
    }
    Err(ParserError::DataRow {
        parser: NAME,
        line_index,
        message: format!("invalid date/time '{combined}'"),
    })
}

/// Returns `None` when any non-missing cell fails to parse as a float.
fn parse_numeric_column(values: &[String]) -> Option<Vec<Option<f64>>> {
    values
        .iter()
        .map(|value| {
            if value.is_empty() || value.eq_ignore_ascii_case("nan") {
                return Some(None);
            }
            let parsed = value.parse::<f64>().ok()?;
            if (parsed - MISSING_VALUE_SENTINEL).abs() < f64::EPSILON {
                Some(None)
            } else {
                Some(Some(parsed))
            }
        })
        .collect()
}

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

pub const DEFAULT_LOGGER_ID: &str = "AIU-1309";
pub const DEFAULT_TRANSFER_LAG_DAYS: i64 = 2;
pub const SUMMARY_SUFFIX: &str = "_Summary.txt";
pub const EP_SUMMARY_SUFFIX: &str = "_EP-Summary.txt";
pub const RAW_EXTENSION: &str = ".ghg";

/// `{YYYY-MM-DD}_{logger}`, the shared stem of both daily summary files.
pub fn summary_file_stem(date: NaiveDate, logger_id: &str) -> String {
    format!("{}_{}", date.format("%Y-%m-%d"), logger_id)
}

/// Daily summary file names for every calendar date from `start` to `end`, both inclusive.
///
/// All `_Summary.txt` names come first in date order, followed by the `_EP-Summary.txt`
/// names. An inverted window yields no names.
pub fn list_summary_filenames_in_time_window(
    start: NaiveDateTime,
    end: NaiveDateTime,
    logger_id: &str,
) -> Vec<String> {
    let dates: Vec<NaiveDate> = start
        .date()
        .iter_days()
        .take_while(|date| *date <= end.date())
        .collect();

    let summaries = dates
        .iter()
        .map(|date| format!("{}{SUMMARY_SUFFIX}", summary_file_stem(*date, logger_id)));
    let ep_summaries = dates
        .iter()
        .map(|date| format!("{}{EP_SUMMARY_SUFFIX}", summary_file_stem(*date, logger_id)));

    summaries.chain(ep_summaries).collect()
}

/// Summary file names for a transfer window, with `lag` subtracted from the start so files
/// still being written on the instrument get requested again next run.
pub fn expected_summary_filenames(
    start: NaiveDateTime,
    end: NaiveDateTime,
    lag: Duration,
    logger_id: &str,
) -> Vec<String> {
    list_summary_filenames_in_time_window(start - lag, end, logger_id)
}

/// `{YYYY-MM-DDTHHMM00}_{logger}.ghg` for every `step` from `start` through `end`; seconds
/// are always written as `00`.
pub fn list_raw_filenames_in_time_window(
    start: NaiveDateTime,
    end: NaiveDateTime,
    step: Duration,
    logger_id: &str,
) -> Vec<String> {
    if step <= Duration::zero() {
        return Vec::new();
    }

    let mut names = Vec::new();
    let mut current = start;
    while current <= end {
        names.push(format!(
            "{}00_{logger_id}{RAW_EXTENSION}",
            current.format("%Y-%m-%dT%H%M")
        ));
        current += step;
    }
    names
}

/// Drops minutes and seconds.
pub fn truncate_to_hour(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        .date()
        .and_hms_opt(timestamp.hour(), 0, 0)
        .unwrap_or(timestamp)
}

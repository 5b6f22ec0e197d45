use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::Duration;
use polars::prelude::*;
use thiserror::Error;

use crate::frame::{self, TIMESTAMP};

/// Nominal EddyPro averaging period.
pub const DEFAULT_GRID_INTERVAL_MINUTES: i64 = 30;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
    #[error("row {row} has no timestamp")]
    NullTimestamp { row: usize },
    #[error("grid interval must be a positive number of microseconds, got {0:?}")]
    InvalidInterval(Duration),
    #[error("series is not standardized: timestamp {timestamp} at row {row} is off-grid or out of order")]
    NotStandardized { row: usize, timestamp: i64 },
}

pub fn default_interval() -> Duration {
    Duration::minutes(DEFAULT_GRID_INTERVAL_MINUTES)
}

/// Stable ascending sort on `timestamp`.
pub fn sort_by_timestamp(df: &DataFrame) -> Result<DataFrame, GridError> {
    let timestamps = required_timestamps(df)?;
    let mut order: Vec<IdxSize> = (0..timestamps.len() as IdxSize).collect();
    order.sort_by_key(|&row| timestamps[row as usize]);
    Ok(frame::take_rows(df, order)?)
}

/// Snaps every timestamp to the nearest multiple of `interval` (grid anchored at the Unix
/// epoch, half-way points round forward).
///
/// When several observations land in one slot the one with the later raw timestamp is kept;
/// among identical raw timestamps the later row wins. The result is sorted and applying the
/// function again leaves it unchanged.
pub fn standardize_timestamps(df: &DataFrame, interval: Duration) -> Result<DataFrame, GridError> {
    let step = interval_micros(interval)?;
    let timestamps = required_timestamps(df)?;

    let mut winners: BTreeMap<i64, (i64, usize)> = BTreeMap::new();
    for (row, &raw) in timestamps.iter().enumerate() {
        let slot = snap_to_grid(raw, step);
        let candidate = (raw, row);
        winners
            .entry(slot)
            .and_modify(|current| {
                if candidate > *current {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    let slots: Vec<i64> = winners.keys().copied().collect();
    let rows: Vec<IdxSize> = winners.values().map(|&(_, row)| row as IdxSize).collect();

    let mut standardized = frame::take_rows(df, rows)?;
    standardized.with_column(frame::timestamp_series(slots)?)?;
    Ok(standardized)
}

/// Inserts an all-null row for every empty grid slot between the first and last timestamp.
///
/// Input must already be standardized on the same `interval`.
pub fn fill_missing_slots(df: &DataFrame, interval: Duration) -> Result<DataFrame, GridError> {
    let step = interval_micros(interval)?;
    let timestamps = required_timestamps(df)?;
    if timestamps.is_empty() {
        return Ok(df.clone());
    }

    for (row, pair) in timestamps.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(GridError::NotStandardized {
                row: row + 1,
                timestamp: pair[1],
            });
        }
    }
    if let Some((row, &timestamp)) = timestamps
        .iter()
        .enumerate()
        .find(|(_, ts)| ts.rem_euclid(step) != 0)
    {
        return Err(GridError::NotStandardized { row, timestamp });
    }

    let present: BTreeSet<i64> = timestamps.iter().copied().collect();
    let first = timestamps[0];
    let last = timestamps[timestamps.len() - 1];
    let missing: Vec<i64> = (0..=(last - first) / step)
        .map(|offset| first + offset * step)
        .filter(|slot| !present.contains(slot))
        .collect();

    let mut filled = df.clone();
    filled.with_column(frame::timestamp_series(timestamps)?)?;
    if missing.is_empty() {
        return Ok(filled);
    }

    let placeholder_count = missing.len();
    let mut placeholder_columns: Vec<Column> = Vec::with_capacity(filled.width());
    for column in filled.get_columns() {
        if column.name().as_str() == TIMESTAMP {
            placeholder_columns.push(frame::timestamp_series(missing.clone())?.into());
        } else {
            placeholder_columns.push(
                Series::full_null(column.name().clone(), placeholder_count, column.dtype()).into(),
            );
        }
    }
    let placeholders = DataFrame::new(placeholder_columns)?;
    filled.vstack_mut(&placeholders)?;

    sort_by_timestamp(&filled)
}

pub(crate) fn snap_to_grid(timestamp: i64, step: i64) -> i64 {
    (timestamp + step / 2).div_euclid(step) * step
}

fn interval_micros(interval: Duration) -> Result<i64, GridError> {
    match interval.num_microseconds() {
        Some(step) if step > 0 => Ok(step),
        _ => Err(GridError::InvalidInterval(interval)),
    }
}

fn required_timestamps(df: &DataFrame) -> Result<Vec<i64>, GridError> {
    frame::timestamp_values(df)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| value.ok_or(GridError::NullTimestamp { row }))
        .collect()
}

use chrono::Duration;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::frame;
use crate::time_grid::{self, GridError};

pub const DEFAULT_WINDOW_SIZE: usize = 48;
pub const DEFAULT_MIN_PERIODS: usize = 2;

#[derive(Debug, Error)]
pub enum RollingError {
    #[error("window size must be at least 1")]
    EmptyWindow,
    #[error("min_periods {min_periods} exceeds window size {size}")]
    MinPeriodsTooLarge { size: usize, min_periods: usize },
}

/// Centered rolling window measured in grid slots.
///
/// Slot `i` is summarised over `i - size/2 ..= i + (size - 1) - size/2`: odd sizes are
/// symmetric, even sizes carry the extra slot on the trailing (earlier) side, so a 48-slot
/// window spans `i - 24 ..= i + 23`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingWindow {
    pub size: usize,
    pub min_periods: usize,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self {
            size: DEFAULT_WINDOW_SIZE,
            min_periods: DEFAULT_MIN_PERIODS,
        }
    }
}

impl RollingWindow {
    pub fn new(size: usize, min_periods: usize) -> Result<Self, RollingError> {
        let window = Self { size, min_periods };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), RollingError> {
        if self.size == 0 {
            return Err(RollingError::EmptyWindow);
        }
        if self.min_periods > self.size {
            return Err(RollingError::MinPeriodsTooLarge {
                size: self.size,
                min_periods: self.min_periods,
            });
        }
        Ok(())
    }

    pub fn slots_before(&self) -> usize {
        self.size / 2
    }

    pub fn slots_after(&self) -> usize {
        self.size.saturating_sub(1) - self.slots_before()
    }

    /// Half-open row range covered by the window centred on `index` in a series of `len`.
    pub fn bounds(&self, index: usize, len: usize) -> (usize, usize) {
        let start = index.saturating_sub(self.slots_before());
        let end = (index + self.slots_after() + 1).min(len);
        (start, end)
    }
}

#[derive(Debug, Clone)]
pub struct RollingStatistics {
    pub mean: DataFrame,
    pub std_dev: DataFrame,
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Window(#[from] RollingError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Sort, standardize, gap-fill, then compute centered rolling mean and standard deviation for
/// every measurement column.
///
/// Both outputs share the gap-filled timestamp grid.
pub fn aggregate(
    df: &DataFrame,
    window: &RollingWindow,
    interval: Duration,
) -> Result<RollingStatistics, AggregateError> {
    window.validate()?;

    let sorted = time_grid::sort_by_timestamp(df)?;
    let standardized = time_grid::standardize_timestamps(&sorted, interval)?;
    let filled = time_grid::fill_missing_slots(&standardized, interval)?;

    debug!(
        input_rows = df.height(),
        grid_slots = filled.height(),
        placeholders = filled.height() - standardized.height(),
        "Prepared rolling grid"
    );

    let timestamps: Vec<i64> = frame::timestamp_values(&filled)?
        .into_iter()
        .flatten()
        .collect();

    let mut means = Vec::new();
    let mut std_devs = Vec::new();
    for name in frame::value_columns(&filled) {
        let values = frame::f64_values(&filled, &name)?;
        let (mean, std_dev) = rolling_mean_std(&values, window);
        means.push((name.clone(), mean));
        std_devs.push((name, std_dev));
    }

    Ok(RollingStatistics {
        mean: frame::build_frame(timestamps.clone(), means)?,
        std_dev: frame::build_frame(timestamps, std_devs)?,
    })
}

/// Centered rolling mean and sample standard deviation over a contiguous slot sequence.
///
/// A window yields `None` unless it holds at least `min_periods` non-missing values; the
/// standard deviation additionally needs two values.
pub fn rolling_mean_std(
    values: &[Option<f64>],
    window: &RollingWindow,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let len = values.len();
    let required = window.min_periods.max(1);
    let mut means = Vec::with_capacity(len);
    let mut std_devs = Vec::with_capacity(len);

    for index in 0..len {
        let (start, end) = window.bounds(index, len);
        let present: Vec<f64> = values[start..end].iter().flatten().copied().collect();

        if present.len() < required {
            means.push(None);
            std_devs.push(None);
            continue;
        }

        let count = present.len() as f64;
        let mean = present.iter().sum::<f64>() / count;
        means.push(Some(mean));

        if present.len() < 2 {
            std_devs.push(None);
        } else {
            let sum_sq: f64 = present.iter().map(|v| (v - mean).powi(2)).sum();
            std_devs.push(Some((sum_sq / (count - 1.0)).sqrt()));
        }
    }

    (means, std_devs)
}

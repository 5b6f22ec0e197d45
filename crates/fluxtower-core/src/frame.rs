//! Small helpers for the observation frames passed between stages.
//!
//! Every time series is a `DataFrame` with a naive `timestamp` column
//! (`Datetime(Microseconds, None)`) followed by numeric measurement columns.

use polars::prelude::*;

use crate::error::{PipelineError, Result};

pub use fluxtower_parser::TIMESTAMP_COLUMN as TIMESTAMP;

pub fn timestamp_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Microseconds, None)
}

pub fn timestamp_series(values: Vec<i64>) -> PolarsResult<Series> {
    Series::new(TIMESTAMP.into(), values).cast(&timestamp_dtype())
}

/// Raw timestamp values in microseconds, nulls preserved.
pub fn timestamp_values(df: &DataFrame) -> PolarsResult<Vec<Option<i64>>> {
    let column = df.column(TIMESTAMP)?.cast(&DataType::Int64)?;
    let values = column.i64()?.into_iter().collect();
    Ok(values)
}

/// Values of a column cast to `f64`; NaN is reported as missing.
pub fn f64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    let values = column
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| !v.is_nan()))
        .collect();
    Ok(values)
}

/// All column names except the timestamp, in frame order.
pub fn value_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != TIMESTAMP)
        .map(|name| name.to_string())
        .collect()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

pub fn missing_columns<S: AsRef<str>>(df: &DataFrame, required: &[S]) -> Vec<String> {
    required
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| df.column(name).is_err())
        .map(str::to_string)
        .collect()
}

pub fn require_columns<S: AsRef<str>>(df: &DataFrame, required: &[S], purpose: &str) -> Result<()> {
    let missing = missing_columns(df, required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::DataValidation(format!(
            "{purpose} requires columns that are absent: {}",
            missing.join(", ")
        )))
    }
}

/// Builds a frame from a timestamp column and `f64` value columns.
pub fn build_frame(
    timestamps: Vec<i64>,
    columns: Vec<(String, Vec<Option<f64>>)>,
) -> PolarsResult<DataFrame> {
    let mut frame_columns: Vec<Column> = Vec::with_capacity(columns.len() + 1);
    frame_columns.push(timestamp_series(timestamps)?.into());
    for (name, values) in columns {
        frame_columns.push(Series::new(name.as_str().into(), values).into());
    }
    DataFrame::new(frame_columns)
}

pub fn take_rows(df: &DataFrame, rows: Vec<IdxSize>) -> PolarsResult<DataFrame> {
    let indices = IdxCa::from_vec("rows".into(), rows);
    df.take(&indices)
}

/// Vertically stacks frames whose column sets may differ.
///
/// The output carries the union of all columns in first-seen order; a frame lacking a
/// column contributes nulls for it.
pub fn stack_aligned(frames: Vec<DataFrame>) -> PolarsResult<DataFrame> {
    let mut union: Vec<(PlSmallStr, DataType)> = Vec::new();
    for df in &frames {
        for column in df.get_columns() {
            if !union.iter().any(|(name, _)| name == column.name()) {
                union.push((column.name().clone(), column.dtype().clone()));
            }
        }
    }

    let mut combined: Option<DataFrame> = None;
    for df in frames {
        let height = df.height();
        let mut columns: Vec<Column> = Vec::with_capacity(union.len());
        for (name, dtype) in &union {
            let column = match df.column(name.as_str()) {
                Ok(existing) => existing.cast(dtype)?,
                Err(_) => Series::full_null(name.clone(), height, dtype).into(),
            };
            columns.push(column);
        }
        let aligned = DataFrame::new(columns)?;
        match combined.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&aligned)?;
            }
            None => combined = Some(aligned),
        }
    }

    Ok(combined.unwrap_or_default())
}

#![allow(dead_code)]

use std::path::PathBuf;

use chrono::NaiveDateTime;
use fluxtower_core::frame;
use polars::prelude::*;
use uuid::Uuid;

pub fn ts(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M"))
        .expect("valid test timestamp")
}

pub fn micros(value: &str) -> i64 {
    ts(value).and_utc().timestamp_micros()
}

/// Frame with a `timestamp` column and the given `f64` columns.
pub fn series_frame(times: &[&str], columns: &[(&str, Vec<Option<f64>>)]) -> DataFrame {
    frame::build_frame(
        times.iter().map(|t| micros(t)).collect(),
        columns
            .iter()
            .map(|(name, values)| (name.to_string(), values.clone()))
            .collect(),
    )
    .expect("build test frame")
}

pub fn timestamps(df: &DataFrame) -> Vec<NaiveDateTime> {
    frame::timestamp_values(df)
        .expect("timestamp column")
        .into_iter()
        .map(|value| {
            chrono::DateTime::from_timestamp_micros(value.expect("non-null timestamp"))
                .expect("in range")
                .naive_utc()
        })
        .collect()
}

pub fn values(df: &DataFrame, column: &str) -> Vec<Option<f64>> {
    frame::f64_values(df, column).expect("numeric column")
}

pub fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value present");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

/// Fresh directory under the system temp dir.
pub fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fluxtower-{label}-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../fluxtower-parser/tests/data")
        .join(name)
}

pub const SUMMARY_FIXTURE: &str = "2023-06-01_AIU-1309_EP-Summary.txt";

//! Long-format persistence of the rolling statistics.

use chrono::{DateTime, NaiveDateTime, Utc};
use polars::prelude::DataFrame;

use crate::error::{PipelineError, Result};
use crate::frame;

pub const MEAN_STATISTIC: &str = "mean";
pub const STD_DEV_STATISTIC: &str = "std_dev";

/// One non-missing cell of a statistics frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticRow {
    pub timestamp_local: NaiveDateTime,
    pub variable: String,
    pub value: f64,
}

/// Flattens a wide statistics frame into one row per non-missing (timestamp, variable) cell,
/// ordered by variable then timestamp.
pub fn statistic_rows(df: &DataFrame) -> Result<Vec<StatisticRow>> {
    frame::require_columns(df, &[frame::TIMESTAMP], "statistics storage")?;

    let timestamps = frame::timestamp_values(df)?
        .into_iter()
        .enumerate()
        .map(|(row, micros)| {
            micros
                .and_then(DateTime::<Utc>::from_timestamp_micros)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    PipelineError::DataValidation(format!(
                        "statistics row {row} has no valid timestamp"
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    for variable in frame::value_columns(df) {
        let values = frame::f64_values(df, &variable)?;
        for (timestamp_local, value) in timestamps.iter().zip(values) {
            if let Some(value) = value {
                rows.push(StatisticRow {
                    timestamp_local: *timestamp_local,
                    variable: variable.clone(),
                    value,
                });
            }
        }
    }
    Ok(rows)
}

#[cfg(feature = "runtime")]
pub use self::postgres::store_statistics;

#[cfg(feature = "runtime")]
mod postgres {
    use anyhow::{Context, Result};
    use chrono::NaiveDateTime;
    use polars::prelude::DataFrame;
    use tracing::info;

    use super::statistic_rows;
    use crate::db::DbPool;

    /// Replaces every stored row of `statistic` with the contents of `df` in one transaction.
    ///
    /// Returns the number of rows written.
    pub async fn store_statistics(pool: &DbPool, statistic: &str, df: &DataFrame) -> Result<usize> {
        let rows = statistic_rows(df)
            .with_context(|| format!("failed to flatten {statistic} statistics"))?;

        let mut timestamps: Vec<NaiveDateTime> = Vec::with_capacity(rows.len());
        let mut variables: Vec<String> = Vec::with_capacity(rows.len());
        let mut values: Vec<f64> = Vec::with_capacity(rows.len());
        for row in rows {
            timestamps.push(row.timestamp_local);
            variables.push(row.variable);
            values.push(row.value);
        }
        let written = values.len();

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM flux_statistics WHERE statistic = $1")
            .bind(statistic)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to clear {statistic} statistics"))?;

        sqlx::query(
            r#"
                INSERT INTO flux_statistics (statistic, timestamp_local, variable, value)
                SELECT $1, t.timestamp_local, t.variable, t.value
                FROM UNNEST($2::timestamp[], $3::text[], $4::float8[])
                    AS t(timestamp_local, variable, value)
            "#,
        )
        .bind(statistic)
        .bind(&timestamps)
        .bind(&variables)
        .bind(&values)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert {statistic} statistics"))?;

        tx.commit().await?;
        info!(statistic, rows = written, "Stored statistics");
        Ok(written)
    }
}

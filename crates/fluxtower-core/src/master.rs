use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use thiserror::Error;

use crate::frame::{self, TIMESTAMP};

pub const MASTER_FILE_NAME: &str = "master.parquet";

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("batch lacks master columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },
    #[error("batch lacks configured variables: {}", missing.join(", "))]
    MissingVariables { missing: Vec<String> },
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Appends the batch rows newer than the master's latest timestamp.
///
/// The batch is projected onto the master's columns (extra columns dropped, dtypes cast to
/// the master's). Appended rows are sorted and unique by timestamp, the later row winning a
/// duplicate. Merging the same batch again returns the master unchanged.
pub fn merge_into_master(master: &DataFrame, batch: &DataFrame) -> Result<DataFrame, MergeError> {
    let schema = frame::column_names(master);
    let missing = frame::missing_columns(batch, &schema);
    if !missing.is_empty() {
        return Err(MergeError::SchemaMismatch { missing });
    }

    let projected = batch.select(schema.iter().map(String::as_str))?;
    let master_max = frame::timestamp_values(master)?.into_iter().flatten().max();

    let appended = newest_unique_rows(&projected, master_max)?;
    if appended.height() == 0 {
        return Ok(master.clone());
    }

    let aligned: Vec<Column> = appended
        .get_columns()
        .iter()
        .zip(master.get_columns())
        .map(|(column, target)| column.cast(target.dtype()))
        .collect::<PolarsResult<_>>()?;
    let aligned = DataFrame::new(aligned)?;

    let mut merged = master.clone();
    merged.vstack_mut(&aligned)?;
    Ok(merged)
}

/// Creates the first master from a batch, fixing its schema to `timestamp` plus `variables`.
pub fn establish_master<S: AsRef<str>>(
    batch: &DataFrame,
    variables: &[S],
) -> Result<DataFrame, MergeError> {
    let mut schema: Vec<&str> = vec![TIMESTAMP];
    schema.extend(
        variables
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| *name != TIMESTAMP),
    );

    let missing = frame::missing_columns(batch, &schema);
    if !missing.is_empty() {
        return Err(MergeError::MissingVariables { missing });
    }

    let projected = batch.select(schema)?;
    newest_unique_rows(&projected, None)
}

fn newest_unique_rows(df: &DataFrame, after: Option<i64>) -> Result<DataFrame, MergeError> {
    let mut latest: BTreeMap<i64, IdxSize> = BTreeMap::new();
    for (row, timestamp) in frame::timestamp_values(df)?.into_iter().enumerate() {
        let Some(timestamp) = timestamp else {
            continue;
        };
        if after.map_or(true, |max| timestamp > max) {
            latest.insert(timestamp, row as IdxSize);
        }
    }
    Ok(frame::take_rows(df, latest.into_values().collect())?)
}

/// Parquet persistence for the master series.
#[derive(Debug, Clone)]
pub struct MasterStore {
    path: PathBuf,
}

impl MasterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(MASTER_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> crate::error::Result<Option<DataFrame>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        let df = ParquetReader::new(file).finish()?;
        Ok(Some(df))
    }

    /// Writes to a sibling temporary file and renames it over the master, so an interrupted
    /// save never leaves a truncated master behind.
    pub fn save(&self, df: &DataFrame) -> crate::error::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("parquet.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            let mut owned = df.clone();
            ParquetWriter::new(&mut file).finish(&mut owned)?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

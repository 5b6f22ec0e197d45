use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::frame;

pub const DEFAULT_QC_COLUMN: &str = "qc_co2_flux";
pub const DEFAULT_QC_KEEP_VALUE: f64 = 0.0;
pub const DEFAULT_USTAR_COLUMN: &str = "u*";
pub const DEFAULT_USTAR_THRESHOLD: f64 = 0.3;
pub const DEFAULT_FLUX_MIN: f64 = -500.0;
pub const DEFAULT_FLUX_MAX: f64 = 5e4;
pub const WIND_DIRECTION_COLUMN: &str = "wind_dir";

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter {criterion} references missing column '{column}'")]
    MissingColumn { criterion: String, column: String },
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Predicate over a single column. Missing values never satisfy a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterCriterion {
    /// Keep `value == value`.
    Equals { column: String, value: f64 },
    /// Keep `value >= threshold`.
    AtLeast { column: String, threshold: f64 },
    /// Keep `min < value < max`.
    Between { column: String, min: f64, max: f64 },
    /// Keep `|value - mean| <= tolerance`, the mean taken over the whole input.
    MeanDeviation { column: String, tolerance: f64 },
}

impl FilterCriterion {
    pub fn quality_flag(column: impl Into<String>, keep_value: f64) -> Self {
        Self::Equals {
            column: column.into(),
            value: keep_value,
        }
    }

    pub fn frictional_velocity(column: impl Into<String>, threshold: f64) -> Self {
        Self::AtLeast {
            column: column.into(),
            threshold,
        }
    }

    pub fn flux_bound(column: impl Into<String>, min: f64, max: f64) -> Self {
        Self::Between {
            column: column.into(),
            min,
            max,
        }
    }

    pub fn wind_direction(tolerance: f64) -> Self {
        Self::MeanDeviation {
            column: WIND_DIRECTION_COLUMN.to_string(),
            tolerance,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Equals { column, .. }
            | Self::AtLeast { column, .. }
            | Self::Between { column, .. }
            | Self::MeanDeviation { column, .. } => column,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Equals { column, value } => format!("{column} == {value}"),
            Self::AtLeast { column, threshold } => format!("{column} >= {threshold}"),
            Self::Between { column, min, max } => format!("{min} < {column} < {max}"),
            Self::MeanDeviation { column, tolerance } => {
                format!("|{column} - mean| <= {tolerance}")
            }
        }
    }

    /// Row mask for this criterion alone.
    pub fn mask(&self, values: &[Option<f64>]) -> Vec<bool> {
        match self {
            Self::Equals { value, .. } => values.iter().map(|v| *v == Some(*value)).collect(),
            Self::AtLeast { threshold, .. } => values
                .iter()
                .map(|v| v.is_some_and(|x| x >= *threshold))
                .collect(),
            Self::Between { min, max, .. } => values
                .iter()
                .map(|v| v.is_some_and(|x| x > *min && x < *max))
                .collect(),
            Self::MeanDeviation { tolerance, .. } => {
                let present: Vec<f64> = values.iter().flatten().copied().collect();
                if present.is_empty() {
                    return vec![false; values.len()];
                }
                let mean = present.iter().sum::<f64>() / present.len() as f64;
                values
                    .iter()
                    .map(|v| v.is_some_and(|x| (x - mean).abs() <= *tolerance))
                    .collect()
            }
        }
    }
}

/// Parameters of the standard filter chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDefaults {
    pub qc_column: String,
    pub qc_keep_value: f64,
    pub ustar_column: String,
    pub ustar_threshold: f64,
    pub flux_min: f64,
    pub flux_max: f64,
    /// Channels receiving the physical-bound filter, in application order.
    pub bounded_columns: Vec<String>,
    /// Optional wind-direction tolerance in degrees; not applied when absent.
    pub wind_direction_tolerance: Option<f64>,
}

impl Default for FilterDefaults {
    fn default() -> Self {
        Self {
            qc_column: DEFAULT_QC_COLUMN.to_string(),
            qc_keep_value: DEFAULT_QC_KEEP_VALUE,
            ustar_column: DEFAULT_USTAR_COLUMN.to_string(),
            ustar_threshold: DEFAULT_USTAR_THRESHOLD,
            flux_min: DEFAULT_FLUX_MIN,
            flux_max: DEFAULT_FLUX_MAX,
            bounded_columns: vec!["co2_flux".into(), "H".into(), "LE".into()],
            wind_direction_tolerance: None,
        }
    }
}

/// Quality flag, frictional velocity, then one bound per configured flux channel.
pub fn default_chain(defaults: &FilterDefaults) -> Vec<FilterCriterion> {
    let mut chain = vec![
        FilterCriterion::quality_flag(defaults.qc_column.clone(), defaults.qc_keep_value),
        FilterCriterion::frictional_velocity(
            defaults.ustar_column.clone(),
            defaults.ustar_threshold,
        ),
    ];
    chain.extend(defaults.bounded_columns.iter().map(|column| {
        FilterCriterion::flux_bound(column.clone(), defaults.flux_min, defaults.flux_max)
    }));
    if let Some(tolerance) = defaults.wind_direction_tolerance {
        chain.push(FilterCriterion::wind_direction(tolerance));
    }
    chain
}

/// Keeps the rows satisfying every criterion.
///
/// Each criterion is evaluated against the full input and the masks are intersected, so the
/// result does not depend on criterion order.
pub fn apply_filters(
    df: &DataFrame,
    criteria: &[FilterCriterion],
) -> Result<DataFrame, FilterError> {
    let mut keep = vec![true; df.height()];

    for criterion in criteria {
        if df.column(criterion.column()).is_err() {
            return Err(FilterError::MissingColumn {
                criterion: criterion.label(),
                column: criterion.column().to_string(),
            });
        }
        let values = frame::f64_values(df, criterion.column())?;
        let mask = criterion.mask(&values);
        debug!(
            criterion = %criterion.label(),
            passing = mask.iter().filter(|&&m| m).count(),
            rows = mask.len(),
            "Evaluated quality filter"
        );
        for (kept, passes) in keep.iter_mut().zip(mask) {
            *kept &= passes;
        }
    }

    let mask = BooleanChunked::new("keep".into(), keep.as_slice());
    Ok(df.filter(&mask)?)
}

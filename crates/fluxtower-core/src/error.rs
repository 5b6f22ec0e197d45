use std::path::PathBuf;

use thiserror::Error;

use crate::master::MergeError;
use crate::quality_filters::FilterError;
use crate::rolling::AggregateError;
use crate::time_grid::GridError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error("stage {stage} requires '{field}', which no earlier stage produces")]
    UnsatisfiedRequirement { stage: String, field: &'static str },

    #[error("stage {stage} requires context field '{field}'")]
    MissingContext {
        stage: &'static str,
        field: &'static str,
    },

    #[error("stage {stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("checkpoint {path} is unreadable: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("data validation failed: {0}")]
    DataValidation(String),

    #[error("master series merge failed: {0}")]
    Merge(MergeError),

    #[error("quality filter failed: {0}")]
    Filter(FilterError),

    #[error("time grid operation failed: {0}")]
    Grid(#[from] GridError),

    #[error("rolling aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("failed to parse {path}: {source}")]
    Parser {
        path: PathBuf,
        #[source]
        source: fluxtower_parser::ParserError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<MergeError> for PipelineError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::MissingVariables { missing } => PipelineError::DataValidation(format!(
                "batch is missing configured variables: {}",
                missing.join(", ")
            )),
            other => PipelineError::Merge(other),
        }
    }
}

impl From<FilterError> for PipelineError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::MissingColumn { criterion, column } => PipelineError::DataValidation(
                format!("filter {criterion} needs column '{column}', which is absent"),
            ),
            other => PipelineError::Filter(other),
        }
    }
}

impl PipelineError {
    /// The error raised inside a stage, with any `Stage` wrapping removed.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

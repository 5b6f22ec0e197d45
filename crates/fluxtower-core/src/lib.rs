pub mod checkpoint;
pub mod config;
pub mod context;
#[cfg(feature = "runtime")]
pub mod db;
pub mod error;
pub mod filenames;
pub mod frame;
pub mod master;
pub mod pipeline;
pub mod quality_filters;
pub mod remote;
pub mod rolling;
pub mod stages;
pub mod storage;
pub mod time_grid;
pub mod transfer;
pub mod units;

pub use config::PipelineConfig;
pub use context::{ContextUpdate, PipelineContext};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, RunOutcome};
pub use stages::{Stage, StageExit, StageId, StageOutcome, StageRegistry};

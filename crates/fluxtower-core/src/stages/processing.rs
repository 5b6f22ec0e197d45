use std::fs;
use std::path::{Path, PathBuf};

use fluxtower_parser::{parse_ep_summary, ParserError};
use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

use crate::context::{ContextUpdate, PipelineContext};
use crate::error::{PipelineError, Result};
use crate::frame::{self, TIMESTAMP};
use crate::master::{establish_master, merge_into_master, MasterStore};
use crate::quality_filters::{apply_filters, default_chain};
use crate::rolling::aggregate;
use crate::units::convert_units;

use super::{Stage, StageExit, StageId, StageOutcome};

pub const EP_SUMMARY_PATTERN: &str = "*EP-Summary*.txt";

pub struct LoadSummariesStage;

impl Stage for LoadSummariesStage {
    fn name(&self) -> &str {
        StageId::LoadSummaries.name()
    }

    fn run(&self, context: &PipelineContext) -> Result<StageOutcome> {
        let directory = context.config.summaries_dir();
        let paths = summary_paths(&directory)?;
        if paths.is_empty() {
            warn!(directory = %directory.display(), "No EP-Summary files found");
            return Ok(StageOutcome::Exit(StageExit::NoSummaryFiles { directory }));
        }

        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = fs::read_to_string(&path)?;
            match parse_ep_summary(&contents) {
                Ok(parsed) => {
                    debug!(
                        file = %path.display(),
                        rows = parsed.df.height(),
                        skipped_columns = parsed.skipped_columns.len(),
                        "Parsed summary file"
                    );
                    frames.push(parsed.df);
                }
                Err(ParserError::EmptyData { .. }) => {
                    warn!(file = %path.display(), "Summary file has no data rows; skipping");
                }
                Err(source) => return Err(PipelineError::Parser { path, source }),
            }
        }

        if frames.is_empty() {
            return Ok(StageOutcome::Exit(StageExit::NoSummaryFiles { directory }));
        }

        let files = frames.len();
        let batch = frame::stack_aligned(frames)?;
        info!(files, rows = batch.height(), "Loaded summary batch");
        Ok(ContextUpdate::new().data(batch).into())
    }
}

fn summary_paths(directory: &Path) -> Result<Vec<PathBuf>> {
    let pattern = directory.join(EP_SUMMARY_PATTERN);
    let mut paths = Vec::new();
    for entry in glob::glob(&pattern.to_string_lossy())? {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "Could not read path from glob pattern"),
        }
    }
    paths.sort();
    Ok(paths)
}

pub struct UpdateMasterStage;

impl Stage for UpdateMasterStage {
    fn name(&self) -> &str {
        StageId::UpdateMaster.name()
    }

    fn run(&self, context: &PipelineContext) -> Result<StageOutcome> {
        let batch = context.require_data(StageId::UpdateMaster.name())?;
        frame::require_columns(batch, &[TIMESTAMP], "master update")?;

        let store = MasterStore::new(context.config.master_path());
        let (master, previous_rows) = match store.load()? {
            Some(existing) => {
                let rows = existing.height();
                (merge_into_master(&existing, batch)?, rows)
            }
            None => {
                info!(path = %store.path().display(), "Creating master series");
                (establish_master(batch, &context.config.variables)?, 0)
            }
        };

        store.save(&master)?;
        info!(
            appended = master.height() - previous_rows,
            rows = master.height(),
            "Master series updated"
        );
        Ok(ContextUpdate::new().data(master).into())
    }
}

pub struct ConvertUnitsStage;

impl Stage for ConvertUnitsStage {
    fn name(&self) -> &str {
        StageId::ConvertUnits.name()
    }

    fn run(&self, context: &PipelineContext) -> Result<StageOutcome> {
        let data = context.require_data(StageId::ConvertUnits.name())?;
        let converted = convert_units(data, &context.config.units)?;
        Ok(ContextUpdate::new().data(converted).into())
    }
}

pub struct FilterQualityStage;

impl Stage for FilterQualityStage {
    fn name(&self) -> &str {
        StageId::FilterQuality.name()
    }

    fn run(&self, context: &PipelineContext) -> Result<StageOutcome> {
        let data = context.require_data(StageId::FilterQuality.name())?;
        let chain = default_chain(&context.config.filters);
        let filtered = apply_filters(data, &chain)?;
        info!(
            criteria = chain.len(),
            rows_in = data.height(),
            rows_out = filtered.height(),
            "Applied quality filters"
        );
        Ok(ContextUpdate::new().data(filtered).into())
    }
}

pub struct RollingStatisticsStage;

impl Stage for RollingStatisticsStage {
    fn name(&self) -> &str {
        StageId::RollingStatistics.name()
    }

    fn run(&self, context: &PipelineContext) -> Result<StageOutcome> {
        let data: &DataFrame = context.require_data(StageId::RollingStatistics.name())?;
        frame::require_columns(data, &[TIMESTAMP], "rolling statistics")?;

        let config = &context.config;
        let statistics = aggregate(data, &config.window, config.grid_interval())?;
        info!(
            window = config.window.size,
            min_periods = config.window.min_periods,
            slots = statistics.mean.height(),
            "Computed rolling statistics"
        );
        Ok(ContextUpdate::new()
            .daily_statistics(statistics.mean, statistics.std_dev)
            .into())
    }
}

//! The closed set of pipeline stages and the registry resolving their names.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::context::{ContextUpdate, PipelineContext};
use crate::error::{PipelineError, Result};
use crate::remote::{FileTransfer, LivenessProbe};

mod acquisition;
mod processing;

pub use acquisition::{
    DownloadSummariesStage, LoadCheckpointStage, ProbeInstrumentStage, RecordContactStage,
    RecordManifestStage,
};
pub use processing::{
    ConvertUnitsStage, FilterQualityStage, LoadSummariesStage, RollingStatisticsStage,
    UpdateMasterStage, EP_SUMMARY_PATTERN,
};

pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, context: &PipelineContext) -> Result<StageOutcome>;
}

#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// Fields to merge into the context before the next stage runs.
    Update(ContextUpdate),
    /// Ends the run; remaining stages are skipped.
    Exit(StageExit),
}

impl StageOutcome {
    pub fn unchanged() -> Self {
        StageOutcome::Update(ContextUpdate::new())
    }
}

impl From<ContextUpdate> for StageOutcome {
    fn from(update: ContextUpdate) -> Self {
        StageOutcome::Update(update)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageExit {
    NoSummaryFiles { directory: PathBuf },
    Halted(String),
}

impl fmt::Display for StageExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageExit::NoSummaryFiles { directory } => {
                write!(f, "no EP-Summary files in {}", directory.display())
            }
            StageExit::Halted(reason) => write!(f, "halted: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageId {
    LoadCheckpoint,
    ProbeInstrument,
    DownloadSummaries,
    RecordContact,
    RecordManifest,
    LoadSummaries,
    UpdateMaster,
    ConvertUnits,
    FilterQuality,
    RollingStatistics,
}

impl StageId {
    pub const ALL: [StageId; 10] = [
        StageId::LoadCheckpoint,
        StageId::ProbeInstrument,
        StageId::DownloadSummaries,
        StageId::RecordContact,
        StageId::RecordManifest,
        StageId::LoadSummaries,
        StageId::UpdateMaster,
        StageId::ConvertUnits,
        StageId::FilterQuality,
        StageId::RollingStatistics,
    ];

    pub const DEFAULT_PIPELINE: &'static [StageId] = &Self::ALL;

    pub fn name(self) -> &'static str {
        match self {
            StageId::LoadCheckpoint => "load_checkpoint",
            StageId::ProbeInstrument => "probe_instrument",
            StageId::DownloadSummaries => "download_summaries",
            StageId::RecordContact => "record_contact",
            StageId::RecordManifest => "record_manifest",
            StageId::LoadSummaries => "load_summaries",
            StageId::UpdateMaster => "update_master",
            StageId::ConvertUnits => "convert_units",
            StageId::FilterQuality => "filter_quality",
            StageId::RollingStatistics => "rolling_statistics",
        }
    }

    pub fn descriptor(self) -> &'static StageDescriptor {
        &STAGES[self as usize]
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageId {
    type Err = PipelineError;

    fn from_str(name: &str) -> Result<Self> {
        StageId::ALL
            .into_iter()
            .find(|id| id.name() == name)
            .ok_or_else(|| PipelineError::UnknownStage(name.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub id: StageId,
    pub requires: &'static [&'static str],
    pub produces: &'static [&'static str],
    pub description: &'static str,
}

static STAGES: Lazy<Vec<StageDescriptor>> = Lazy::new(|| {
    vec![
        StageDescriptor {
            id: StageId::LoadCheckpoint,
            requires: &[],
            produces: &["last_contact", "files_downloaded"],
            description: "Read the last contact time and transfer manifest",
        },
        StageDescriptor {
            id: StageId::ProbeInstrument,
            requires: &["last_contact"],
            produces: &["this_contact"],
            description: "Ping the instrument; keep the previous contact when unreachable",
        },
        StageDescriptor {
            id: StageId::DownloadSummaries,
            requires: &["last_contact"],
            produces: &["files_downloaded", "transfer_report"],
            description: "Copy missing daily summary files from the instrument",
        },
        StageDescriptor {
            id: StageId::RecordContact,
            requires: &["this_contact"],
            produces: &[],
            description: "Persist this run's contact time",
        },
        StageDescriptor {
            id: StageId::RecordManifest,
            requires: &["files_downloaded"],
            produces: &[],
            description: "Persist the transfer manifest",
        },
        StageDescriptor {
            id: StageId::LoadSummaries,
            requires: &[],
            produces: &["data"],
            description: "Parse every local EP-Summary file into one batch",
        },
        StageDescriptor {
            id: StageId::UpdateMaster,
            requires: &["data"],
            produces: &["data"],
            description: "Append newer observations to the master series",
        },
        StageDescriptor {
            id: StageId::ConvertUnits,
            requires: &["data"],
            produces: &["data"],
            description: "Convert fluxes, densities and temperature to reporting units",
        },
        StageDescriptor {
            id: StageId::FilterQuality,
            requires: &["data"],
            produces: &["data"],
            description: "Drop observations failing the quality-control chain",
        },
        StageDescriptor {
            id: StageId::RollingStatistics,
            requires: &["data"],
            produces: &["daily_mean", "daily_sd"],
            description: "Centered daily rolling mean and standard deviation",
        },
    ]
});

pub fn all_stage_descriptors() -> &'static [StageDescriptor] {
    STAGES.as_slice()
}

/// Maps stage identifiers to their implementations.
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: BTreeMap<StageId, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// Every built-in stage, wired to the given instrument collaborators.
    pub fn standard(transfer: Arc<dyn FileTransfer>, probe: Arc<dyn LivenessProbe>) -> Self {
        let mut registry = Self::default();
        for id in StageId::ALL {
            let stage: Arc<dyn Stage> = match id {
                StageId::LoadCheckpoint => Arc::new(LoadCheckpointStage),
                StageId::ProbeInstrument => Arc::new(ProbeInstrumentStage::new(probe.clone())),
                StageId::DownloadSummaries => {
                    Arc::new(DownloadSummariesStage::new(transfer.clone()))
                }
                StageId::RecordContact => Arc::new(RecordContactStage),
                StageId::RecordManifest => Arc::new(RecordManifestStage),
                StageId::LoadSummaries => Arc::new(LoadSummariesStage),
                StageId::UpdateMaster => Arc::new(UpdateMasterStage),
                StageId::ConvertUnits => Arc::new(ConvertUnitsStage),
                StageId::FilterQuality => Arc::new(FilterQualityStage),
                StageId::RollingStatistics => Arc::new(RollingStatisticsStage),
            };
            registry.stages.insert(id, stage);
        }
        registry
    }

    pub fn with_stage(mut self, id: StageId, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(id, stage);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Stage>> {
        let id: StageId = name.parse()?;
        self.stages
            .get(&id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownStage(name.to_string()))
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stages.keys()).finish()
    }
}

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::context::{ContextUpdate, PipelineContext};
use crate::error::Result;
use crate::filenames::{expected_summary_filenames, truncate_to_hour};
use crate::remote::{FileTransfer, LivenessProbe};
use crate::transfer::{list_local_files, transfer_missing_files, SUMMARIES_CATEGORY};

use super::{Stage, StageId, StageOutcome};

pub struct LoadCheckpointStage;

impl Stage for LoadCheckpointStage {
    fn name(&self) -> &str {
        StageId::LoadCheckpoint.name()
    }

    fn run(&self, context: &PipelineContext) -> Result<StageOutcome> {
        let store = CheckpointStore::new(&context.config.data_dir);

        let last_contact = match store.load_last_contact()? {
            Some(last_contact) => last_contact,
            None => {
                info!(
                    initial_contact = %context.config.initial_contact,
                    "No contact checkpoint; starting from the initial contact"
                );
                context.config.initial_contact
            }
        };

        let mut update = ContextUpdate::new().last_contact(last_contact);
        if let Some(manifest) = store.load_manifest()? {
            update = update.files_downloaded(manifest);
        }
        Ok(update.into())
    }
}

pub struct ProbeInstrumentStage {
    probe: Arc<dyn LivenessProbe>,
}

impl ProbeInstrumentStage {
    pub fn new(probe: Arc<dyn LivenessProbe>) -> Self {
        Self { probe }
    }
}

impl Stage for ProbeInstrumentStage {
    fn name(&self) -> &str {
        StageId::ProbeInstrument.name()
    }

    fn run(&self, context: &PipelineContext) -> Result<StageOutcome> {
        let last_contact = context.require_last_contact(StageId::ProbeInstrument.name())?;

        let this_contact = match self.probe.probe() {
            Ok(()) => {
                info!(host = %context.config.instrument.host, "Instrument reachable");
                context.started_at
            }
            Err(err) => {
                warn!(
                    host = %context.config.instrument.host,
                    error = %err,
                    "Instrument unreachable; keeping previous contact"
                );
                last_contact
            }
        };

        Ok(ContextUpdate::new().this_contact(this_contact).into())
    }
}

pub struct DownloadSummariesStage {
    transfer: Arc<dyn FileTransfer>,
}

impl DownloadSummariesStage {
    pub fn new(transfer: Arc<dyn FileTransfer>) -> Self {
        Self { transfer }
    }
}

impl Stage for DownloadSummariesStage {
    fn name(&self) -> &str {
        StageId::DownloadSummaries.name()
    }

    fn run(&self, context: &PipelineContext) -> Result<StageOutcome> {
        let config = &context.config;
        let last_contact = context.require_last_contact(StageId::DownloadSummaries.name())?;

        // Today's files are still being written on the instrument.
        let window_start = truncate_to_hour(last_contact);
        let window_end = context.started_at - Duration::days(1);
        let expected = expected_summary_filenames(
            window_start,
            window_end,
            config.transfer_lag(),
            &config.instrument.logger_id,
        );

        let local_dir = config.summaries_dir();
        let report = transfer_missing_files(
            self.transfer.as_ref(),
            SUMMARIES_CATEGORY,
            &expected,
            &config.instrument.remote_data_dir,
            &local_dir,
        )?;

        info!(
            expected = expected.len(),
            already_present = report.already_present,
            transferred = report.transferred().count(),
            failed = report.failed_count(),
            "Summary download finished"
        );

        let mut manifest = context.files_downloaded.clone().unwrap_or_default();
        manifest.insert(SUMMARIES_CATEGORY.to_string(), list_local_files(&local_dir)?);

        Ok(ContextUpdate::new()
            .files_downloaded(manifest)
            .transfer_report(report)
            .into())
    }
}

pub struct RecordContactStage;

impl Stage for RecordContactStage {
    fn name(&self) -> &str {
        StageId::RecordContact.name()
    }

    fn run(&self, context: &PipelineContext) -> Result<StageOutcome> {
        let this_contact = context.require_this_contact(StageId::RecordContact.name())?;
        CheckpointStore::new(&context.config.data_dir).save_last_contact(this_contact)?;
        info!(last_contact = %this_contact, "Recorded contact time");
        Ok(StageOutcome::unchanged())
    }
}

pub struct RecordManifestStage;

impl Stage for RecordManifestStage {
    fn name(&self) -> &str {
        StageId::RecordManifest.name()
    }

    fn run(&self, context: &PipelineContext) -> Result<StageOutcome> {
        let manifest = context.require_files_downloaded(StageId::RecordManifest.name())?;
        CheckpointStore::new(&context.config.data_dir).save_manifest(manifest)?;
        info!(
            categories = manifest.len(),
            files = manifest.values().map(Vec::len).sum::<usize>(),
            "Recorded transfer manifest"
        );
        Ok(StageOutcome::unchanged())
    }
}

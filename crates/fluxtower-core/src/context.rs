use std::sync::Arc;

use chrono::NaiveDateTime;
use polars::prelude::DataFrame;

use crate::checkpoint::Manifest;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::transfer::TransferReport;

/// State shared by every stage of one run.
///
/// Stages only read it; the engine merges each stage's [`ContextUpdate`] after it returns.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    /// Wall-clock time the run started, in the instrument's naive local time.
    pub started_at: NaiveDateTime,
    pub pipeline_index: usize,
    /// Number of updates merged so far.
    pub revision: usize,
    pub last_contact: Option<NaiveDateTime>,
    pub this_contact: Option<NaiveDateTime>,
    pub files_downloaded: Option<Manifest>,
    pub transfer_report: Option<TransferReport>,
    pub data: Option<DataFrame>,
    pub daily_mean: Option<DataFrame>,
    pub daily_sd: Option<DataFrame>,
}

impl PipelineContext {
    pub fn new(config: Arc<PipelineConfig>, started_at: NaiveDateTime) -> Self {
        Self {
            config,
            started_at,
            pipeline_index: 0,
            revision: 0,
            last_contact: None,
            this_contact: None,
            files_downloaded: None,
            transfer_report: None,
            data: None,
            daily_mean: None,
            daily_sd: None,
        }
    }

    /// Shallow merge: every field set in `update` replaces the current value.
    /// An empty update leaves `revision` unchanged.
    pub fn apply(&mut self, update: ContextUpdate) {
        if update.is_empty() {
            return;
        }
        let ContextUpdate {
            last_contact,
            this_contact,
            files_downloaded,
            transfer_report,
            data,
            daily_mean,
            daily_sd,
        } = update;

        if last_contact.is_some() {
            self.last_contact = last_contact;
        }
        if this_contact.is_some() {
            self.this_contact = this_contact;
        }
        if files_downloaded.is_some() {
            self.files_downloaded = files_downloaded;
        }
        if transfer_report.is_some() {
            self.transfer_report = transfer_report;
        }
        if data.is_some() {
            self.data = data;
        }
        if daily_mean.is_some() {
            self.daily_mean = daily_mean;
        }
        if daily_sd.is_some() {
            self.daily_sd = daily_sd;
        }
        self.revision += 1;
    }

    pub fn require_last_contact(&self, stage: &'static str) -> Result<NaiveDateTime> {
        self.last_contact.ok_or(missing(stage, "last_contact"))
    }

    pub fn require_this_contact(&self, stage: &'static str) -> Result<NaiveDateTime> {
        self.this_contact.ok_or(missing(stage, "this_contact"))
    }

    pub fn require_files_downloaded(&self, stage: &'static str) -> Result<&Manifest> {
        self.files_downloaded
            .as_ref()
            .ok_or_else(|| missing(stage, "files_downloaded"))
    }

    pub fn require_data(&self, stage: &'static str) -> Result<&DataFrame> {
        self.data.as_ref().ok_or_else(|| missing(stage, "data"))
    }
}

fn missing(stage: &'static str, field: &'static str) -> PipelineError {
    PipelineError::MissingContext { stage, field }
}

/// Fields produced by one stage; unset fields leave the context untouched.
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    pub last_contact: Option<NaiveDateTime>,
    pub this_contact: Option<NaiveDateTime>,
    pub files_downloaded: Option<Manifest>,
    pub transfer_report: Option<TransferReport>,
    pub data: Option<DataFrame>,
    pub daily_mean: Option<DataFrame>,
    pub daily_sd: Option<DataFrame>,
}

impl ContextUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.last_contact.is_none()
            && self.this_contact.is_none()
            && self.files_downloaded.is_none()
            && self.transfer_report.is_none()
            && self.data.is_none()
            && self.daily_mean.is_none()
            && self.daily_sd.is_none()
    }

    pub fn last_contact(mut self, value: NaiveDateTime) -> Self {
        self.last_contact = Some(value);
        self
    }

    pub fn this_contact(mut self, value: NaiveDateTime) -> Self {
        self.this_contact = Some(value);
        self
    }

    pub fn files_downloaded(mut self, value: Manifest) -> Self {
        self.files_downloaded = Some(value);
        self
    }

    pub fn transfer_report(mut self, value: TransferReport) -> Self {
        self.transfer_report = Some(value);
        self
    }

    pub fn data(mut self, value: DataFrame) -> Self {
        self.data = Some(value);
        self
    }

    pub fn daily_statistics(mut self, mean: DataFrame, std_dev: DataFrame) -> Self {
        self.daily_mean = Some(mean);
        self.daily_sd = Some(std_dev);
        self
    }
}

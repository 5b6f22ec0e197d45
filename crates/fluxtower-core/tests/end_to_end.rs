mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use fluxtower_core::checkpoint::CheckpointStore;
use fluxtower_core::master::MasterStore;
use fluxtower_core::remote::{FileTransfer, LivenessError, LivenessProbe, TransferError};
use fluxtower_core::transfer::SUMMARIES_CATEGORY;
use fluxtower_core::{
    Pipeline, PipelineConfig, PipelineContext, PipelineError, RunOutcome, StageExit,
    StageRegistry,
};
use polars::prelude::{NamedFrom, Series};

use common::{assert_close, fixture_path, temp_dir, timestamps, ts, values, SUMMARY_FIXTURE};

/// Serves the parser fixture for its own name and fails for every other file.
struct FixtureTransfer;

impl FileTransfer for FixtureTransfer {
    fn fetch(&self, remote_path: &str, local_dir: &Path) -> Result<(), TransferError> {
        let name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        if name != SUMMARY_FIXTURE {
            return Err(TransferError::Failed {
                program: "scp",
                status: "exit status: 1".into(),
                stderr: format!("{name}: No such file or directory"),
            });
        }
        fs::copy(fixture_path(SUMMARY_FIXTURE), local_dir.join(name))
            .map(|_| ())
            .map_err(|source| TransferError::Launch {
                program: "scp",
                source,
            })
    }
}

struct Reachable;

impl LivenessProbe for Reachable {
    fn probe(&self) -> Result<(), LivenessError> {
        Ok(())
    }
}

fn config(data_dir: &Path) -> Arc<PipelineConfig> {
    Arc::new(PipelineConfig {
        data_dir: data_dir.to_path_buf(),
        initial_contact: NaiveDate::from_ymd_opt(2023, 5, 31)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .expect("valid date"),
        ..PipelineConfig::default()
    })
}

fn run(config: &Arc<PipelineConfig>) -> Result<(PipelineContext, RunOutcome), PipelineError> {
    let registry = StageRegistry::standard(Arc::new(FixtureTransfer), Arc::new(Reachable));
    let pipeline = Pipeline::from_names(&config.stages, &registry)?;
    let mut context = PipelineContext::new(Arc::clone(config), ts("2023-06-03 12:00"));
    let outcome = pipeline.run(&mut context)?;
    Ok((context, outcome))
}

#[test]
fn default_pipeline_processes_downloaded_summary() -> anyhow::Result<()> {
    let dir = temp_dir("e2e");
    let config = config(&dir);

    let (context, outcome) = run(&config)?;
    assert_eq!(outcome, RunOutcome::Completed);

    // 2023-05-29 (lag of two days) through 2023-06-02: five dates, two files each.
    let report = context.transfer_report.as_ref().expect("transfer report");
    assert_eq!(report.results.len(), 10);
    assert_eq!(report.transferred().collect::<Vec<_>>(), vec![SUMMARY_FIXTURE]);
    assert_eq!(report.failed_count(), 9);

    let checkpoints = CheckpointStore::new(&dir);
    assert_eq!(checkpoints.load_last_contact()?, Some(ts("2023-06-03 12:00")));
    let manifest = checkpoints.load_manifest()?.expect("manifest written");
    assert_eq!(manifest[SUMMARIES_CATEGORY], vec![SUMMARY_FIXTURE.to_string()]);

    let master = MasterStore::new(config.master_path())
        .load()?
        .expect("master written");
    assert_eq!(master.height(), 4);
    assert_eq!(master.width(), 1 + config.variables.len());

    // Quality filters keep 00:00 and 01:00; the gap at 00:30 becomes a placeholder slot.
    let mean = context.daily_mean.as_ref().expect("daily mean");
    let std_dev = context.daily_sd.as_ref().expect("daily sd");
    assert_eq!(
        timestamps(mean),
        vec![
            ts("2023-06-01 00:00"),
            ts("2023-06-01 00:30"),
            ts("2023-06-01 01:00"),
        ]
    );
    for value in values(mean, "v_sd") {
        assert_close(value, 0.55);
    }
    assert_close(values(mean, "air_temperature")[1], 16.5);
    assert_close(values(std_dev, "v_sd")[0], 0.005_f64.sqrt());

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn second_run_leaves_master_unchanged() -> anyhow::Result<()> {
    let dir = temp_dir("e2e-rerun");
    let config = config(&dir);

    run(&config)?;
    let store = MasterStore::new(config.master_path());
    let first = store.load()?.expect("master written");

    let (context, outcome) = run(&config)?;
    assert_eq!(outcome, RunOutcome::Completed);
    let report = context.transfer_report.as_ref().expect("transfer report");
    assert_eq!(report.already_present, 1);
    assert_eq!(report.transferred().count(), 0);

    let second = store.load()?.expect("master still present");
    assert!(first.equals_missing(&second));

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn empty_summaries_directory_exits_early() -> anyhow::Result<()> {
    let dir = temp_dir("e2e-empty");
    let config = Arc::new(PipelineConfig {
        data_dir: dir.clone(),
        stages: vec!["load_summaries".into(), "update_master".into()],
        ..PipelineConfig::default()
    });

    let (context, outcome) = run(&config)?;

    assert_eq!(
        outcome,
        RunOutcome::Exited {
            stage: "load_summaries".into(),
            exit: StageExit::NoSummaryFiles {
                directory: config.summaries_dir(),
            },
        }
    );
    assert!(context.data.is_none());
    assert!(!config.master_path().exists());

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn schema_mismatch_leaves_master_untouched() -> anyhow::Result<()> {
    let dir = temp_dir("e2e-schema");
    let summaries = dir.join(SUMMARIES_CATEGORY);
    fs::create_dir_all(&summaries)?;
    fs::copy(fixture_path(SUMMARY_FIXTURE), summaries.join(SUMMARY_FIXTURE))?;

    let base = PipelineConfig {
        data_dir: dir.clone(),
        stages: vec!["load_summaries".into(), "update_master".into()],
        ..PipelineConfig::default()
    };
    // The first master fixes the schema; a batch lacking a master column is rejected.
    let master_path = base.master_path();
    let store = MasterStore::new(&master_path);
    let batch = fluxtower_parser::parse_ep_summary(&fs::read_to_string(
        fixture_path(SUMMARY_FIXTURE),
    )?)?
    .df;
    let mut master = fluxtower_core::master::establish_master(&batch, &base.variables)?;
    let rows = master.height();
    master.with_column(Series::new(
        "not_in_summaries".into(),
        vec![Some(1.0_f64); rows],
    ))?;
    store.save(&master)?;

    let err = run(&Arc::new(base)).unwrap_err();
    assert!(matches!(err.root(), PipelineError::Merge(_)));

    let reloaded = store.load()?.expect("master kept");
    assert!(reloaded.equals_missing(&master));

    fs::remove_dir_all(dir)?;
    Ok(())
}

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use fluxtower_core::{
    db,
    filenames::{expected_summary_filenames, list_raw_filenames_in_time_window},
    remote::{PingProbe, ScpTransfer},
    stages::all_stage_descriptors,
    storage::{store_statistics, MEAN_STATISTIC, STD_DEV_STATISTIC},
    transfer::{TransferOutcome, TransferReport},
    Pipeline, PipelineConfig, PipelineContext, RunOutcome, StageRegistry,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Eddy-covariance flux tower processing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download new summaries, update the master series and compute rolling statistics
    Run(RunArgs),
    /// Print the summary file names expected for a time window
    Filenames(FilenamesArgs),
    /// Apply the embedded database migrations
    Migrate,
    /// List the available pipeline stages
    Stages,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// TOML configuration file; defaults and FLUXTOWER_* variables apply without one
    #[arg(long)]
    config: Option<PathBuf>,
    /// Store the rolling statistics in Postgres (DATABASE_URL)
    #[arg(long)]
    store: bool,
    /// Skip running embedded database migrations before storing
    #[arg(long)]
    skip_migrations: bool,
    /// Write the transfer report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FilenamesArgs {
    /// Window start, `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`
    #[arg(long, value_parser = parse_datetime)]
    start: NaiveDateTime,
    /// Window end (inclusive), same formats as `--start`
    #[arg(long, value_parser = parse_datetime)]
    end: NaiveDateTime,
    /// Days subtracted from the start
    #[arg(long, default_value_t = 0)]
    lag_days: i64,
    #[arg(long)]
    logger_id: Option<String>,
    /// List raw `.ghg` files instead of daily summaries
    #[arg(long)]
    raw: bool,
    /// Spacing of raw files in minutes
    #[arg(long, default_value_t = 30)]
    step_minutes: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => handle_run(args).await,
        Command::Filenames(args) => handle_filenames(args),
        Command::Migrate => handle_migrate().await,
        Command::Stages => handle_stages(),
    }
}

async fn handle_run(args: RunArgs) -> Result<()> {
    dotenvy::dotenv().ok();

    let config = PipelineConfig::load(args.config.as_deref())
        .context("failed to load pipeline configuration")?;
    let config = Arc::new(config);

    let registry = StageRegistry::standard(
        Arc::new(ScpTransfer::from_config(&config.instrument)),
        Arc::new(PingProbe::from_config(&config.instrument)),
    );
    let pipeline = Pipeline::from_names(&config.stages, &registry)
        .context("failed to build pipeline from configured stages")?;

    let run_id = Uuid::new_v4();
    let started_at = Local::now().naive_local();
    info!(%run_id, %started_at, stages = ?pipeline.stage_names(), "Starting run");

    let context = PipelineContext::new(Arc::clone(&config), started_at);
    let (context, outcome) = tokio::task::spawn_blocking(move || {
        let mut context = context;
        let outcome = pipeline.run(&mut context);
        (context, outcome)
    })
    .await
    .context("pipeline task panicked")?;

    if let Some(report) = &context.transfer_report {
        print_transfer_report(report);
        if let Some(path) = &args.report {
            std::fs::write(path, serde_json::to_vec_pretty(report)?)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
        }
    }

    match outcome.with_context(|| format!("run {run_id} failed"))? {
        RunOutcome::Completed => info!(%run_id, "Run completed"),
        RunOutcome::Exited { stage, exit } => {
            info!(%run_id, %stage, %exit, "Run ended early");
            return Ok(());
        }
    }

    if !args.store {
        return Ok(());
    }

    let (Some(mean), Some(std_dev)) = (&context.daily_mean, &context.daily_sd) else {
        warn!(%run_id, "Run produced no statistics; nothing to store");
        return Ok(());
    };

    let pool = db::connect(&database_url()?).await?;
    if args.skip_migrations {
        info!("Skipping migrations at user request");
    } else {
        db::run_migrations(&pool).await?;
    }

    let mean_rows = store_statistics(&pool, MEAN_STATISTIC, mean).await?;
    let sd_rows = store_statistics(&pool, STD_DEV_STATISTIC, std_dev).await?;
    println!("Stored {mean_rows} mean and {sd_rows} standard deviation values.");

    Ok(())
}

fn handle_filenames(args: FilenamesArgs) -> Result<()> {
    if args.end < args.start {
        bail!("--end must not precede --start");
    }
    let logger_id = args
        .logger_id
        .unwrap_or_else(|| PipelineConfig::default().instrument.logger_id);

    let names = if args.raw {
        if args.step_minutes <= 0 {
            bail!("--step-minutes must be positive");
        }
        list_raw_filenames_in_time_window(
            args.start - Duration::days(args.lag_days),
            args.end,
            Duration::minutes(args.step_minutes),
            &logger_id,
        )
    } else {
        expected_summary_filenames(
            args.start,
            args.end,
            Duration::days(args.lag_days),
            &logger_id,
        )
    };

    for name in names {
        println!("{name}");
    }
    Ok(())
}

async fn handle_migrate() -> Result<()> {
    dotenvy::dotenv().ok();
    let pool = db::connect(&database_url()?).await?;
    db::run_migrations(&pool).await?;
    println!("Migrations applied.");
    Ok(())
}

fn handle_stages() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Stage", "Requires", "Produces", "Description"]);
    for descriptor in all_stage_descriptors() {
        table.add_row(vec![
            descriptor.id.name().to_string(),
            descriptor.requires.join(", "),
            descriptor.produces.join(", "),
            descriptor.description.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn print_transfer_report(report: &TransferReport) {
    println!(
        "{}: {} already present, {} transferred, {} failed",
        report.category,
        report.already_present,
        report.transferred().count(),
        report.failed_count()
    );
    if report.results.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["File", "Status", "Reason"]);
    for result in &report.results {
        let (status, reason) = match &result.outcome {
            TransferOutcome::Transferred => ("transferred", ""),
            TransferOutcome::Failed { reason } => ("failed", reason.as_str()),
        };
        table.add_row(vec![result.file_name.as_str(), status, reason]);
    }
    println!("{table}");
}

fn database_url() -> Result<String> {
    env::var("DATABASE_URL")
        .or_else(|_| env::var("FLUXTOWER_DATABASE_URL"))
        .context("DATABASE_URL (or FLUXTOWER_DATABASE_URL) must be set")
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime, String> {
    if let Ok(datetime) = value.parse::<NaiveDateTime>() {
        return Ok(datetime);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("'{value}' is neither YYYY-MM-DD nor YYYY-MM-DDTHH:MM:SS"))
}

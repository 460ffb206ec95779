//! clinlytix - feasibility + survival pipeline over a data directory
//!
//! ```bash
//! clinlytix [--data-dir <DIR>] [--config <FILE>] <clean|feasibility|survival|run|schedule>
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use clinlytix::{
    config::{Config, DataLayout},
    pipeline::{schedule, DailySchedule, Executor, RetryPolicy, TaskState},
    stages,
};

#[derive(Parser, Debug)]
#[command(name = "clinlytix", version)]
#[command(about = "Trial feasibility and survival analytics pipeline")]
struct Cli {
    /// Data directory holding the raw extracts; outputs land here too
    #[arg(long, global = true, env = "CLINLYTIX_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clean the raw extracts into the *_cleaned tables
    Clean,
    /// Write the site feasibility report from the cleaned tables
    Feasibility,
    /// Write km curves and the cox summary from the cleaned patients
    Survival,
    /// Run the whole pipeline now
    Run,
    /// Report whether today's daily run is due
    Schedule {
        /// Run the pipeline if it is due
        #[arg(long)]
        execute: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let layout = DataLayout::new(config.resolve_data_dir(cli.data_dir.as_deref()));
    info!(
        "clinlytix v{} using data dir {}",
        env!("CARGO_PKG_VERSION"),
        layout.data_dir().display()
    );

    match cli.command {
        Commands::Clean => {
            let report = stages::clean(&layout)?;
            println!(
                "cleaned {} patients ({} survival mismatches), {} sites ({} dropped), {} PRO rows ({} dropped)",
                report.patients,
                report.survival_mismatches,
                report.sites,
                report.dropped_sites,
                report.pro_rows,
                report.dropped_pro_rows,
            );
        }
        Commands::Feasibility => {
            let results = stages::feasibility(&layout)?;
            println!("{:<10} {:<12} {:>8} {:>10}", "site", "country", "eligible", "fill rate");
            for r in &results {
                println!(
                    "{:<10} {:<12} {:>8} {:>10.2}",
                    r.site_id, r.country, r.eligible_patients, r.projected_fill_rate
                );
            }
        }
        Commands::Survival => {
            let outputs = stages::survival(&layout, &config.cox)?;
            for curve in &outputs.curves {
                let median = curve
                    .median_survival_time()
                    .map_or_else(|| "not reached".to_string(), |t| format!("{t:.0} days"));
                println!("{}: median survival {median}", curve.cohort);
            }
            println!();
            outputs.summary.print();
        }
        Commands::Run => run_pipeline(&layout, &config)?,
        Commands::Schedule { execute } => {
            let marker = layout.last_run_marker();
            let last_run = schedule::read_last_run(&marker)?;
            let today = Local::now().date_naive();

            match DailySchedule::new().due(last_run, today) {
                None => println!("up to date, last run {}", last_run.map_or("never".into(), |d| d.to_string())),
                Some(date) if execute => {
                    info!(%date, "daily run due");
                    run_pipeline(&layout, &config)?;
                }
                Some(date) => println!("run due for {date}"),
            }
        }
    }

    Ok(())
}

/// whole DAG; records today's date once every required task succeeded
fn run_pipeline(layout: &DataLayout, config: &Config) -> Result<()> {
    let dag = stages::build_pipeline(layout, config)?;
    let executor = Executor::new(RetryPolicy::from(&config.retry));
    let report = executor.run(&dag)?;

    for task in &report.tasks {
        match (&task.state, &task.error) {
            (TaskState::Failed, Some(error)) => {
                println!("{:<20} {:?} after {} attempt(s): {error}", task.id, task.state, task.attempts)
            }
            _ => println!("{:<20} {:?}", task.id, task.state),
        }
    }

    if !report.succeeded() {
        bail!("pipeline run failed");
    }

    let today = Local::now().date_naive();
    schedule::record_run(&layout.last_run_marker(), today)
        .context("recording the run date")?;
    if report.failed().next().is_some() {
        warn!("optional tasks failed, see above");
    }
    Ok(())
}

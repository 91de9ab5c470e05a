///! # Harness - SieveKV Experiment Driver
///!
///! Drives the build-and-query sequence across parameter sweeps, records
///! wall-clock timings and pruning-counter deltas, and emits comma-separated
///! result files under `csv/`.
///!
///! ## Usage
///!
///! ```text
///! harness [--db] [--base-dir DIR] [--num-records N] [--runs N]
///!         [--skip-db-scan] [--log-level LEVEL]
///! ```
///!
///! `--db` performs first-time initialisation of the shared experiment
///! database: create, bulk-insert `--num-records` records across the default
///! columns, flush everything, compact everything. Without it the database
///! is assumed to exist from a previous run.
///!
///! Exit code 0 on success, 1 on any unhandled error.

mod csv;
mod experiments;
mod fixtures;
mod params;
mod stats;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use params::{ExperimentParams, DEFAULT_COLUMNS, DEFAULT_NUM_RECORDS};

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "SieveKV bloom-overlay experiment driver")]
struct Cli {
    /// Initialise the shared experiment database (create, bulk-insert,
    /// flush, compact) before running the experiments.
    #[arg(long)]
    db: bool,

    /// Directory holding the experiment databases.
    #[arg(long, default_value = "data")]
    base_dir: PathBuf,

    /// Records to insert when initialising the shared database.
    #[arg(long, default_value_t = DEFAULT_NUM_RECORDS)]
    num_records: usize,

    /// Query repetitions per configuration.
    #[arg(long, default_value_t = 10)]
    runs: usize,

    /// Skip the naive whole-DB scan baseline (it dwarfs everything else).
    #[arg(long)]
    skip_db_scan: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber");

    if let Err(e) = run(&cli) {
        error!(error = %e, "harness failed");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let params = ExperimentParams {
        db_path: cli.base_dir.join("shared_db"),
        num_records: cli.num_records,
        ..ExperimentParams::default()
    };

    let mut db = fixtures::open_experiment_db(&params.db_path)?;
    if cli.db {
        info!(
            records = params.num_records,
            path = %params.db_path.display(),
            "initialising shared experiment database"
        );
        fixtures::init_shared_db(&mut db, DEFAULT_COLUMNS, params.num_records)?;
    } else {
        info!(path = %params.db_path.display(), "reusing existing experiment database");
    }

    experiments::run_build_metrics(&db, DEFAULT_COLUMNS, &params)?;
    experiments::run_query_bench(&db, DEFAULT_COLUMNS, &params, cli.runs, cli.skip_db_scan)?;
    experiments::run_target_bench(&cli.base_dir, DEFAULT_COLUMNS, &params, cli.runs)?;

    info!("all experiments finished");
    Ok(())
}

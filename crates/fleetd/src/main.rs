//! fleetd: the FleetGrid daemon.
//!
//! Runs the pool autoscaler against the embedded state store, or prints
//! what a single cycle would do.
//!
//! # Usage
//!
//! ```text
//! fleetd --config /etc/fleetgrid/fleetd.toml run
//! fleetd plan --pool linux
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fleetd::{FleetConfig, LogFormat, StoreProvisioner, plan_decisions, supervise};
use fleetgrid_autoscale::Autoscaler;
use fleetgrid_state::StateStore;
use tracing::{error, info};

const DEFAULT_LOG_FILTER: &str = "info,fleetd=debug,fleetgrid=debug";

#[derive(Parser)]
#[command(name = "fleetd", about = "FleetGrid autoscaling daemon")]
struct Cli {
    /// Path to fleetd.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the autoscale loop until Ctrl-C.
    Run {
        /// Data directory for persistent state.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Autoscaler cycle interval in seconds.
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Compute one cycle's decisions and print them as JSON. Issues nothing.
    Plan {
        /// Data directory for persistent state.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Only plan this pool.
        #[arg(long)]
        pool: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => FleetConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FleetConfig::default(),
    };
    if cli.log_json {
        config.log_format = LogFormat::Json;
    }
    init_tracing(config.log_format);

    match cli.command {
        Command::Run { data_dir, interval } => {
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Some(secs) = interval {
                config.autoscale_interval_secs = secs;
            }
            config.validate()?;
            run(config).await
        }
        Command::Plan { data_dir, pool } => {
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            plan(config, pool.as_deref())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn open_state(config: &FleetConfig) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let db_path = config.db_path();
    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(state)
}

fn build_autoscaler(config: &FleetConfig, state: StateStore) -> Autoscaler<StoreProvisioner> {
    let provisioner = Arc::new(StoreProvisioner::new(state.clone()));
    Autoscaler::new(state, provisioner)
        .with_estimator(config.demand.estimator())
        .with_settings(config.autoscale_settings())
}

async fn run(config: FleetConfig) -> anyhow::Result<()> {
    info!(demand = ?config.demand, "FleetGrid daemon starting");

    let state = open_state(&config)?;
    let autoscaler = build_autoscaler(&config, state);
    let interval = Duration::from_secs(config.autoscale_interval_secs);

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C, stopping");
        }
    };
    supervise(autoscaler, interval, ctrl_c).await?;

    info!("FleetGrid daemon stopped");
    Ok(())
}

fn plan(config: FleetConfig, pool: Option<&str>) -> anyhow::Result<()> {
    let state = open_state(&config)?;
    let autoscaler = build_autoscaler(&config, state.clone());

    let pools: Vec<String> = match pool {
        Some(name) => vec![name.to_string()],
        None => state.list_pools()?.into_iter().map(|p| p.name).collect(),
    };

    let decisions = plan_decisions(&autoscaler, &pools);
    println!("{}", serde_json::to_string_pretty(&decisions)?);
    Ok(())
}

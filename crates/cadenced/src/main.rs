//! cadenced — the Cadence daemon.
//!
//! Drives one batch through harden / saturate / steady-state against the
//! simulated backend, until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! cadenced init --path cadence.toml --target alpha --workers home,node-1
//! cadenced plan --config cadence.toml --phase steady-state
//! cadenced run --config cadence.toml
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};

use cadence_controller::{BatchController, Collaborators, ControllerSettings, TokioClock};
use cadence_scheduler::{Batch, Phase};
use cadence_sim::SimWorld;

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "cadenced", about = "Cadence batch scheduler daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the batch until Ctrl-C.
    Run {
        #[arg(short, long, default_value = "cadence.toml")]
        config: PathBuf,
    },
    /// Print the wave a phase would dispatch right now, as JSON.
    Plan {
        #[arg(short, long, default_value = "cadence.toml")]
        config: PathBuf,

        #[arg(long, value_enum, default_value = "steady-state")]
        phase: PhaseArg,
    },
    /// Write a starter config.
    Init {
        #[arg(short, long, default_value = "cadence.toml")]
        path: PathBuf,

        #[arg(long, default_value = "alpha")]
        target: String,

        /// Comma-separated worker names.
        #[arg(long, value_delimiter = ',', default_value = "home")]
        workers: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PhaseArg {
    HardenFloor,
    SaturateCeiling,
    SteadyState,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::HardenFloor => Phase::HardenFloor,
            PhaseArg::SaturateCeiling => Phase::SaturateCeiling,
            PhaseArg::SteadyState => Phase::SteadyState,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,cadence=debug"))?,
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run(config).await,
        Command::Plan { config, phase } => plan(config, phase.into()),
        Command::Init {
            path,
            target,
            workers,
        } => init(path, &target, &workers),
    }
}

fn build_controller(config: &DaemonConfig) -> anyhow::Result<BatchController> {
    let batch = Batch::from_config(&config.cadence)?;
    let world = Arc::new(SimWorld::new(&config.simulation, &config.cadence.operations));
    let deps = Collaborators::from_backend(world, Arc::new(TokioClock));
    let settings = ControllerSettings::from_config(&config.cadence.batch);
    Ok(BatchController::new(batch, settings, deps))
}

async fn run(path: PathBuf) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(&path)?;
    info!(path = ?path, batch = %config.cadence.batch.name, "config loaded");

    let mut controller = build_controller(&config)?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    match controller.run(shutdown_rx).await {
        Ok(summary) => {
            info!(
                waves = summary.waves,
                jobs = summary.jobs_dispatched,
                iterations = summary.iterations,
                "cadenced stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(phase = %controller.phase(), error = %e, "batch failed");
            Err(e.into())
        }
    }
}

fn plan(path: PathBuf, phase: Phase) -> anyhow::Result<()> {
    let config = DaemonConfig::from_file(&path)?;
    let controller = build_controller(&config)?;
    let wave = controller.plan(phase)?;
    println!("{}", serde_json::to_string_pretty(&wave)?);
    Ok(())
}

fn init(path: PathBuf, target: &str, workers: &[String]) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    let names: Vec<&str> = workers.iter().map(String::as_str).collect();
    let config = DaemonConfig::scaffold(&format!("{target}-batch"), target, &names);
    std::fs::write(&path, config.to_toml_string()?)?;
    info!(path = ?path, workers = names.len(), "config written");
    Ok(())
}

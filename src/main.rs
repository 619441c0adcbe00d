//! Command-line front end.
//!
//! ```bash
//! # Check a configuration file (and WFALIGN_* overrides) without running
//! wavefront_align validate --config align.toml
//!
//! # Run a full alignment against the simulated bench
//! wavefront_align simulate --config align.toml --best-focus-z -0.05
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use align_core::frame::{DirectoryFrameStore, FrameStore, MemoryFrameStore};
use align_driver_mock::{DonutScene, MockBench};
use wavefront_align::config::{EstimatorBackend, WorkerTransportKind};
use wavefront_align::logging::{self, LogFormat, DEFAULT_FILTER};
use wavefront_align::{AlignmentConfig, AlignmentOrchestrator, Devices, RunOutcome};

#[derive(Parser, Debug)]
#[command(name = "wavefront_align", version, about = "Wavefront sensing and hexapod alignment")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a configuration, then print the resolved values
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run one alignment against the simulated telescope
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        /// Hexapod x offset of best alignment in the simulated optics (mm)
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        best_focus_x: f64,
        /// Hexapod y offset of best alignment in the simulated optics (mm)
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        best_focus_y: f64,
        /// Hexapod z offset of best focus in the simulated optics (mm)
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        best_focus_z: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init(format, DEFAULT_FILTER)?;

    match cli.command {
        Command::Validate { config } => validate(config),
        Command::Simulate {
            config,
            best_focus_x,
            best_focus_y,
            best_focus_z,
        } => {
            let mut scene = DonutScene::default();
            scene.best_focus.x = best_focus_x;
            scene.best_focus.y = best_focus_y;
            scene.best_focus.z = best_focus_z;
            simulate(config, scene).await
        }
    }
}

fn validate(path: PathBuf) -> Result<()> {
    let config = AlignmentConfig::load_from(&path)
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    let resolved = toml::to_string_pretty(&config).context("failed to render configuration")?;
    println!("{resolved}");
    info!(path = %path.display(), "Configuration is valid");
    Ok(())
}

async fn simulate(path: PathBuf, scene: DonutScene) -> Result<()> {
    let config = AlignmentConfig::load_from(&path)
        .with_context(|| format!("invalid configuration {}", path.display()))?;

    // A worker process can only see frames written to disk.
    let store: Arc<dyn FrameStore> = match (config.estimator.backend, config.estimator.worker.transport) {
        (EstimatorBackend::Isolated, WorkerTransportKind::Process) => {
            Arc::new(DirectoryFrameStore::new(config.storage.frames_dir.clone()))
        }
        _ => Arc::new(MemoryFrameStore::new()),
    };
    let bench = MockBench::with_store(scene, store);
    let devices = Devices {
        telescope: bench.telescope.clone(),
        hexapod: bench.hexapod.clone(),
        camera: bench.camera.clone(),
        status: bench.status.clone(),
        store: bench.store.clone(),
    };

    let mut orchestrator = AlignmentOrchestrator::new(devices);
    let canceller = orchestrator.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling run");
            canceller.cancel();
        }
    });

    orchestrator.configure(config).await?;
    let report = orchestrator.run().await;
    orchestrator.cleanup().await?;
    let report = report?;

    println!("run {}", report.run_id);
    println!("states: {:?}", report.states);
    match &report.outcome {
        RunOutcome::Completed {
            correction,
            residual,
            iterations,
            converged,
            estimator_retries,
        } => {
            println!(
                "completed after {iterations} iteration(s), converged: {converged}, estimator retries: {estimator_retries}"
            );
            println!(
                "total hexapod correction: x={:+.4} y={:+.4} z={:+.4} mm",
                correction.hexapod.x, correction.hexapod.y, correction.hexapod.z
            );
            println!(
                "total telescope offset: az={:+.2} el={:+.2} arcsec",
                correction.telescope.az, correction.telescope.el
            );
            println!(
                "residual: coma_x={:+.1} coma_y={:+.1} defocus={:+.1} nm",
                residual.coma_x, residual.coma_y, residual.defocus
            );
            Ok(())
        }
        RunOutcome::Recovered { reason, restored } => {
            println!(
                "recovered from {reason}; hexapod restored to x={:.4} y={:.4} z={:.4}",
                restored.x, restored.y, restored.z
            );
            std::process::exit(2);
        }
        RunOutcome::Failed { primary, secondary } => {
            error!(error = %primary, "Run failed");
            println!("failed: {primary}");
            if let Some(secondary) = secondary {
                println!("recovery also failed: {secondary}");
            }
            std::process::exit(1);
        }
    }
}

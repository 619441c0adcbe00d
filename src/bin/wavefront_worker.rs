//! Isolated wavefront estimation worker.
//!
//! Reads one JSON request per line on stdin, answers one JSON response per
//! line on stdout, and exits when stdin closes. Pixels are read from the
//! frame directory shared with the process that took the exposures.
//!
//! ```bash
//! wavefront_worker --frames /data/frames
//! RUST_LOG=debug wavefront_worker --frames /data/frames
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{stdin, stdout, BufReader};
use tracing::info;
use wavefront_align::estimator::worker;
use wavefront_align::logging::{self, LogFormat};

use align_core::frame::DirectoryFrameStore;

#[derive(Parser, Debug)]
#[command(name = "wavefront_worker", about = "Refined donut-model estimation worker")]
struct Args {
    /// Directory holding `<exposure_id>.frame` files
    #[arg(long, default_value = "frames")]
    frames: PathBuf,

    /// Emit logs as JSON (always on stderr)
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init(format, "warn")?;

    info!(frames = %args.frames.display(), "Worker starting");
    let store = Arc::new(DirectoryFrameStore::new(args.frames));
    let served = worker::serve(BufReader::new(stdin()), stdout(), store).await?;
    info!(served, "Worker exiting");
    Ok(())
}

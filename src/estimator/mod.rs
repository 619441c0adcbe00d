//! Wavefront estimation backends.
//!
//! The orchestrator talks to a [`WavefrontEstimator`] and never knows which
//! backend is behind it. Two implementations exist:
//!
//! - [`FastEstimator`]: runs the coarse donut model in process
//! - [`IsolatedEstimator`]: sends the pair across a [`WorkerTransport`] to a
//!   worker running the refined model, with a per-attempt timeout and a single
//!   retry on timeout
//!
//! Backends are chosen by configuration in [`build_estimator`].

pub mod donut;
pub mod fast;
pub mod isolated;
pub mod model;
pub mod protocol;
pub mod transport;
pub mod worker;

pub use fast::FastEstimator;
pub use isolated::IsolatedEstimator;
pub use protocol::{EstimateRequest, EstimateResponse, WorkerResult};
pub use transport::{ProcessTransport, TaskTransport, WorkerTransport};

use crate::config::{EstimatorBackend, EstimatorConfig, StorageConfig, WorkerTransportKind};
use align_core::error::AlignResult;
use align_core::frame::FrameStore;
use align_core::types::{AberrationEstimate, ImagePair};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Measurement parameters shipped with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorOptions {
    pub detection_sigma: f64,
    pub min_source_pixels: usize,
    pub obscuration: f64,
    pub defocus_nm_per_mm: f64,
    pub coma_nm_per_px: f64,
    pub max_source_separation_px: f64,
}

impl From<&EstimatorConfig> for EstimatorOptions {
    fn from(config: &EstimatorConfig) -> Self {
        Self {
            detection_sigma: config.detection_sigma,
            min_source_pixels: config.min_source_pixels,
            obscuration: config.obscuration,
            defocus_nm_per_mm: config.defocus_nm_per_mm,
            coma_nm_per_px: config.coma_nm_per_px,
            max_source_separation_px: config.max_source_separation_px,
        }
    }
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self::from(&EstimatorConfig::default())
    }
}

/// Estimate plus how many timed-out attempts preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateReport {
    pub estimate: AberrationEstimate,
    pub retries: u32,
}

/// Capability that turns an intra/extra pair into an aberration estimate.
#[async_trait]
pub trait WavefrontEstimator: Send + Sync {
    /// Short backend name, recorded in diagnostics and logs.
    fn name(&self) -> &'static str;

    /// Estimate the aberration seen in `pair`.
    ///
    /// Fails with `Estimation` when no usable sources are found or the intra
    /// and extra sources are too far apart, and with `EstimationTimeout` when
    /// an isolated worker never answered.
    async fn estimate(
        &self,
        pair: &ImagePair,
        options: &EstimatorOptions,
    ) -> AlignResult<EstimateReport>;

    /// Release worker resources. Called from the host's cleanup.
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Build the estimator selected by `config`.
///
/// Must be called from within a Tokio runtime: the task transport spawns its
/// worker immediately.
pub fn build_estimator(
    config: &EstimatorConfig,
    storage: &StorageConfig,
    store: Arc<dyn FrameStore>,
) -> Arc<dyn WavefrontEstimator> {
    match config.backend {
        EstimatorBackend::Fast => {
            info!("Using in-process fast estimator");
            Arc::new(FastEstimator::new(store))
        }
        EstimatorBackend::Isolated => {
            let transport: Arc<dyn WorkerTransport> = match config.worker.transport {
                WorkerTransportKind::Task => {
                    info!("Using isolated estimator on an in-process worker task");
                    Arc::new(TaskTransport::spawn(store))
                }
                WorkerTransportKind::Process => {
                    info!(
                        program = %config.worker.program.display(),
                        frames_dir = %storage.frames_dir.display(),
                        "Using isolated estimator on a worker process"
                    );
                    let mut args = config.worker.args.clone();
                    args.push("--frames".to_string());
                    args.push(storage.frames_dir.display().to_string());
                    Arc::new(ProcessTransport::new(config.worker.program.clone(), args))
                }
            };
            Arc::new(IsolatedEstimator::new(
                transport,
                config.timeout,
                config.max_attempts,
            ))
        }
    }
}

//! In-process estimator.

use crate::estimator::model::{estimate_pair, DonutModel};
use crate::estimator::{EstimateReport, EstimatorOptions, WavefrontEstimator};
use align_core::error::{AlignError, AlignResult};
use align_core::frame::FrameStore;
use align_core::types::ImagePair;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Runs the coarse donut model on the orchestrator's runtime.
///
/// Frame loading and measurement are blocking work, so they run on the
/// blocking pool; the orchestrator task stays responsive to cancellation.
pub struct FastEstimator {
    store: Arc<dyn FrameStore>,
}

impl FastEstimator {
    pub fn new(store: Arc<dyn FrameStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl WavefrontEstimator for FastEstimator {
    fn name(&self) -> &'static str {
        DonutModel::Coarse.name()
    }

    async fn estimate(
        &self,
        pair: &ImagePair,
        options: &EstimatorOptions,
    ) -> AlignResult<EstimateReport> {
        let store = self.store.clone();
        let pair = pair.clone();
        let options = options.clone();

        let estimate = tokio::task::spawn_blocking(move || {
            let intra = store
                .load(pair.intra.exposure_id)
                .map_err(|e| format!("{:#}", e))?;
            let extra = store
                .load(pair.extra.exposure_id)
                .map_err(|e| format!("{:#}", e))?;
            estimate_pair(
                (&pair.intra, &intra),
                (&pair.extra, &extra),
                &options,
                DonutModel::Coarse,
            )
        })
        .await
        .map_err(|e| AlignError::estimation(format!("estimator task failed: {}", e)))?
        .map_err(AlignError::estimation)?;

        debug!(
            coma_x = estimate.coma_x,
            coma_y = estimate.coma_y,
            defocus = estimate.defocus,
            "Fast estimate"
        );
        Ok(EstimateReport {
            estimate,
            retries: 0,
        })
    }
}

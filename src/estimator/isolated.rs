//! Estimator behind a worker boundary.

use crate::estimator::model::DonutModel;
use crate::estimator::protocol::{EstimateRequest, WorkerResult};
use crate::estimator::transport::WorkerTransport;
use crate::estimator::{EstimateReport, EstimatorOptions, WavefrontEstimator};
use align_core::error::{AlignError, AlignResult};
use align_core::types::ImagePair;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Sends each pair to a worker running the refined model.
///
/// Every attempt is bounded by `timeout`. Only timeouts are retried, and at
/// most `max_attempts - 1` times; an error reported by the worker or a broken
/// transport fails immediately with `Estimation`.
pub struct IsolatedEstimator {
    transport: Arc<dyn WorkerTransport>,
    timeout: Duration,
    max_attempts: u32,
}

impl IsolatedEstimator {
    pub fn new(transport: Arc<dyn WorkerTransport>, timeout: Duration, max_attempts: u32) -> Self {
        Self {
            transport,
            timeout,
            max_attempts: max_attempts.clamp(1, 2),
        }
    }
}

#[async_trait]
impl WavefrontEstimator for IsolatedEstimator {
    fn name(&self) -> &'static str {
        DonutModel::Refined.name()
    }

    async fn estimate(
        &self,
        pair: &ImagePair,
        options: &EstimatorOptions,
    ) -> AlignResult<EstimateReport> {
        for attempt in 1..=self.max_attempts {
            let request = EstimateRequest {
                request_id: Uuid::new_v4(),
                intra: pair.intra.clone(),
                extra: pair.extra.clone(),
                options: options.clone(),
            };
            info!(
                request_id = %request.request_id,
                group_id = %pair.group_id,
                attempt,
                "Dispatching estimate request"
            );

            match tokio::time::timeout(self.timeout, self.transport.round_trip(&request)).await {
                Err(_) => {
                    warn!(
                        timeout_ms = self.timeout.as_millis() as u64,
                        attempt,
                        "Estimator did not answer in time"
                    );
                    self.transport.reset().await;
                }
                Ok(Err(e)) => {
                    return Err(AlignError::estimation(format!("worker transport: {:#}", e)));
                }
                Ok(Ok(response)) => {
                    return match response.result {
                        WorkerResult::Estimate(estimate) => Ok(EstimateReport {
                            estimate,
                            retries: attempt - 1,
                        }),
                        WorkerResult::Error { reason } => Err(AlignError::estimation(reason)),
                    };
                }
            }
        }

        Err(AlignError::EstimationTimeout {
            timeout: self.timeout,
            attempts: self.max_attempts,
        })
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.transport.shutdown().await
    }
}

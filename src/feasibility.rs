//! Precondition checks against live subsystem state.

use align_core::capabilities::SubsystemStatus;
use align_core::error::{AlignError, AlignResult};
use align_core::types::CorrectionLoop;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Subsystems that must be enabled before the alignment perturbs anything.
pub const REQUIRED_SUBSYSTEMS: [&str; 5] = [
    "pointing",
    "mount",
    "focus_hexapod",
    "optics_correction",
    "instrument",
];

/// Closed-loop corrections that must be running during the alignment.
pub const REQUIRED_LOOPS: [CorrectionLoop; 3] = [
    CorrectionLoop::Hexapod,
    CorrectionLoop::M1,
    CorrectionLoop::Spectrograph,
];

/// Read-only gate over [`SubsystemStatus`].
pub struct FeasibilityGate {
    status: Arc<dyn SubsystemStatus>,
}

impl FeasibilityGate {
    pub fn new(status: Arc<dyn SubsystemStatus>) -> Self {
        Self { status }
    }

    /// Fail with `Precondition` naming the first subsystem or loop not enabled.
    pub async fn check(&self) -> AlignResult<()> {
        for subsystem in REQUIRED_SUBSYSTEMS {
            let enabled = self.status.is_enabled(subsystem).await.map_err(|e| {
                AlignError::Precondition {
                    subsystem: subsystem.to_string(),
                    reason: format!("state unavailable: {:#}", e),
                }
            })?;
            if !enabled {
                return Err(AlignError::Precondition {
                    subsystem: subsystem.to_string(),
                    reason: "not enabled".to_string(),
                });
            }
            debug!(subsystem, "Subsystem enabled");
        }

        for correction in REQUIRED_LOOPS {
            let name = format!("{}_correction", correction);
            let enabled = self
                .status
                .correction_enabled(correction)
                .await
                .map_err(|e| AlignError::Precondition {
                    subsystem: name.clone(),
                    reason: format!("state unavailable: {:#}", e),
                })?;
            if !enabled {
                return Err(AlignError::Precondition {
                    subsystem: name,
                    reason: "correction loop disabled".to_string(),
                });
            }
        }

        info!("Feasibility check passed");
        Ok(())
    }

    /// Run the check and only log the result.
    pub async fn advise(&self) {
        if let Err(e) = self.check().await {
            warn!(error = %e, "Advisory feasibility check failed; the run will be refused unless this is fixed");
        }
    }
}

//! Return the mechanism to its pre-run state.
//!
//! This is the only place that undoes a run. Every failure after the hexapod
//! snapshot goes through [`recover`] exactly once.

use crate::config::VerificationConfig;
use align_core::capabilities::{FocusHexapod, Telescope};
use align_core::error::{AlignError, AlignResult};
use align_core::types::HexapodPosition;
use tracing::{info, warn};

/// What recovery has to restore.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryPlan {
    /// Hexapod position captured after the slew, before any offset
    pub snapshot: HexapodPosition,
    /// The run sent at least one telescope offset
    pub clear_telescope_offsets: bool,
}

/// Move the hexapod back to the snapshot, wait for it to settle, then clear
/// telescope offsets if the run applied any.
///
/// Every step is attempted even when an earlier one fails, so a hexapod fault
/// never leaves the telescope offset. Recovery is not cancellable. Step
/// failures are joined into one `Recovery` error.
pub async fn recover(
    hexapod: &dyn FocusHexapod,
    telescope: &dyn Telescope,
    plan: &RecoveryPlan,
    verification: &VerificationConfig,
) -> AlignResult<()> {
    let mut failures: Vec<String> = Vec::new();

    let target = plan.snapshot;
    info!(x = target.x, y = target.y, z = target.z, "Restoring hexapod snapshot");
    match hexapod.move_to(target).await {
        Ok(()) => {
            if let Err(reason) = wait_in_position(hexapod, verification).await {
                warn!(%reason, "Hexapod did not settle during recovery");
                failures.push(reason);
            }
        }
        Err(e) => {
            let reason = format!("hexapod move to snapshot failed: {:#}", e);
            warn!(%reason, "Hexapod restore failed");
            failures.push(reason);
        }
    }

    if plan.clear_telescope_offsets {
        info!("Clearing telescope offsets");
        if let Err(e) = telescope.clear_offsets().await {
            let reason = format!("clearing telescope offsets failed: {:#}", e);
            warn!(%reason, "Telescope offsets not cleared");
            failures.push(reason);
        }
    }

    if failures.is_empty() {
        info!("Recovery complete");
        Ok(())
    } else {
        Err(AlignError::Recovery(failures.join("; ")))
    }
}

async fn wait_in_position(
    hexapod: &dyn FocusHexapod,
    verification: &VerificationConfig,
) -> Result<(), String> {
    for poll in 1..=verification.max_polls {
        let in_position = hexapod
            .in_position()
            .await
            .map_err(|e| format!("hexapod state unavailable during recovery: {:#}", e))?;
        if in_position {
            return Ok(());
        }
        if poll < verification.max_polls {
            tokio::time::sleep(verification.poll_interval).await;
        }
    }
    Err(format!(
        "hexapod not in position after {} polls",
        verification.max_polls
    ))
}

//! What a run reports back to its host.

use crate::orchestrator::RunState;
use align_core::error::AlignError;
use align_core::types::{AberrationEstimate, CorrectionVector, HexapodPosition};
use uuid::Uuid;

/// Terminal result of one alignment run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The loop finished without error.
    Completed {
        /// Sum of every correction applied during the run; zero when the
        /// first measurement was already inside the thresholds.
        correction: CorrectionVector,
        /// Last estimate measured.
        residual: AberrationEstimate,
        iterations: u32,
        /// False when `max_iter` was exhausted before the thresholds were met.
        converged: bool,
        /// Timed-out estimator attempts that were retried.
        estimator_retries: u32,
    },
    /// A stage failed after the mechanism was perturbed and recovery restored
    /// the snapshot.
    Recovered {
        reason: AlignError,
        restored: HexapodPosition,
    },
    /// The run failed; `secondary` is set when recovery failed as well.
    Failed {
        primary: AlignError,
        secondary: Option<AlignError>,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    /// The error that ended the run, if any.
    pub fn primary_error(&self) -> Option<&AlignError> {
        match self {
            RunOutcome::Completed { .. } => None,
            RunOutcome::Recovered { reason, .. } => Some(reason),
            RunOutcome::Failed { primary, .. } => Some(primary),
        }
    }
}

/// Outcome plus the path the run took.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Group id of each acquired pair, in order.
    pub group_ids: Vec<String>,
    /// Every state entered, starting from `Configured`.
    pub states: Vec<RunState>,
    pub outcome: RunOutcome,
}

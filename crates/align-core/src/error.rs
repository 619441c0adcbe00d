//! Error taxonomy for alignment runs.
//!
//! `AlignError` is the single domain error surfaced to the host. It is built with
//! `thiserror` and grouped by the stage that produced it:
//!
//! - **`Config`**: malformed parameters, rejected before any hardware interaction.
//! - **`Precondition`**: the feasibility gate found a disabled subsystem or an open
//!   correction loop. Nothing was commanded.
//! - **`Acquisition`**: slew or exposure failure.
//! - **`Estimation`** / **`EstimationTimeout`**: the wavefront estimator reported an
//!   error, or did not answer in time (after its single retry).
//! - **`CorrectionBounds`**: clipping a correction would have inverted its sign.
//! - **`VerificationTimeout`**: the hexapod never reported in-position.
//! - **`Device`**: an actuator rejected a correction command.
//! - **`Cancelled`**: the host cancelled the run at a suspension point.
//! - **`Recovery`**: recovery itself failed. Only ever attached as a secondary
//!   cause, never as the primary reason of a failed run.
//!
//! Device capabilities return `anyhow::Result`; the orchestrator converts those
//! into the variant matching the stage it is in.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the alignment error type.
pub type AlignResult<T> = std::result::Result<T, AlignError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Precondition failed for '{subsystem}': {reason}")]
    Precondition { subsystem: String, reason: String },

    #[error("Acquisition error: {0}")]
    Acquisition(String),

    #[error("Estimation error: {reason}")]
    Estimation { reason: String },

    #[error("Estimator did not answer within {timeout:?} ({attempts} attempts)")]
    EstimationTimeout { timeout: Duration, attempts: u32 },

    #[error(
        "Correction on axis '{axis}' would invert sign after clipping \
         (requested {requested:.4}, clipped {clipped:.4})"
    )]
    CorrectionBounds {
        axis: String,
        requested: f64,
        clipped: f64,
    },

    #[error("Offset not confirmed after {polls} verification polls")]
    VerificationTimeout { polls: u32 },

    #[error("Device error: {0}")]
    Device(String),

    #[error("Run cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("Recovery error: {0}")]
    Recovery(String),
}

impl AlignError {
    /// Builds an estimation error from any displayable reason.
    pub fn estimation(reason: impl Into<String>) -> Self {
        AlignError::Estimation {
            reason: reason.into(),
        }
    }

    /// Whether the error is raised before any hardware has been perturbed.
    ///
    /// These surface to the host immediately; every other error passes through
    /// recovery first.
    pub fn is_pre_perturbation(&self) -> bool {
        matches!(self, AlignError::Config(_) | AlignError::Precondition { .. })
    }

    /// Short stable name of the variant, used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AlignError::Config(_) => "ConfigError",
            AlignError::Precondition { .. } => "PreconditionError",
            AlignError::Acquisition(_) => "AcquisitionError",
            AlignError::Estimation { .. } => "EstimationError",
            AlignError::EstimationTimeout { .. } => "EstimationTimeout",
            AlignError::CorrectionBounds { .. } => "CorrectionBoundsError",
            AlignError::VerificationTimeout { .. } => "VerificationTimeout",
            AlignError::Device(_) => "DeviceError",
            AlignError::Cancelled { .. } => "Cancelled",
            AlignError::Recovery(_) => "RecoveryError",
        }
    }
}

//! Optical geometry: de-rotation, sensitivity transform and correction policy.

pub mod correction;
pub mod derotation;
pub mod sensitivity;

pub use correction::{CorrectionDecision, CorrectionPolicy};
pub use derotation::{derotate, derotation_angle};
pub use sensitivity::SensitivityTransform;

use align_core::types::{AberrationEstimate, HexapodOffset};
use nalgebra::Vector3;

/// Raw hexapod offset for an estimate measured at `derotation_angle` (deg).
///
/// The aberration is de-rotated into the hexapod frame first, then mapped
/// through the sensitivity matrix.
pub fn hexapod_offset_for(
    transform: &SensitivityTransform,
    estimate: &AberrationEstimate,
    derotation_angle: f64,
) -> HexapodOffset {
    let v = Vector3::from(estimate.terms());
    transform.hexapod_offset(&derotate(&v, derotation_angle))
}

//! Correction policy: convergence test, gains and clipping.

use crate::config::{AxisRange, CorrectionConfig};
use crate::optics::sensitivity::SensitivityTransform;
use align_core::error::{AlignError, AlignResult};
use align_core::types::{CorrectionVector, HexapodOffset, HexapodPosition, TelescopeOffset};
use tracing::warn;

const AXES: [&str; 3] = ["x", "y", "z"];

/// What to do with one measured hexapod offset.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionDecision {
    /// Residual inside both thresholds; nothing is commanded.
    Converged { residual: HexapodOffset },
    /// Apply `correction`; `requested` is the offset after gains, before clipping.
    Apply {
        requested: HexapodOffset,
        correction: CorrectionVector,
        clipped: bool,
    },
}

/// Turns a raw hexapod offset into the command actually sent to the actuators.
pub struct CorrectionPolicy<'a> {
    config: &'a CorrectionConfig,
    transform: &'a SensitivityTransform,
}

impl<'a> CorrectionPolicy<'a> {
    pub fn new(config: &'a CorrectionConfig, transform: &'a SensitivityTransform) -> Self {
        Self { config, transform }
    }

    /// Whether a raw (pre-gain) offset is inside the convergence thresholds.
    pub fn is_converged(&self, raw: &HexapodOffset) -> bool {
        raw.z.abs() < self.config.focus_threshold && raw.transverse() < self.config.coma_threshold
    }

    /// Decide the correction for `raw`, with the hexapod currently at `current`.
    ///
    /// Gains scale each axis, then each axis is clipped to `max_correction` and,
    /// when travel limits are configured, to the envelope reachable from
    /// `current`. A clip that flips the sign of an axis is rejected.
    pub fn decide(
        &self,
        raw: &HexapodOffset,
        current: &HexapodPosition,
    ) -> AlignResult<CorrectionDecision> {
        if self.is_converged(raw) {
            return Ok(CorrectionDecision::Converged { residual: *raw });
        }

        let gains = self.config.gains.as_array();
        let bounds = self.config.max_correction.as_array();
        let position = current.as_array();
        let limits = self.config.travel_limits.map(|l| l.as_array());

        let mut requested = [0.0; 3];
        let mut applied = [0.0; 3];
        let mut clipped = false;
        for (i, value) in raw.as_array().into_iter().enumerate() {
            requested[i] = value * gains[i];
            let mut axis = requested[i].clamp(-bounds[i], bounds[i]);
            if let Some(limits) = &limits {
                axis = clamp_to_travel(axis, position[i], &limits[i]);
            }
            if axis * requested[i] < 0.0 {
                return Err(AlignError::CorrectionBounds {
                    axis: AXES[i].to_string(),
                    requested: requested[i],
                    clipped: axis,
                });
            }
            if axis != requested[i] {
                clipped = true;
                warn!(
                    axis = AXES[i],
                    requested = requested[i],
                    applied = axis,
                    "Correction clipped"
                );
            }
            applied[i] = axis;
        }

        let hexapod = HexapodOffset::from_array(applied);
        let telescope = if self.config.offset_telescope {
            self.clip_telescope(self.transform.telescope_offset(&hexapod))
        } else {
            TelescopeOffset::default()
        };

        Ok(CorrectionDecision::Apply {
            requested: HexapodOffset::from_array(requested),
            correction: CorrectionVector { hexapod, telescope },
            clipped,
        })
    }

    fn clip_telescope(&self, offset: TelescopeOffset) -> TelescopeOffset {
        let bound = self.config.max_telescope_offset;
        let clipped = TelescopeOffset {
            el: offset.el.clamp(-bound, bound),
            az: offset.az.clamp(-bound, bound),
        };
        if clipped != offset {
            warn!(
                el = offset.el,
                az = offset.az,
                bound,
                "Telescope offset clipped"
            );
        }
        clipped
    }
}

/// Residue left by float round-off when the axis already sits on a limit (mm).
const TRAVEL_EPSILON: f64 = 1e-9;

/// Offset that keeps `position + offset` inside `range`.
fn clamp_to_travel(offset: f64, position: f64, range: &AxisRange) -> f64 {
    let clamped = (position + offset).clamp(range.min, range.max) - position;
    if clamped.abs() < TRAVEL_EPSILON {
        0.0
    } else {
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AxisValues, TravelLimits};

    fn policy_with(config: &CorrectionConfig) -> CorrectionDecision {
        let transform = SensitivityTransform::default();
        CorrectionPolicy::new(config, &transform)
            .decide(
                &HexapodOffset { x: 0.5, y: -0.3, z: 0.3 },
                &HexapodPosition::default(),
            )
            .unwrap()
    }

    #[test]
    fn below_thresholds_is_converged() {
        let config = CorrectionConfig::default();
        let transform = SensitivityTransform::default();
        let raw = HexapodOffset { x: 0.1, y: -0.1, z: 0.01 };
        let decision = CorrectionPolicy::new(&config, &transform)
            .decide(&raw, &HexapodPosition::default())
            .unwrap();
        assert_eq!(decision, CorrectionDecision::Converged { residual: raw });
    }

    #[test]
    fn focus_alone_above_threshold_is_not_converged() {
        let config = CorrectionConfig::default();
        let transform = SensitivityTransform::default();
        let policy = CorrectionPolicy::new(&config, &transform);
        assert!(!policy.is_converged(&HexapodOffset::focus(0.02)));
        assert!(!policy.is_converged(&HexapodOffset { x: 0.15, y: 0.15, z: 0.0 }));
    }

    #[test]
    fn axes_are_clipped_to_max_correction() {
        let decision = policy_with(&CorrectionConfig::default());
        match decision {
            CorrectionDecision::Apply {
                requested,
                correction,
                clipped,
            } => {
                assert!(clipped);
                assert_eq!(requested.z, 0.3);
                assert_eq!(correction.hexapod.z, 0.12);
                assert_eq!(correction.hexapod.x, 0.5);
                assert_eq!(correction.hexapod.y, -0.3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn gains_scale_before_clipping() {
        let config = CorrectionConfig {
            gains: AxisValues { x: 0.5, y: 1.0, z: 0.2 },
            ..CorrectionConfig::default()
        };
        match policy_with(&config) {
            CorrectionDecision::Apply {
                correction,
                clipped,
                ..
            } => {
                assert!(!clipped);
                assert!((correction.hexapod.x - 0.25).abs() < 1e-12);
                assert!((correction.hexapod.z - 0.06).abs() < 1e-12);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn telescope_offset_follows_clipped_hexapod() {
        match policy_with(&CorrectionConfig::default()) {
            CorrectionDecision::Apply { correction, .. } => {
                assert!((correction.telescope.el - 52.459 * 0.5).abs() < 1e-9);
                assert!((correction.telescope.az - 50.468 * -0.3).abs() < 1e-9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn telescope_offset_disabled() {
        let config = CorrectionConfig {
            offset_telescope: false,
            ..CorrectionConfig::default()
        };
        match policy_with(&config) {
            CorrectionDecision::Apply { correction, .. } => assert!(correction.telescope.is_zero()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn travel_limit_sign_inversion_is_rejected() {
        let range = AxisRange { min: -1.0, max: 1.0 };
        let config = CorrectionConfig {
            travel_limits: Some(TravelLimits {
                x: range,
                y: range,
                z: range,
            }),
            ..CorrectionConfig::default()
        };
        let transform = SensitivityTransform::default();
        // Already beyond the upper limit: pushing further up would be clamped
        // into a move downwards.
        let current = HexapodPosition { x: 0.0, y: 0.0, z: 1.2 };
        let err = CorrectionPolicy::new(&config, &transform)
            .decide(&HexapodOffset::focus(0.05), &current)
            .unwrap_err();
        match err {
            AlignError::CorrectionBounds {
                axis,
                requested,
                clipped,
            } => {
                assert_eq!(axis, "z");
                assert_eq!(requested, 0.05);
                assert!(clipped < 0.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn travel_limit_shrinks_step() {
        let range = AxisRange { min: -1.0, max: 1.0 };
        let config = CorrectionConfig {
            travel_limits: Some(TravelLimits {
                x: range,
                y: range,
                z: range,
            }),
            ..CorrectionConfig::default()
        };
        let transform = SensitivityTransform::default();
        let current = HexapodPosition { x: 0.0, y: 0.0, z: 0.95 };
        let decision = CorrectionPolicy::new(&config, &transform)
            .decide(&HexapodOffset::focus(0.1), &current)
            .unwrap();
        match decision {
            CorrectionDecision::Apply { correction, .. } => {
                assert!((correction.hexapod.z - 0.05).abs() < 1e-12)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn telescope_offset_is_bounded() {
        let config = CorrectionConfig {
            max_telescope_offset: 10.0,
            ..CorrectionConfig::default()
        };
        match policy_with(&config) {
            CorrectionDecision::Apply { correction, .. } => {
                assert_eq!(correction.telescope.el, 10.0);
                assert_eq!(correction.telescope.az, -10.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

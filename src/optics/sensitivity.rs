//! Aberration to mechanical offset mapping.

use crate::config::OpticsConfig;
use align_core::types::{HexapodOffset, TelescopeOffset};
use nalgebra::{Matrix3, Vector3};

/// Fixed linear calibration from measured aberrations to actuator offsets.
///
/// Both matrices follow the row-vector convention of the calibration, so a
/// column vector is mapped through the transpose:
///
/// - `hexapod = Sᵀ · [coma_x, coma_y, defocus]` (nm → mm)
/// - `telescope = Tᵀ · hexapod` (mm → arcsec), where the first component is
///   elevation and the second azimuth
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityTransform {
    sensitivity: Matrix3<f64>,
    hexapod_to_telescope: Matrix3<f64>,
}

impl SensitivityTransform {
    pub fn new(sensitivity: Matrix3<f64>, hexapod_to_telescope: Matrix3<f64>) -> Self {
        Self {
            sensitivity,
            hexapod_to_telescope,
        }
    }

    pub fn from_config(optics: &OpticsConfig) -> Self {
        Self::new(
            from_rows(&optics.sensitivity),
            from_rows(&optics.hexapod_to_telescope),
        )
    }

    /// Hexapod offset (mm) that cancels the de-rotated aberration `v` (nm).
    pub fn hexapod_offset(&self, v: &Vector3<f64>) -> HexapodOffset {
        let hex = self.sensitivity.tr_mul(v);
        HexapodOffset {
            x: hex.x,
            y: hex.y,
            z: hex.z,
        }
    }

    /// Telescope offset (arcsec) accompanying a hexapod offset.
    pub fn telescope_offset(&self, hexapod: &HexapodOffset) -> TelescopeOffset {
        let hex = Vector3::new(hexapod.x, hexapod.y, hexapod.z);
        let tel = self.hexapod_to_telescope.tr_mul(&hex);
        TelescopeOffset {
            el: tel.x,
            az: tel.y,
        }
    }
}

impl Default for SensitivityTransform {
    fn default() -> Self {
        Self::from_config(&OpticsConfig::default())
    }
}

fn from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|r, c| rows[r][c])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optics::derotation::derotate;

    const TOL: f64 = 1e-15;

    fn golden(angle: f64) -> HexapodOffset {
        let v = derotate(&Vector3::new(2.0, -1.0, 10.0), angle);
        SensitivityTransform::default().hexapod_offset(&v)
    }

    #[test]
    fn golden_vector_at_zero_degrees() {
        let hex = golden(0.0);
        assert!((hex.x - 0.009708737864077669).abs() < TOL);
        assert!((hex.y - 0.0048543689320388345).abs() < TOL);
        assert!((hex.z - 0.0025069348127600556).abs() < TOL);
    }

    #[test]
    fn golden_vector_at_ninety_degrees() {
        let hex = golden(90.0);
        assert!((hex.x - -0.0048543689320388345).abs() < TOL);
        assert!((hex.y - 0.009708737864077669).abs() < TOL);
        assert!((hex.z - 0.00263291724456773).abs() < TOL);
    }

    #[test]
    fn golden_vector_at_thirty_degrees() {
        let hex = golden(30.0);
        assert!((hex.x - 0.005980829162955716).abs() < 1e-14);
        assert!((hex.y - 0.0090583757465264).abs() < 1e-14);
        assert!((hex.z - 0.0026160387991360423).abs() < 1e-14);
    }

    #[test]
    fn telescope_offset_scales_transverse_axes() {
        let tel = SensitivityTransform::default().telescope_offset(&golden(0.0));
        assert!((tel.el - 0.5093106796116504).abs() < 1e-12);
        assert!((tel.az - 0.24499029126213592).abs() < 1e-12);
    }

    #[test]
    fn focus_does_not_move_telescope() {
        let tel = SensitivityTransform::default().telescope_offset(&HexapodOffset::focus(0.3));
        assert!(tel.is_zero());
    }

    #[test]
    fn custom_matrices_are_used() {
        let config = OpticsConfig {
            sensitivity: [[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 2.0]],
            ..OpticsConfig::default()
        };
        let hex = SensitivityTransform::from_config(&config)
            .hexapod_offset(&Vector3::new(1.0, 3.0, 5.0));
        assert_eq!(hex.as_array(), [3.0, 1.0, 10.0]);
    }
}

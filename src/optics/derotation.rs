//! Frame de-rotation.
//!
//! Aberrations are measured in the detector frame, which rotates with the
//! instrument rotator. Before they can be mapped onto the hexapod they must be
//! rotated back into the hexapod frame by the angle captured when the pair was
//! taken.
//!
//! The calibration uses a row-vector convention, `v' = v · R(θ)`:
//!
//! ```text
//! x' =  x·cosθ + y·sinθ
//! y' = -x·sinθ + y·cosθ
//! ```
//!
//! The third component (defocus) is rotation invariant.

use nalgebra::{Matrix3, Vector3};

/// De-rotation angle (deg) for a pair whose extra-focal exposure was taken at
/// the given boresight angle.
pub fn derotation_angle(boresight_angle: f64, camera_rotation_angle: f64) -> f64 {
    90.0 - boresight_angle + camera_rotation_angle
}

/// Rotation applied to `[x, y, z]` column vectors for an angle in degrees.
pub fn rotation_matrix(angle_deg: f64) -> Matrix3<f64> {
    let (sin_a, cos_a) = angle_deg.to_radians().sin_cos();
    Matrix3::new(cos_a, sin_a, 0.0, -sin_a, cos_a, 0.0, 0.0, 0.0, 1.0)
}

/// Rotate the transverse components of `v` by `angle_deg`.
pub fn derotate(v: &Vector3<f64>, angle_deg: f64) -> Vector3<f64> {
    rotation_matrix(angle_deg) * v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &Vector3<f64>, b: &Vector3<f64>) {
        assert!((a - b).norm() < 1e-12, "{:?} != {:?}", a, b);
    }

    #[test]
    fn zero_angle_is_identity() {
        let v = Vector3::new(2.0, -1.0, 10.0);
        assert_close(&derotate(&v, 0.0), &v);
    }

    #[test]
    fn quarter_turn_follows_row_vector_convention() {
        let v = Vector3::new(2.0, -1.0, 10.0);
        // x' = y, y' = -x at 90°
        assert_close(&derotate(&v, 90.0), &Vector3::new(-1.0, -2.0, 10.0));
    }

    #[test]
    fn rotation_is_invertible() {
        let samples = [
            Vector3::new(2.0, -1.0, 10.0),
            Vector3::new(-350.0, 12.5, -4200.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1e-6, -1e6, 3.0),
        ];
        let mut angle = -360.0;
        while angle <= 360.0 {
            for v in &samples {
                let back = derotate(&derotate(v, angle), -angle);
                assert!((back - v).norm() <= 1e-9 * v.norm().max(1.0));
            }
            angle += 7.5;
        }
    }

    #[test]
    fn defocus_is_invariant() {
        let v = Vector3::new(3.0, 4.0, -7.0);
        let rotated = derotate(&v, 33.0);
        assert_eq!(rotated.z, -7.0);
        assert!((rotated.xy().norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn derotation_angle_from_boresight() {
        assert_eq!(derotation_angle(90.0, 0.0), 0.0);
        assert_eq!(derotation_angle(0.0, 0.0), 90.0);
        assert_eq!(derotation_angle(60.0, 5.0), 35.0);
    }
}

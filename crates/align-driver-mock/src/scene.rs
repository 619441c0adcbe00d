//! Synthetic donut rendering.
//!
//! The scene models a single on-axis star seen through a centrally obscured
//! aperture. The ring radius grows linearly with the distance between the
//! hexapod and best focus; transverse misalignment of the hexapod tilts the
//! ring's surface brightness, which is what a coma-sensitive estimator picks up.

use align_core::frame::Frame;
use align_core::types::HexapodPosition;
use anyhow::Result;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Smallest rendered ring radius, so an in-focus frame still shows a spot.
const MIN_RADIUS_PX: f64 = 3.0;

/// Optical scene rendered by [`crate::MockCamera`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonutScene {
    pub width: u32,
    pub height: u32,
    /// Star position on the detector (pixels)
    pub center: (f64, f64),
    /// Ring radius per mm of defocus
    pub pixels_per_mm: f64,
    /// Central obscuration as a fraction of the outer radius
    pub obscuration: f64,
    /// Ring surface brightness above background (counts)
    pub surface_brightness: f64,
    pub background: f64,
    /// Half-width of the uniform pixel noise (counts)
    pub noise: f64,
    /// Hexapod position at which the star is in focus and coma-free
    pub best_focus: HexapodPosition,
    /// Coma wavefront (nm) per mm of transverse misalignment
    pub coma_nm_per_mm: f64,
    /// Coma wavefront (nm) per pixel of centroid shift
    pub coma_nm_per_px: f64,
    pub seed: u64,
}

impl Default for DonutScene {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            center: (128.0, 128.0),
            pixels_per_mm: 50.0,
            obscuration: 0.423,
            surface_brightness: 200.0,
            background: 100.0,
            noise: 5.0,
            best_focus: HexapodPosition::default(),
            coma_nm_per_mm: 206.0,
            coma_nm_per_px: 20.0,
            seed: 0x5eed,
        }
    }
}

impl DonutScene {
    /// Coma wavefront (nm) produced by the hexapod at `position`.
    pub fn coma_nm(&self, position: &HexapodPosition) -> (f64, f64) {
        let mx = position.x - self.best_focus.x;
        let my = position.y - self.best_focus.y;
        (-self.coma_nm_per_mm * mx, self.coma_nm_per_mm * my)
    }

    /// Render the frame seen with the hexapod at `position`.
    pub fn render(&self, position: &HexapodPosition, exposure_id: u64) -> Result<Frame> {
        let defocus = position.z - self.best_focus.z;
        let radius = (self.pixels_per_mm * defocus.abs()).max(MIN_RADIUS_PX);
        let inner = radius * self.obscuration;

        // Intensity gradient chosen so the flux-weighted centroid moves by
        // `shift` pixels from the ring centre; the shift flips across focus.
        let (coma_x, coma_y) = self.coma_nm(position);
        let side = if defocus >= 0.0 { 1.0 } else { -1.0 };
        let shift_x = side * coma_x / self.coma_nm_per_px;
        let shift_y = side * coma_y / self.coma_nm_per_px;
        let second_moment = radius * radius * (1.0 + self.obscuration * self.obscuration) / 4.0;
        let gx = shift_x / second_moment;
        let gy = shift_y / second_moment;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ exposure_id);
        let (cx, cy) = self.center;
        let shape = (self.height as usize, self.width as usize);
        let pixels = Array2::from_shape_fn(shape, |(y, x)| {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let r = dx.hypot(dy);
            let mut value = self.background;
            if r <= radius && r >= inner {
                let tilt = (1.0 + gx * dx + gy * dy).max(0.0);
                value += self.surface_brightness * tilt;
            }
            if self.noise > 0.0 {
                value += rng.gen_range(-self.noise..=self.noise);
            }
            value as f32
        });
        Frame::from_array(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_radius_tracks_defocus() {
        let scene = DonutScene {
            noise: 0.0,
            ..DonutScene::default()
        };
        let frame = scene
            .render(&HexapodPosition { x: 0.0, y: 0.0, z: 0.8 }, 1)
            .unwrap();
        // 0.8 mm * 50 px/mm = 40 px ring: lit at r=30, dark at r=45 and in the hole.
        assert!(frame.get(158, 128) > 250.0);
        assert!(frame.get(173, 128) < 101.0);
        assert!(frame.get(130, 128) < 101.0);
    }

    #[test]
    fn rendering_is_deterministic_per_exposure() {
        let scene = DonutScene::default();
        let position = HexapodPosition { x: 0.0, y: 0.0, z: -0.8 };
        assert_eq!(
            scene.render(&position, 7).unwrap(),
            scene.render(&position, 7).unwrap()
        );
        assert_ne!(
            scene.render(&position, 7).unwrap(),
            scene.render(&position, 8).unwrap()
        );
    }
}

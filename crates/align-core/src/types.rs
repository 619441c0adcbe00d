//! Data model shared by the orchestrator, the estimators and the drivers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Kind of exposure requested from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureKind {
    /// Focus mechanism pushed inside best focus.
    Intra,
    /// Focus mechanism pulled beyond best focus.
    Extra,
    /// In-focus acquisition or detection image.
    Acquisition,
}

impl ExposureKind {
    /// Prefix used in the observation reason, e.g. `INTRA_<reason>`.
    pub fn reason_prefix(&self) -> &'static str {
        match self {
            ExposureKind::Intra => "INTRA",
            ExposureKind::Extra => "EXTRA",
            ExposureKind::Acquisition => "INFOCUS",
        }
    }
}

impl fmt::Display for ExposureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason_prefix())
    }
}

/// Parameters of a single exposure command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureRequest {
    pub kind: ExposureKind,
    /// Exposure time in seconds
    pub exposure_time: f64,
    /// Group identifier shared by every frame of one measurement
    pub group_id: String,
    pub filter: String,
    pub grating: String,
    pub reason: String,
    pub program: String,
}

/// Metadata of an acquired frame, as recorded by the orchestrator.
///
/// Only this record (never pixels) travels to the estimators; they resolve the
/// pixels through a [`crate::frame::FrameStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureRecord {
    pub exposure_id: u64,
    pub kind: ExposureKind,
    pub group_id: String,
    /// Focus offset (mm) applied relative to the in-focus position
    pub focus_offset: f64,
    /// Telescope boresight angle (deg) sampled right after the exposure
    pub boresight_angle: f64,
    /// Exposure time in seconds
    pub exposure_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// An intra/extra focal pair belonging to one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePair {
    pub group_id: String,
    pub intra: ExposureRecord,
    pub extra: ExposureRecord,
    /// De-rotation angle (deg) captured at acquisition time
    pub derotation_angle: f64,
}

/// Source found by the donut measurement in one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDetection {
    /// Flux-weighted centroid, x (pixels)
    pub x: f64,
    /// Flux-weighted centroid, y (pixels)
    pub y: f64,
    /// Geometric centre of the donut footprint, x (pixels)
    pub center_x: f64,
    /// Geometric centre of the donut footprint, y (pixels)
    pub center_y: f64,
    /// Outer ring radius (pixels)
    pub radius: f64,
    /// Background-subtracted flux
    pub flux: f64,
    /// Number of pixels in the footprint
    pub pixels: usize,
}

/// Estimator-specific diagnostics attached to an estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimateDiagnostics {
    pub estimator: String,
    pub intra: SourceDetection,
    pub extra: SourceDetection,
    /// Distance between the intra and extra centroids (pixels)
    pub separation_px: f64,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Wavefront aberration terms in nanometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AberrationEstimate {
    pub coma_x: f64,
    pub coma_y: f64,
    pub defocus: f64,
    #[serde(default)]
    pub diagnostics: EstimateDiagnostics,
}

impl AberrationEstimate {
    pub fn new(coma_x: f64, coma_y: f64, defocus: f64) -> Self {
        Self {
            coma_x,
            coma_y,
            defocus,
            diagnostics: EstimateDiagnostics::default(),
        }
    }

    /// Terms in calibration order: `[coma_x, coma_y, defocus]`.
    pub fn terms(&self) -> [f64; 3] {
        [self.coma_x, self.coma_y, self.defocus]
    }
}

/// Absolute hexapod position (mm).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HexapodPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Relative hexapod offset (mm).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HexapodOffset {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl HexapodOffset {
    pub const ZERO: HexapodOffset = HexapodOffset {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Pure focus offset.
    pub fn focus(z: f64) -> Self {
        Self { x: 0.0, y: 0.0, z }
    }

    /// Transverse (coma) magnitude.
    pub fn transverse(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(values: [f64; 3]) -> Self {
        Self {
            x: values[0],
            y: values[1],
            z: values[2],
        }
    }
}

impl Add for HexapodOffset {
    type Output = HexapodOffset;

    fn add(self, rhs: HexapodOffset) -> HexapodOffset {
        HexapodOffset {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Add<HexapodOffset> for HexapodPosition {
    type Output = HexapodPosition;

    fn add(self, rhs: HexapodOffset) -> HexapodPosition {
        HexapodPosition {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl HexapodPosition {
    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Telescope pointing offset (arcsec).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelescopeOffset {
    pub el: f64,
    pub az: f64,
}

impl TelescopeOffset {
    pub fn is_zero(&self) -> bool {
        self.el == 0.0 && self.az == 0.0
    }
}

/// Mechanical correction derived from an estimate: de-rotated, scaled and clipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionVector {
    pub hexapod: HexapodOffset,
    pub telescope: TelescopeOffset,
}

impl CorrectionVector {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.hexapod.is_zero() && self.telescope.is_zero()
    }

    /// Component-wise sum, used to accumulate corrections over iterations.
    pub fn accumulate(&self, other: &CorrectionVector) -> CorrectionVector {
        CorrectionVector {
            hexapod: self.hexapod + other.hexapod,
            telescope: TelescopeOffset {
                el: self.telescope.el + other.telescope.el,
                az: self.telescope.az + other.telescope.az,
            },
        }
    }
}

/// Rotator positioning strategy for a slew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotatorStrategy {
    /// Position angle relative to North
    Sky,
    /// Sky position angle, wrapped to an achievable range
    SkyAuto,
    /// Aligned with the parallactic angle
    Parallactic,
    /// Initial physical angle, then tracks the sky
    PhysicalSky,
    /// Fixed physical angle, no tracking
    Physical,
}

impl RotatorStrategy {
    /// Whether the rotator follows sky rotation during the observation.
    pub fn is_sky_tracking(&self) -> bool {
        !matches!(self, RotatorStrategy::Physical)
    }
}

/// Where to point the telescope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlewTarget {
    /// Named object, resolved by the pointing component
    Object { name: String },
    /// Explicit ICRS coordinates (ra in hours, dec in degrees)
    Icrs { name: String, ra: f64, dec: f64 },
}

impl SlewTarget {
    pub fn name(&self) -> &str {
        match self {
            SlewTarget::Object { name } | SlewTarget::Icrs { name, .. } => name,
        }
    }
}

/// Slew command with its rotator request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlewRequest {
    pub target: SlewTarget,
    /// Rotator angle in degrees, meaning depends on `rot_strategy`
    pub rot: f64,
    pub rot_strategy: RotatorStrategy,
    /// Expected time on target (s), used to pick the rotator wrap
    pub time_on_target: f64,
}

/// Cone search in the local catalog for a bright enough target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSearch {
    /// Azimuth (deg)
    pub az: f64,
    /// Elevation (deg)
    pub el: f64,
    /// Brightest V magnitude accepted
    pub mag_limit: f64,
    /// Faintest magnitude is `mag_limit + mag_range`
    pub mag_range: f64,
    /// Cone radius (deg)
    pub radius: f64,
}

/// Closed-loop corrections of the optics-correction subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionLoop {
    Hexapod,
    M1,
    Spectrograph,
}

impl fmt::Display for CorrectionLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CorrectionLoop::Hexapod => "hexapod",
            CorrectionLoop::M1 => "m1",
            CorrectionLoop::Spectrograph => "spectrograph",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correction_accumulates_componentwise() {
        let a = CorrectionVector {
            hexapod: HexapodOffset {
                x: 0.1,
                y: -0.2,
                z: 0.05,
            },
            telescope: TelescopeOffset { el: 1.0, az: 2.0 },
        };
        let total = a.accumulate(&a);
        assert_eq!(total.hexapod.as_array(), [0.2, -0.4, 0.1]);
        assert_eq!(total.telescope, TelescopeOffset { el: 2.0, az: 4.0 });
    }

    #[test]
    fn physical_rotator_does_not_track() {
        assert!(!RotatorStrategy::Physical.is_sky_tracking());
        assert!(RotatorStrategy::PhysicalSky.is_sky_tracking());
        assert!(RotatorStrategy::SkyAuto.is_sky_tracking());
    }

    #[test]
    fn slew_target_deserializes_tagged() {
        let target: SlewTarget =
            serde_json::from_str(r#"{"kind":"icrs","name":"HD 164461","ra":18.0,"dec":-22.5}"#)
                .unwrap();
        assert_eq!(target.name(), "HD 164461");
        assert!(matches!(target, SlewTarget::Icrs { ra, .. } if ra == 18.0));
    }
}

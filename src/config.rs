//! Alignment run configuration using Figment
//!
//! An [`AlignmentConfig`] is built once per run and shared as
//! `Arc<AlignmentConfig>`; nothing mutates it afterwards. The calibration
//! matrices live here too, so two configurations for different instruments
//! never share state.
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `WFALIGN_`, with `__` separating
//!    nested keys
//!
//! ```text
//! WFALIGN_ACQUISITION__DZ=0.6
//! WFALIGN_ESTIMATOR__BACKEND=isolated
//! WFALIGN_CORRECTION__MAX_ITER=3
//! ```
//!
//! Every section has defaults matching the AuxTel/LATISS alignment procedure,
//! so an empty file is a valid configuration.

use align_core::error::AlignError;
use align_core::types::{CatalogSearch, RotatorStrategy};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "WFALIGN_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for AlignError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::LoadError(e) => AlignError::Config(e.to_string()),
            ConfigError::ValidationError(msg) => AlignError::Config(msg),
        }
    }
}

/// Top-level alignment configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub rotator: RotatorConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub optics: OpticsConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where the telescope points before the pair is taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TargetConfig {
    /// Stay where the telescope is; no slew is issued.
    #[default]
    CurrentPointing,
    /// Slew to a named target, optionally with explicit ICRS coordinates.
    Track {
        name: String,
        #[serde(default)]
        icrs: Option<IcrsCoordinates>,
    },
    /// Search the local catalog around az/el for a bright enough star.
    Find(FindTargetConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IcrsCoordinates {
    /// Right ascension (hour)
    pub ra: f64,
    /// Declination (deg)
    pub dec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindTargetConfig {
    /// Azimuth (deg)
    pub az: f64,
    /// Elevation (deg)
    pub el: f64,
    /// Brightest V magnitude accepted
    pub mag_limit: f64,
    #[serde(default = "default_mag_range")]
    pub mag_range: f64,
    /// Cone search radius (deg)
    #[serde(default = "default_search_radius")]
    pub radius: f64,
}

impl FindTargetConfig {
    pub fn search(&self) -> CatalogSearch {
        CatalogSearch {
            az: self.az,
            el: self.el,
            mag_limit: self.mag_limit,
            mag_range: self.mag_range,
            radius: self.radius,
        }
    }
}

/// Rotator request sent with the slew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotatorConfig {
    /// Rotator angle (deg), meaning depends on `strategy`
    #[serde(default)]
    pub angle: f64,
    #[serde(default = "default_rotator_strategy")]
    pub strategy: RotatorStrategy,
    /// Expected time on target (s)
    #[serde(default = "default_time_on_target")]
    pub time_on_target: f64,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            angle: 0.0,
            strategy: default_rotator_strategy(),
            time_on_target: default_time_on_target(),
        }
    }
}

/// Intra/extra focal acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default = "default_filter")]
    pub grating: String,
    /// Intra/extra exposure time (s)
    #[serde(default = "default_exposure_time")]
    pub exposure_time: f64,
    /// In-focus acquisition exposure time (s)
    #[serde(default = "default_acq_exposure_time")]
    pub acq_exposure_time: f64,
    /// Focus offset magnitude for the pair (mm)
    #[serde(default = "default_dz")]
    pub dz: f64,
    /// Extra hexapod travel for the extra-focal image, compensating the
    /// magnification change of moving the secondary (mm, always positive)
    #[serde(default = "default_extra_focal_offset")]
    pub extra_focal_offset: f64,
    /// Take an in-focus image right after the slew
    #[serde(default)]
    pub take_detection_image: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_program")]
    pub program: String,
    /// Replay pre-recorded frames instead of exposing
    #[serde(default)]
    pub playlist: Option<PlaylistConfig>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            grating: default_filter(),
            exposure_time: default_exposure_time(),
            acq_exposure_time: default_acq_exposure_time(),
            dz: default_dz(),
            extra_focal_offset: default_extra_focal_offset(),
            take_detection_image: false,
            reason: None,
            program: default_program(),
            playlist: None,
        }
    }
}

/// Pre-recorded exposure ids served in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistConfig {
    pub frames: Vec<u64>,
    /// Start over once exhausted
    #[serde(default)]
    pub repeat: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorBackend {
    /// In-process coarse donut model
    #[default]
    Fast,
    /// Refined model behind a worker boundary
    Isolated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerTransportKind {
    /// Separate OS process speaking JSON lines
    #[default]
    Process,
    /// Worker task inside this process
    Task,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub transport: WorkerTransportKind,
    #[serde(default = "default_worker_program")]
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            transport: WorkerTransportKind::default(),
            program: default_worker_program(),
            args: Vec::new(),
        }
    }
}

/// Wavefront estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default)]
    pub backend: EstimatorBackend,
    /// Per-attempt deadline for the isolated estimator
    #[serde(default = "default_estimator_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Attempts on timeout (1 or 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Largest accepted distance between intra and extra sources (px)
    #[serde(default = "default_max_source_separation")]
    pub max_source_separation_px: f64,
    #[serde(default = "default_detection_sigma")]
    pub detection_sigma: f64,
    #[serde(default = "default_min_source_pixels")]
    pub min_source_pixels: usize,
    /// Central obscuration as a fraction of the pupil radius
    #[serde(default = "default_obscuration")]
    pub obscuration: f64,
    /// Defocus wavefront (nm) per mm of focus error
    #[serde(default = "default_defocus_nm_per_mm")]
    pub defocus_nm_per_mm: f64,
    /// Coma wavefront (nm) per pixel of centroid shift
    #[serde(default = "default_coma_nm_per_px")]
    pub coma_nm_per_px: f64,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            backend: EstimatorBackend::default(),
            timeout: default_estimator_timeout(),
            max_attempts: default_max_attempts(),
            max_source_separation_px: default_max_source_separation(),
            detection_sigma: default_detection_sigma(),
            min_source_pixels: default_min_source_pixels(),
            obscuration: default_obscuration(),
            defocus_nm_per_mm: default_defocus_nm_per_mm(),
            coma_nm_per_px: default_coma_nm_per_px(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Per-axis hexapod values (mm or unitless).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisValues {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AxisValues {
    pub const fn splat(value: f64) -> Self {
        Self {
            x: value,
            y: value,
            z: value,
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Absolute travel range of one axis (mm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelLimits {
    pub x: AxisRange,
    pub y: AxisRange,
    pub z: AxisRange,
}

impl TravelLimits {
    pub fn as_array(&self) -> [AxisRange; 3] {
        [self.x, self.y, self.z]
    }
}

/// Correction policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Fraction of the computed offset applied per axis, in (0, 1]
    #[serde(default = "default_gains")]
    pub gains: AxisValues,
    /// Focus residual below which the loop has converged (mm)
    #[serde(default = "default_focus_threshold")]
    pub focus_threshold: f64,
    /// Transverse residual below which the loop has converged (mm)
    #[serde(default = "default_coma_threshold")]
    pub coma_threshold: f64,
    /// Largest offset applied per iteration, per axis (mm)
    #[serde(default = "default_max_correction")]
    pub max_correction: AxisValues,
    /// Largest telescope offset per iteration, per axis (arcsec)
    #[serde(default = "default_max_telescope_offset")]
    pub max_telescope_offset: f64,
    #[serde(default)]
    pub travel_limits: Option<TravelLimits>,
    /// Follow coma corrections with a telescope offset
    #[serde(default = "default_true")]
    pub offset_telescope: bool,
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            gains: default_gains(),
            focus_threshold: default_focus_threshold(),
            coma_threshold: default_coma_threshold(),
            max_correction: default_max_correction(),
            max_telescope_offset: default_max_telescope_offset(),
            travel_limits: None,
            offset_telescope: true,
            max_iter: default_max_iter(),
        }
    }
}

/// Calibration of the optical train
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpticsConfig {
    /// Aberration (nm) to hexapod (mm) calibration, row-major
    #[serde(default = "default_sensitivity")]
    pub sensitivity: [[f64; 3]; 3],
    /// Hexapod (mm) to telescope offset (arcsec) scale, row-major
    #[serde(default = "default_hexapod_to_telescope")]
    pub hexapod_to_telescope: [[f64; 3]; 3],
    /// Camera rotation relative to the rotator (deg)
    #[serde(default)]
    pub camera_rotation_angle: f64,
}

impl Default for OpticsConfig {
    fn default() -> Self {
        Self {
            sensitivity: default_sensitivity(),
            hexapod_to_telescope: default_hexapod_to_telescope(),
            camera_rotation_angle: 0.0,
        }
    }
}

/// In-position polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_polls: default_max_polls(),
            poll_interval: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of `<exposure_id>.frame` files read by the worker
    #[serde(default = "default_frames_dir")]
    pub frames_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            frames_dir: default_frames_dir(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_mag_range() -> f64 {
    2.0
}

fn default_search_radius() -> f64 {
    0.5
}

fn default_rotator_strategy() -> RotatorStrategy {
    RotatorStrategy::PhysicalSky
}

fn default_time_on_target() -> f64 {
    600.0
}

fn default_filter() -> String {
    "empty_1".to_string()
}

fn default_exposure_time() -> f64 {
    30.0
}

fn default_acq_exposure_time() -> f64 {
    5.0
}

fn default_dz() -> f64 {
    0.8
}

fn default_extra_focal_offset() -> f64 {
    0.0011
}

fn default_program() -> String {
    "CWFS".to_string()
}

fn default_worker_program() -> PathBuf {
    PathBuf::from("wavefront_worker")
}

fn default_estimator_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    2
}

fn default_max_source_separation() -> f64 {
    100.0
}

fn default_detection_sigma() -> f64 {
    5.0
}

fn default_min_source_pixels() -> usize {
    50
}

fn default_obscuration() -> f64 {
    0.423
}

fn default_defocus_nm_per_mm() -> f64 {
    4200.0
}

fn default_coma_nm_per_px() -> f64 {
    20.0
}

fn default_gains() -> AxisValues {
    AxisValues::splat(1.0)
}

fn default_focus_threshold() -> f64 {
    0.015
}

fn default_coma_threshold() -> f64 {
    0.2
}

fn default_max_correction() -> AxisValues {
    AxisValues {
        x: 1.0,
        y: 1.0,
        z: 0.12,
    }
}

fn default_max_telescope_offset() -> f64 {
    60.0
}

fn default_true() -> bool {
    true
}

fn default_max_iter() -> u32 {
    5
}

fn default_sensitivity() -> [[f64; 3]; 3] {
    let coma_per_nm = 1.0 / 206.0;
    let focus_per_nm = 1.0 / 4200.0;
    [
        [coma_per_nm, 0.0, 0.0],
        [0.0, -coma_per_nm, -(109.0 / 206.0) * focus_per_nm],
        [0.0, 0.0, focus_per_nm],
    ]
}

fn default_hexapod_to_telescope() -> [[f64; 3]; 3] {
    [[52.459, 0.0, 0.0], [0.0, 50.468, 0.0], [0.0, 0.0, 0.0]]
}

fn default_max_polls() -> u32 {
    60
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_frames_dir() -> PathBuf {
    PathBuf::from("frames")
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl AlignmentConfig {
    /// Load configuration from a TOML file and `WFALIGN_` environment variables.
    ///
    /// Environment variables take precedence over the file. A missing file is
    /// not an error: defaults and environment still apply. The result is
    /// validated before it is returned.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::figment(path.as_ref()).extract_validated()
    }

    /// Parse a configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Figment::new().merge(Toml::string(toml)).extract_validated()
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Checks focus offsets, gains, thresholds, clipping bounds, travel limits,
    /// calibration values and retry policy. Nothing here touches hardware.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let acq = &self.acquisition;
        if !positive(acq.dz) {
            return Err(invalid(format!("acquisition.dz must be positive, got {}", acq.dz)));
        }
        if !non_negative(acq.extra_focal_offset) {
            return Err(invalid(format!(
                "acquisition.extra_focal_offset must be >= 0, got {}",
                acq.extra_focal_offset
            )));
        }
        if !positive(acq.exposure_time) || !positive(acq.acq_exposure_time) {
            return Err(invalid("exposure times must be positive".to_string()));
        }
        if let Some(playlist) = &acq.playlist {
            if playlist.frames.is_empty() {
                return Err(invalid("acquisition.playlist.frames cannot be empty".to_string()));
            }
        }

        let rot = &self.rotator;
        if !rot.angle.is_finite() || !non_negative(rot.time_on_target) {
            return Err(invalid(format!(
                "rotator angle/time_on_target invalid (angle={}, time_on_target={})",
                rot.angle, rot.time_on_target
            )));
        }

        match &self.target {
            TargetConfig::CurrentPointing => {}
            TargetConfig::Track { name, icrs } => {
                if name.trim().is_empty() {
                    return Err(invalid("target.name cannot be empty".to_string()));
                }
                if let Some(icrs) = icrs {
                    if !(0.0..=24.0).contains(&icrs.ra) || !(-90.0..=90.0).contains(&icrs.dec) {
                        return Err(invalid(format!(
                            "target.icrs out of range (ra={}, dec={})",
                            icrs.ra, icrs.dec
                        )));
                    }
                }
            }
            TargetConfig::Find(find) => {
                if !(0.0..=90.0).contains(&find.el) {
                    return Err(invalid(format!("target.el must be in [0, 90], got {}", find.el)));
                }
                if !find.az.is_finite() || !find.mag_limit.is_finite() {
                    return Err(invalid("target az/mag_limit must be finite".to_string()));
                }
                if !positive(find.radius) || !non_negative(find.mag_range) {
                    return Err(invalid("target search radius/mag_range invalid".to_string()));
                }
            }
        }

        let est = &self.estimator;
        if !(1..=2).contains(&est.max_attempts) {
            return Err(invalid(format!(
                "estimator.max_attempts must be 1 or 2, got {}",
                est.max_attempts
            )));
        }
        if est.timeout.is_zero() {
            return Err(invalid("estimator.timeout must be non-zero".to_string()));
        }
        if !(0.0..1.0).contains(&est.obscuration) {
            return Err(invalid(format!(
                "estimator.obscuration must be in [0, 1), got {}",
                est.obscuration
            )));
        }
        if !positive(est.detection_sigma) || !positive(est.max_source_separation_px) {
            return Err(invalid(
                "estimator.detection_sigma and max_source_separation_px must be positive"
                    .to_string(),
            ));
        }
        if !est.defocus_nm_per_mm.is_finite() || est.defocus_nm_per_mm == 0.0 {
            return Err(invalid(format!(
                "estimator.defocus_nm_per_mm must be finite and non-zero, got {}",
                est.defocus_nm_per_mm
            )));
        }
        if !positive(est.coma_nm_per_px) {
            return Err(invalid(format!(
                "estimator.coma_nm_per_px must be positive, got {}",
                est.coma_nm_per_px
            )));
        }
        if est.min_source_pixels == 0 {
            return Err(invalid("estimator.min_source_pixels must be >= 1".to_string()));
        }

        let corr = &self.correction;
        for (axis, gain) in ["x", "y", "z"].iter().zip(corr.gains.as_array()) {
            if !(gain > 0.0 && gain <= 1.0) {
                return Err(invalid(format!(
                    "correction.gains.{} must be in (0, 1], got {}",
                    axis, gain
                )));
            }
        }
        for (axis, bound) in ["x", "y", "z"].iter().zip(corr.max_correction.as_array()) {
            if !non_negative(bound) {
                return Err(invalid(format!(
                    "correction.max_correction.{} must be >= 0, got {}",
                    axis, bound
                )));
            }
        }
        if !positive(corr.focus_threshold) || !positive(corr.coma_threshold) {
            return Err(invalid("convergence thresholds must be positive".to_string()));
        }
        if !non_negative(corr.max_telescope_offset) {
            return Err(invalid("correction.max_telescope_offset must be >= 0".to_string()));
        }
        if corr.max_iter == 0 {
            return Err(invalid("correction.max_iter must be >= 1".to_string()));
        }
        if let Some(limits) = &corr.travel_limits {
            for (axis, range) in ["x", "y", "z"].iter().zip(limits.as_array()) {
                if !range.min.is_finite() || !range.max.is_finite() {
                    return Err(invalid(format!(
                        "correction.travel_limits.{} must be finite, got [{}, {}]",
                        axis, range.min, range.max
                    )));
                }
                if range.min > range.max {
                    return Err(invalid(format!(
                        "correction.travel_limits.{}: min {} > max {}",
                        axis, range.min, range.max
                    )));
                }
            }
        }

        let finite = |m: &[[f64; 3]; 3]| m.iter().flatten().all(|v| v.is_finite());
        if !finite(&self.optics.sensitivity) || !finite(&self.optics.hexapod_to_telescope) {
            return Err(invalid("optics matrices must be finite".to_string()));
        }
        if !self.optics.camera_rotation_angle.is_finite() {
            return Err(invalid("optics.camera_rotation_angle must be finite".to_string()));
        }

        if self.verification.max_polls == 0 {
            return Err(invalid("verification.max_polls must be >= 1".to_string()));
        }

        Ok(())
    }
}

/// NaN fails both checks.
fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::ValidationError(msg)
}

trait ExtractValidated {
    fn extract_validated(self) -> Result<AlignmentConfig, ConfigError>;
}

impl ExtractValidated for Figment {
    fn extract_validated(self) -> Result<AlignmentConfig, ConfigError> {
        let config: AlignmentConfig = self.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = AlignmentConfig::from_toml_str("").unwrap();
        assert_eq!(config, AlignmentConfig::default());
        assert_eq!(config.acquisition.dz, 0.8);
        assert_eq!(config.correction.max_correction.z, 0.12);
        assert_eq!(config.estimator.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_sections_parse() {
        let config = AlignmentConfig::from_toml_str(
            r#"
            [target]
            mode = "track"
            name = "HD 164461"
            icrs = { ra = 18.0, dec = -22.5 }

            [rotator]
            angle = 12.5
            strategy = "physical"

            [estimator]
            backend = "isolated"
            timeout = "2s"

            [estimator.worker]
            transport = "task"

            [correction]
            gains = { x = 0.5, y = 0.5, z = 0.8 }
            travel_limits = { x = { min = -5.0, max = 5.0 }, y = { min = -5.0, max = 5.0 }, z = { min = -1.0, max = 1.0 } }

            [verification]
            poll_interval = "50ms"
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.target,
            TargetConfig::Track { ref name, icrs: Some(_) } if name == "HD 164461"
        ));
        assert_eq!(config.rotator.strategy, RotatorStrategy::Physical);
        assert_eq!(config.estimator.backend, EstimatorBackend::Isolated);
        assert_eq!(config.estimator.worker.transport, WorkerTransportKind::Task);
        assert_eq!(config.estimator.timeout, Duration::from_secs(2));
        assert_eq!(config.correction.gains.z, 0.8);
        assert_eq!(config.verification.poll_interval, Duration::from_millis(50));
        assert!(config.correction.travel_limits.is_some());
    }

    #[test]
    fn test_find_target_defaults() {
        let config = AlignmentConfig::from_toml_str(
            r#"
            [target]
            mode = "find"
            az = 180.0
            el = 60.0
            mag_limit = 6.0
            "#,
        )
        .unwrap();
        match config.target {
            TargetConfig::Find(find) => {
                assert_eq!(find.search().mag_range, 2.0);
                assert_eq!(find.search().radius, 0.5);
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_gain_out_of_range_rejected() {
        let err = AlignmentConfig::from_toml_str("[correction]\ngains = { x = 1.5, y = 1.0, z = 1.0 }")
            .unwrap_err();
        assert!(err.to_string().contains("gains.x"));

        let err = AlignmentConfig::from_toml_str("[correction]\ngains = { x = 1.0, y = 0.0, z = 1.0 }")
            .unwrap_err();
        assert!(err.to_string().contains("gains.y"));
    }

    #[test]
    fn test_retry_policy_bounded() {
        let err = AlignmentConfig::from_toml_str("[estimator]\nmax_attempts = 3").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_negative_dz_rejected() {
        let mut config = AlignmentConfig::default();
        config.acquisition.dz = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_travel_limits_rejected() {
        let mut config = AlignmentConfig::default();
        let range = AxisRange { min: -1.0, max: 1.0 };
        config.correction.travel_limits = Some(TravelLimits {
            x: range,
            y: range,
            z: AxisRange { min: 1.0, max: -1.0 },
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("travel_limits.z"));
    }

    #[test]
    fn test_nan_values_rejected() {
        for toml in [
            "[correction]\nmax_telescope_offset = nan\n",
            "[correction]\nfocus_threshold = nan\n",
            "[acquisition]\nexposure_time = nan\n",
            "[correction.travel_limits]\nx = { min = nan, max = 1.0 }\ny = { min = -1.0, max = 1.0 }\nz = { min = -1.0, max = 1.0 }\n",
            "[optics]\ncamera_rotation_angle = inf\n",
        ] {
            let err = AlignmentConfig::from_toml_str(toml).unwrap_err();
            assert!(
                matches!(err, ConfigError::ValidationError(_)),
                "{toml:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_config_error_maps_to_align_error() {
        let err: AlignError = ConfigError::ValidationError("bad".into()).into();
        assert_eq!(err, AlignError::Config("bad".into()));
    }

    #[test]
    fn test_unknown_backend_is_load_error() {
        let err = AlignmentConfig::from_toml_str("[estimator]\nbackend = \"quantum\"").unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}

//! Curvature model: two donut measurements to an aberration estimate.
//!
//! With `f` the focus offset applied for an exposure and `r` the measured ring
//! radius, the focus error of the mechanism is
//!
//! ```text
//! e = (f_i − f_e)/2 · (r_i − r_e)/(r_i + r_e) − (f_i + f_e)/2
//! ```
//!
//! and the terms reported are
//!
//! ```text
//! defocus = −defocus_nm_per_mm · e
//! coma    =  coma_nm_per_px · (s_i − s_e)/2
//! ```
//!
//! where `s` is the offset of the flux-weighted centroid from the geometric
//! centre of the donut. Coma brightens one side of the ring and the brightened
//! side swaps across focus, hence the difference.

use crate::estimator::donut::{self, DonutMeasurement};
use crate::estimator::EstimatorOptions;
use align_core::frame::Frame;
use align_core::types::{AberrationEstimate, EstimateDiagnostics, ExposureRecord};

/// Which donut measurement to run on each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonutModel {
    Coarse,
    Refined,
}

impl DonutModel {
    pub fn name(&self) -> &'static str {
        match self {
            DonutModel::Coarse => "fast",
            DonutModel::Refined => "isolated",
        }
    }
}

/// Estimate the aberration from an intra/extra pair of frames.
///
/// Errors are plain reasons; callers wrap them in `AlignError::Estimation` or
/// a worker error response.
pub fn estimate_pair(
    intra: (&ExposureRecord, &Frame),
    extra: (&ExposureRecord, &Frame),
    options: &EstimatorOptions,
    model: DonutModel,
) -> Result<AberrationEstimate, String> {
    let refine = model == DonutModel::Refined;
    let intra_m = donut::measure(intra.1, options, refine)
        .map_err(|e| format!("intra-focal exposure {}: {}", intra.0.exposure_id, e))?;
    let extra_m = donut::measure(extra.1, options, refine)
        .map_err(|e| format!("extra-focal exposure {}: {}", extra.0.exposure_id, e))?;

    let (i, e) = (&intra_m.detection, &extra_m.detection);
    let separation = (i.x - e.x).hypot(i.y - e.y);
    if separation > options.max_source_separation_px {
        return Err(format!(
            "ambiguous source: intra/extra centroids {:.1} px apart (tolerance {:.1} px)",
            separation, options.max_source_separation_px
        ));
    }

    let (f_i, f_e) = (intra.0.focus_offset, extra.0.focus_offset);
    let focus_error =
        (f_i - f_e) / 2.0 * (i.radius - e.radius) / (i.radius + e.radius) - (f_i + f_e) / 2.0;
    let defocus = -options.defocus_nm_per_mm * focus_error;

    let shift = |m: &DonutMeasurement| {
        (
            m.detection.x - m.detection.center_x,
            m.detection.y - m.detection.center_y,
        )
    };
    let (si_x, si_y) = shift(&intra_m);
    let (se_x, se_y) = shift(&extra_m);
    let coma_x = options.coma_nm_per_px * (si_x - se_x) / 2.0;
    let coma_y = options.coma_nm_per_px * (si_y - se_y) / 2.0;

    let mut flags = Vec::new();
    if intra_m.touches_edge || extra_m.touches_edge {
        flags.push("footprint_touches_edge".to_string());
    }
    if (i.radius - e.radius).abs() > 0.5 * (i.radius + e.radius) {
        flags.push("unbalanced_defocus".to_string());
    }

    Ok(AberrationEstimate {
        coma_x,
        coma_y,
        defocus,
        diagnostics: EstimateDiagnostics {
            estimator: model.name().to_string(),
            intra: intra_m.detection,
            extra: extra_m.detection,
            separation_px: separation,
            flags,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::types::ExposureKind;
    use chrono::Utc;

    fn record(kind: ExposureKind, id: u64, focus_offset: f64) -> ExposureRecord {
        ExposureRecord {
            exposure_id: id,
            kind,
            group_id: "g".into(),
            focus_offset,
            boresight_angle: 90.0,
            exposure_time: 30.0,
            timestamp: Utc::now(),
        }
    }

    fn donut(size: u32, cx: f64, cy: f64, outer: f64) -> Frame {
        let inner = outer * 0.423;
        let mut pixels = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                let r = (x as f64 - cx).hypot(y as f64 - cy);
                pixels.push(if r <= outer && r >= inner { 300.0 } else { 100.0 });
            }
        }
        Frame::new(size, size, pixels).unwrap()
    }

    #[test]
    fn symmetric_pair_has_no_focus_error() {
        let intra = donut(200, 100.0, 100.0, 40.0);
        let extra = donut(200, 100.0, 100.0, 40.0);
        let est = estimate_pair(
            (&record(ExposureKind::Intra, 1, 0.8), &intra),
            (&record(ExposureKind::Extra, 2, -0.8), &extra),
            &EstimatorOptions::default(),
            DonutModel::Coarse,
        )
        .unwrap();
        assert!(est.defocus.abs() < 1e-9);
        assert!(est.coma_x.abs() < 1e-9 && est.coma_y.abs() < 1e-9);
        assert_eq!(est.diagnostics.estimator, "fast");
    }

    #[test]
    fn smaller_intra_donut_gives_positive_defocus() {
        // Best focus sits above the mechanism, so the intra donut is smaller.
        let intra = donut(200, 100.0, 100.0, 36.0);
        let extra = donut(200, 100.0, 100.0, 44.0);
        let est = estimate_pair(
            (&record(ExposureKind::Intra, 1, 0.8), &intra),
            (&record(ExposureKind::Extra, 2, -0.8), &extra),
            &EstimatorOptions::default(),
            DonutModel::Coarse,
        )
        .unwrap();
        // e = 0.8 * (36 - 44)/80 = -0.08 mm, defocus = +336 nm
        assert!((est.defocus - 336.0).abs() < 30.0, "defocus {}", est.defocus);
    }

    #[test]
    fn distant_sources_are_ambiguous() {
        let intra = donut(400, 100.0, 100.0, 30.0);
        let extra = donut(400, 300.0, 300.0, 30.0);
        let err = estimate_pair(
            (&record(ExposureKind::Intra, 1, 0.8), &intra),
            (&record(ExposureKind::Extra, 2, -0.8), &extra),
            &EstimatorOptions::default(),
            DonutModel::Refined,
        )
        .unwrap_err();
        assert!(err.contains("ambiguous source"));
    }

    #[test]
    fn missing_source_names_the_exposure() {
        let intra = donut(200, 100.0, 100.0, 40.0);
        let blank = Frame::filled(200, 200, 100.0).unwrap();
        let err = estimate_pair(
            (&record(ExposureKind::Intra, 1, 0.8), &intra),
            (&record(ExposureKind::Extra, 42, -0.8), &blank),
            &EstimatorOptions::default(),
            DonutModel::Coarse,
        )
        .unwrap_err();
        assert!(err.contains("extra-focal exposure 42"));
    }
}

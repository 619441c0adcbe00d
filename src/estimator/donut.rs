//! Donut measurement on a single defocused frame.
//!
//! The measurement finds the pixels belonging to the defocused star with a
//! robust background estimate (median + MAD) and a sigma threshold, then
//! computes:
//!
//! - the flux-weighted centroid,
//! - the geometric centre of the footprint (unweighted mean of the mask),
//! - the outer ring radius from the mean squared distance to the centre.
//!
//! For an annulus of outer radius `R` and obscuration `ε`, the footprint has
//! `<r²> = R²(1 + ε²)/2`, which is inverted to recover `R`.

use crate::estimator::EstimatorOptions;
use align_core::frame::Frame;
use align_core::types::SourceDetection;
use ndarray::{Array2, ArrayView2};

/// Scale from MAD to Gaussian sigma.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Refinement keeps pixels within this many ring radii of the centre.
const REFINE_RADIUS_FACTOR: f64 = 1.5;

const REFINE_ITERATIONS: usize = 3;

/// Robust background level and noise of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Background {
    pub level: f64,
    pub sigma: f64,
}

/// Median and MAD-derived sigma of all pixels.
pub fn background(image: &ArrayView2<f32>) -> Background {
    let mut values: Vec<f32> = image.iter().copied().collect();
    let level = median(&mut values);
    let mut deviations: Vec<f32> = image
        .iter()
        .map(|&v| (v as f64 - level).abs() as f32)
        .collect();
    let mad = median(&mut deviations);
    Background {
        level,
        sigma: MAD_TO_SIGMA * mad,
    }
}

fn median(values: &mut [f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    *m as f64
}

/// Circular aperture `((x, y), radius)` in pixels.
type Aperture = ((f64, f64), f64);

/// Moments of the masked footprint. Weights are background-subtracted.
#[derive(Default)]
struct Moments {
    count: usize,
    sum_x: f64,
    sum_y: f64,
    flux: f64,
    flux_x: f64,
    flux_y: f64,
    touches_edge: bool,
}

impl Moments {
    fn center(&self) -> (f64, f64) {
        let n = self.count as f64;
        (self.sum_x / n, self.sum_y / n)
    }
}

/// Result of measuring one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DonutMeasurement {
    pub detection: SourceDetection,
    pub background: Background,
    /// Footprint reaches the frame border; the radius is underestimated.
    pub touches_edge: bool,
}

/// Measure the donut in `frame`.
///
/// With `refine`, the footprint is iteratively restricted to pixels close to
/// the donut centre, which rejects cosmic rays and faint neighbours that the
/// plain threshold mask would include.
pub fn measure(
    frame: &Frame,
    options: &EstimatorOptions,
    refine: bool,
) -> Result<DonutMeasurement, String> {
    let image = frame.view();
    let bg = background(&image);
    let threshold = bg.level + options.detection_sigma * bg.sigma;

    let mut mask = source_mask(&image, threshold, None);
    let mut moments = compute_moments(&image, &mask.view(), bg.level);
    check_pixels(&moments, options)?;
    let mut radius = ring_radius(&mask.view(), moments.center(), options.obscuration);

    if refine {
        for _ in 0..REFINE_ITERATIONS {
            let aperture = (moments.center(), REFINE_RADIUS_FACTOR * radius);
            mask = source_mask(&image, threshold, Some(aperture));
            let next = compute_moments(&image, &mask.view(), bg.level);
            check_pixels(&next, options)?;
            radius = ring_radius(&mask.view(), next.center(), options.obscuration);
            let moved = {
                let (ax, ay) = moments.center();
                let (bx, by) = next.center();
                (ax - bx).hypot(ay - by)
            };
            moments = next;
            if moved < 1e-3 {
                break;
            }
        }
    }

    let (center_x, center_y) = moments.center();
    Ok(DonutMeasurement {
        detection: SourceDetection {
            x: moments.flux_x / moments.flux,
            y: moments.flux_y / moments.flux,
            center_x,
            center_y,
            radius,
            flux: moments.flux,
            pixels: moments.count,
        },
        background: bg,
        touches_edge: moments.touches_edge,
    })
}

fn check_pixels(moments: &Moments, options: &EstimatorOptions) -> Result<(), String> {
    if moments.count < options.min_source_pixels || moments.flux <= 0.0 {
        return Err(format!(
            "no source detected: {} pixels above threshold (minimum {})",
            moments.count, options.min_source_pixels
        ));
    }
    Ok(())
}

/// Pixels above `threshold`, optionally restricted to `aperture`.
fn source_mask(
    image: &ArrayView2<f32>,
    threshold: f64,
    aperture: Option<Aperture>,
) -> Array2<bool> {
    let mut mask = image.map(|&v| v as f64 > threshold);
    if let Some(((cx, cy), r)) = aperture {
        for ((row, col), keep) in mask.indexed_iter_mut() {
            if *keep && (col as f64 - cx).hypot(row as f64 - cy) > r {
                *keep = false;
            }
        }
    }
    mask
}

fn compute_moments(image: &ArrayView2<f32>, mask: &ArrayView2<bool>, level: f64) -> Moments {
    let (rows, cols) = mask.dim();
    let mut moments = Moments::default();
    for ((row, col), &in_mask) in mask.indexed_iter() {
        if !in_mask {
            continue;
        }
        let weight = image[[row, col]] as f64 - level;
        let (x, y) = (col as f64, row as f64);
        moments.count += 1;
        moments.sum_x += x;
        moments.sum_y += y;
        moments.flux += weight;
        moments.flux_x += weight * x;
        moments.flux_y += weight * y;
        if row == 0 || col == 0 || row + 1 == rows || col + 1 == cols {
            moments.touches_edge = true;
        }
    }
    moments
}

/// Outer radius from the unweighted second moment of the footprint.
fn ring_radius(mask: &ArrayView2<bool>, center: (f64, f64), obscuration: f64) -> f64 {
    let (cx, cy) = center;
    let (sum_r2, count) = mask
        .indexed_iter()
        .filter(|&(_, &in_mask)| in_mask)
        .fold((0.0, 0usize), |(sum, n), ((row, col), _)| {
            let dx = col as f64 - cx;
            let dy = row as f64 - cy;
            (sum + dx * dx + dy * dy, n + 1)
        });
    let mean_r2 = sum_r2 / count as f64;
    (2.0 * mean_r2 / (1.0 + obscuration * obscuration)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    fn ring(size: u32, cx: f64, cy: f64, outer: f64, inner: f64, level: f32) -> Frame {
        let mut pixels = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                let r = (x as f64 - cx).hypot(y as f64 - cy);
                pixels.push(if r <= outer && r >= inner { level } else { 10.0 });
            }
        }
        Frame::new(size, size, pixels).unwrap()
    }

    #[test]
    fn background_ignores_source() {
        let frame = ring(64, 32.0, 32.0, 10.0, 4.0, 500.0);
        let bg = background(&frame.view());
        assert_eq!(bg.level, 10.0);
        assert_eq!(bg.sigma, 0.0);
    }

    #[test]
    fn measures_centre_and_radius() {
        let frame = ring(128, 60.0, 70.0, 30.0, 30.0 * 0.423, 300.0);
        let m = measure(&frame, &EstimatorOptions::default(), false).unwrap();
        assert!((m.detection.center_x - 60.0).abs() < 1e-9);
        assert!((m.detection.center_y - 70.0).abs() < 1e-9);
        assert!((m.detection.x - 60.0).abs() < 1e-9);
        assert!((m.detection.radius - 30.0).abs() < 0.5, "radius {}", m.detection.radius);
        assert!(!m.touches_edge);
    }

    #[test]
    fn empty_frame_has_no_source() {
        let frame = Frame::filled(32, 32, 100.0).unwrap();
        let err = measure(&frame, &EstimatorOptions::default(), false).unwrap_err();
        assert!(err.contains("no source detected"));
    }

    #[test]
    fn refinement_rejects_distant_hot_pixels() {
        let mut frame = ring(128, 50.0, 50.0, 20.0, 20.0 * 0.423, 300.0);
        // A cluster of hot pixels far from the donut drags the plain centre.
        frame.view_mut().slice_mut(s![118..124, 118..124]).fill(300.0);
        let options = EstimatorOptions::default();
        let plain = measure(&frame, &options, false).unwrap();
        let refined = measure(&frame, &options, true).unwrap();
        assert!((plain.detection.center_x - 50.0).abs() > 1.0);
        assert!((refined.detection.center_x - 50.0).abs() < 1e-9);
        assert!((refined.detection.radius - 20.0).abs() < 0.5);
    }
}

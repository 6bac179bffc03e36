//! Bouguet's stereo rectification
//!
//! Both cameras are rotated half way towards each other, then jointly so that
//! the baseline lies along the image x axis (or y for a vertical rig). The
//! principal points are shared, so corresponding points at infinity have zero
//! disparity.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Rotation3, Vector3};
use tracing::debug;

use crate::stereo_pipeline::calibration::{Distortion, StereoCalibration};
use crate::stereo_pipeline::common::error::{Result, StereoError};
use crate::stereo_pipeline::rectify::types::{StereoRectification, ValidRoi};
use crate::stereo_pipeline::rectify::undistort::undistort_points;

/// Samples per side of the grid used to find the valid rectangles.
const GRID: usize = 9;

/// Axis-aligned rectangle in rectified pixel coordinates.
#[derive(Debug, Clone, Copy)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Rotation vector of `r` (axis scaled by angle).
fn rodrigues_vector(r: &Matrix3<f64>) -> Vector3<f64> {
    Rotation3::from_matrix(r).scaled_axis()
}

fn rodrigues_matrix(v: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::new(*v).into_inner()
}

/// Inscribed and circumscribed rectangles of the image area once undistorted,
/// rotated by `r` and projected with `p`.
fn rectangles(
    k: &Matrix3<f64>,
    dist: &Distortion,
    r: &Matrix3<f64>,
    p: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> (Rect, Rect) {
    let mut grid = Vec::with_capacity(GRID * GRID);
    for y in 0..GRID {
        for x in 0..GRID {
            grid.push((
                x as f64 * width as f64 / (GRID - 1) as f64,
                y as f64 * height as f64 / (GRID - 1) as f64,
            ));
        }
    }
    let pts = undistort_points(&grid, k, dist, Some(r), Some(p));

    let (mut ix0, mut ix1, mut iy0, mut iy1) = (f64::MIN, f64::MAX, f64::MIN, f64::MAX);
    let (mut ox0, mut ox1, mut oy0, mut oy1) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for (i, &(px, py)) in pts.iter().enumerate() {
        let (x, y) = (i % GRID, i / GRID);
        ox0 = ox0.min(px);
        ox1 = ox1.max(px);
        oy0 = oy0.min(py);
        oy1 = oy1.max(py);
        if x == 0 {
            ix0 = ix0.max(px);
        }
        if x == GRID - 1 {
            ix1 = ix1.min(px);
        }
        if y == 0 {
            iy0 = iy0.max(py);
        }
        if y == GRID - 1 {
            iy1 = iy1.min(py);
        }
    }

    let inner = Rect { x: ix0, y: iy0, width: ix1 - ix0, height: iy1 - iy0 };
    let outer = Rect { x: ox0, y: oy0, width: ox1 - ox0, height: oy1 - oy0 };
    (inner, outer)
}

/// Smallest scale that keeps only valid pixels (`max`) or the largest that
/// keeps every source pixel (`min`), for one view.
fn fit_scale(rect: &Rect, cx: f64, cy: f64, width: f64, height: f64, pick: fn(f64, f64) -> f64) -> f64 {
    let candidates = [
        cx / (cx - rect.x),
        cy / (cy - rect.y),
        (width - 1.0 - cx) / (rect.x + rect.width - cx),
        (height - 1.0 - cy) / (rect.y + rect.height - cy),
    ];
    candidates.into_iter().reduce(pick).unwrap_or(1.0)
}

fn scaled_roi(inner: &Rect, cx: f64, cy: f64, s: f64, width: u32, height: u32) -> ValidRoi {
    let x0 = ((inner.x - cx) * s + cx).ceil();
    let y0 = ((inner.y - cy) * s + cy).ceil();
    let x1 = x0 + (inner.width * s).floor();
    let y1 = y0 + (inner.height * s).floor();

    let cx0 = x0.clamp(0.0, width as f64);
    let cy0 = y0.clamp(0.0, height as f64);
    let cx1 = x1.clamp(cx0, width as f64);
    let cy1 = y1.clamp(cy0, height as f64);
    ValidRoi {
        x: cx0 as u32,
        y: cy0 as u32,
        width: (cx1 - cx0) as u32,
        height: (cy1 - cy0) as u32,
    }
}

/// Compute rectification rotations and projections for a calibrated rig.
///
/// `alpha` of `None` (or negative) keeps the natural scale. Values in `0..=1`
/// zoom between showing only valid pixels (0) and keeping all source pixels (1).
pub fn stereo_rectify(calib: &StereoCalibration, alpha: Option<f64>) -> Result<StereoRectification> {
    let baseline = calib.baseline();
    if baseline <= 1e-12 {
        return Err(StereoError::InvalidCalibration(
            "T describes a zero baseline".to_string(),
        ));
    }
    let (nx, ny) = (calib.width as f64, calib.height as f64);

    // Half rotation for each camera.
    let om = rodrigues_vector(&calib.r);
    let r_r = rodrigues_matrix(&(-0.5 * om));
    let t = r_r * calib.t;

    let idx = if t.x.abs() > t.y.abs() { 0 } else { 1 };
    let c = t[idx];
    let mut uu = Vector3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };

    // Global rotation bringing the baseline onto the chosen axis.
    let mut ww = t.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / t.norm()).acos() / nw;
    }
    let w_r = rodrigues_matrix(&ww);

    let r1 = w_r * r_r.transpose();
    let r2 = w_r * r_r;
    let t_new = r2 * calib.t;

    let mut fc_new = f64::MAX;
    for (k, dist) in [(&calib.k1, &calib.dist1), (&calib.k2, &calib.dist2)] {
        let mut fc = k[(idx ^ 1, idx ^ 1)];
        if dist.k1 < 0.0 {
            fc *= 1.0 + dist.k1 * (nx * nx + ny * ny) / (4.0 * fc * fc);
        }
        fc_new = fc_new.min(fc);
    }

    let zero_center = Matrix3::new(fc_new, 0.0, 0.0, 0.0, fc_new, 0.0, 0.0, 0.0, 1.0);
    let corners = [(0.0, 0.0), (nx - 1.0, 0.0), (0.0, ny - 1.0), (nx - 1.0, ny - 1.0)];
    let mut cc = [(0.0, 0.0); 2];
    for (i, (k, dist, r)) in [(&calib.k1, &calib.dist1, &r1), (&calib.k2, &calib.dist2, &r2)]
        .into_iter()
        .enumerate()
    {
        let projected = undistort_points(&corners, k, dist, Some(r), Some(&zero_center));
        let n = projected.len() as f64;
        let (sx, sy) = projected.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        cc[i] = ((nx - 1.0) / 2.0 - sx / n, (ny - 1.0) / 2.0 - sy / n);
    }

    // Zero disparity: both views share the principal point.
    let shared = ((cc[0].0 + cc[1].0) * 0.5, (cc[0].1 + cc[1].1) * 0.5);
    let (cx, cy) = shared;

    let projection = |fc: f64| {
        Matrix3x4::new(
            fc, 0.0, cx, 0.0,
            0.0, fc, cy, 0.0,
            0.0, 0.0, 1.0, 0.0,
        )
    };
    let p_natural = projection(fc_new).fixed_view::<3, 3>(0, 0).into_owned();

    let (inner1, outer1) = rectangles(&calib.k1, &calib.dist1, &r1, &p_natural, calib.width, calib.height);
    let (inner2, outer2) = rectangles(&calib.k2, &calib.dist2, &r2, &p_natural, calib.width, calib.height);

    let s = match alpha {
        Some(alpha) if alpha >= 0.0 => {
            let alpha = alpha.min(1.0);
            let s0 = fit_scale(&inner1, cx, cy, nx, ny, f64::max)
                .max(fit_scale(&inner2, cx, cy, nx, ny, f64::max));
            let s1 = fit_scale(&outer1, cx, cy, nx, ny, f64::min)
                .min(fit_scale(&outer2, cx, cy, nx, ny, f64::min));
            s0 * (1.0 - alpha) + s1 * alpha
        }
        _ => 1.0,
    };

    let fc = fc_new * s;
    let p1 = projection(fc);
    let mut p2 = projection(fc);
    p2[(idx, 3)] = t_new[idx] * fc;

    let q = Matrix4::new(
        1.0, 0.0, 0.0, -cx,
        0.0, 1.0, 0.0, -cy,
        0.0, 0.0, 0.0, fc,
        0.0, 0.0, -1.0 / t_new[idx], 0.0,
    );

    let roi1 = scaled_roi(&inner1, cx, cy, s, calib.width, calib.height);
    let roi2 = scaled_roi(&inner2, cx, cy, s, calib.width, calib.height);

    debug!(
        axis = if idx == 0 { "horizontal" } else { "vertical" },
        focal = fc,
        cx,
        cy,
        scale = s,
        "Rectification computed"
    );

    Ok(StereoRectification { r1, r2, p1, p2, q, roi1, roi2 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rig(r: Matrix3<f64>, t: Vector3<f64>, dist: Distortion) -> StereoCalibration {
        let k = Matrix3::new(600.0, 0.0, 318.0, 0.0, 600.0, 242.0, 0.0, 0.0, 1.0);
        StereoCalibration {
            k1: k,
            k2: k,
            dist1: dist,
            dist2: dist,
            r,
            t,
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn ideal_rig_is_left_untouched() {
        let calib = rig(Matrix3::identity(), Vector3::new(-0.1, 0.0, 0.0), Distortion::default());
        let rect = stereo_rectify(&calib, None).unwrap();

        assert_relative_eq!(rect.r1, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(rect.r2, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(rect.focal_length(), 600.0, epsilon = 1e-9);
        assert_relative_eq!(rect.p1[(0, 2)], 318.0, epsilon = 1e-6);
        assert_relative_eq!(rect.p1[(1, 2)], 242.0, epsilon = 1e-6);
        assert_relative_eq!(rect.p2[(0, 3)], -0.1 * 600.0, epsilon = 1e-9);
        assert!(rect.is_horizontal());
        assert_relative_eq!(rect.q[(3, 2)], 10.0, epsilon = 1e-9);
        assert!(rect.roi1.x <= 1 && rect.roi1.y <= 1, "{:?}", rect.roi1);
        assert!(rect.roi1.width >= 639 && rect.roi1.height >= 479, "{:?}", rect.roi1);
    }

    #[test]
    fn rotated_rig_gets_rows_aligned() {
        let r = Rotation3::from_euler_angles(0.01, -0.03, 0.02).into_inner();
        let t = Vector3::new(-0.12, 0.004, 0.002);
        let calib = rig(r, t, Distortion::default());
        let rect = stereo_rectify(&calib, None).unwrap();

        // Both rotations stay proper rotations.
        assert_relative_eq!(rect.r1.determinant(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(rect.r2.determinant(), 1.0, epsilon = 1e-9);

        // The baseline seen from the rectified right camera lies on x only.
        let t_new = rect.r2 * calib.t;
        assert_relative_eq!(t_new.y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(t_new.z, 0.0, epsilon = 1e-10);

        // A point in front of the rig lands on the same row in both views.
        let point = Vector3::new(0.3, -0.2, 4.0);
        let left = rect.p1.fixed_view::<3, 3>(0, 0) * (rect.r1 * point);
        let right_cam = r * point + t;
        let right = rect.p2.fixed_view::<3, 3>(0, 0) * (rect.r2 * right_cam);
        assert_relative_eq!(left.y / left.z, right.y / right.z, epsilon = 1e-6);
    }

    #[test]
    fn principal_points_are_shared() {
        let r = Rotation3::from_euler_angles(0.0, 0.05, 0.0).into_inner();
        let calib = rig(r, Vector3::new(-0.2, 0.0, 0.01), Distortion::default());
        let rect = stereo_rectify(&calib, None).unwrap();
        assert_eq!(rect.p1[(0, 2)], rect.p2[(0, 2)]);
        assert_eq!(rect.p1[(1, 2)], rect.p2[(1, 2)]);
        assert_relative_eq!(rect.q[(3, 3)], 0.0);
    }

    #[test]
    fn vertical_rig_uses_y_axis() {
        let calib = rig(Matrix3::identity(), Vector3::new(0.0, -0.1, 0.0), Distortion::default());
        let rect = stereo_rectify(&calib, None).unwrap();
        assert!(!rect.is_horizontal());
        assert_relative_eq!(rect.p2[(1, 3)], -60.0, epsilon = 1e-9);
    }

    #[test]
    fn alpha_zero_crops_and_alpha_one_shrinks() {
        let dist = Distortion::from_coefficients(&[-0.3, 0.1, 0.0, 0.0, 0.0]).unwrap();
        let calib = rig(Matrix3::identity(), Vector3::new(-0.1, 0.0, 0.0), dist);

        let natural = stereo_rectify(&calib, None).unwrap();
        let cropped = stereo_rectify(&calib, Some(0.0)).unwrap();
        let full = stereo_rectify(&calib, Some(1.0)).unwrap();

        assert!(cropped.focal_length() > full.focal_length());
        assert!(natural.focal_length() > 0.0);
        // With alpha = 0 every pixel of the output is valid.
        assert!(cropped.roi1.width >= 638 && cropped.roi1.height >= 478, "{:?}", cropped.roi1);
        assert!(full.roi1.width < 640);
    }

    #[test]
    fn alpha_scale_measures_extent_from_the_principal_point() {
        let calib = rig(Matrix3::identity(), Vector3::new(-0.1, 0.0, 0.0), Distortion::default());

        // The sampled grid spans 0..=640 x 0..=480 around (318, 242).
        let cropped = stereo_rectify(&calib, Some(0.0)).unwrap();
        assert_relative_eq!(cropped.focal_length(), 600.0, epsilon = 1e-6);

        let full = stereo_rectify(&calib, Some(1.0)).unwrap();
        assert_relative_eq!(full.focal_length(), 600.0 * 237.0 / 238.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_baseline_is_rejected() {
        let calib = rig(Matrix3::identity(), Vector3::zeros(), Distortion::default());
        assert!(matches!(
            stereo_rectify(&calib, None),
            Err(StereoError::InvalidCalibration(_))
        ));
    }
}

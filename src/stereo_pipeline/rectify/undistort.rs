use nalgebra::{Matrix3, Matrix3x4, Vector3};
use rayon::prelude::*;

use crate::stereo_pipeline::calibration::Distortion;
use crate::stereo_pipeline::common::error::{Result, StereoError};
use crate::stereo_pipeline::rectify::types::RectifyMap;

/// Fixed-point iterations used to invert the distortion model.
pub const UNDISTORT_ITERATIONS: usize = 5;

/// Remove lens distortion from pixel coordinates.
///
/// Points are normalized with `k`, undistorted, optionally rotated by `r` and
/// projected with `p`. Without `p` the result stays in normalized coordinates.
pub fn undistort_points(
    points: &[(f64, f64)],
    k: &Matrix3<f64>,
    dist: &Distortion,
    r: Option<&Matrix3<f64>>,
    p: Option<&Matrix3<f64>>,
) -> Vec<(f64, f64)> {
    let (fx, fy) = (k[(0, 0)], k[(1, 1)]);
    let (cx, cy) = (k[(0, 2)], k[(1, 2)]);
    let rotation = r.copied().unwrap_or_else(Matrix3::identity);
    let rr = match p {
        Some(p) => p * rotation,
        None => rotation,
    };

    points
        .iter()
        .map(|&(u, v)| {
            let xd = (u - cx) / fx;
            let yd = (v - cy) / fy;
            let (x, y) = dist.undistort(xd, yd, UNDISTORT_ITERATIONS);
            let h = rr * Vector3::new(x, y, 1.0);
            (h.x / h.z, h.y / h.z)
        })
        .collect()
}

/// Build the remap tables taking rectified pixel `(u, v)` back to the distorted
/// source image.
pub fn init_undistort_rectify_map(
    k: &Matrix3<f64>,
    dist: &Distortion,
    r: &Matrix3<f64>,
    p: &Matrix3x4<f64>,
    width: u32,
    height: u32,
) -> Result<RectifyMap> {
    if width == 0 || height == 0 {
        return Err(StereoError::InvalidDimensions(width as usize, height as usize));
    }
    let new_k: Matrix3<f64> = p.fixed_view::<3, 3>(0, 0).into_owned();
    let ir = (new_k * r).try_inverse().ok_or_else(|| {
        StereoError::InvalidCalibration("rectified projection is singular".to_string())
    })?;

    let (fx, fy) = (k[(0, 0)], k[(1, 1)]);
    let (u0, v0) = (k[(0, 2)], k[(1, 2)]);
    let w = width as usize;
    let len = w * height as usize;
    let mut map_x = vec![0f32; len];
    let mut map_y = vec![0f32; len];

    map_x
        .par_chunks_mut(w)
        .zip(map_y.par_chunks_mut(w))
        .enumerate()
        .for_each(|(v, (row_x, row_y))| {
            for u in 0..w {
                let h = ir * Vector3::new(u as f64, v as f64, 1.0);
                let (xd, yd) = dist.distort(h.x / h.z, h.y / h.z);
                row_x[u] = (fx * xd + u0) as f32;
                row_y[u] = (fy * yd + v0) as f32;
            }
        });

    Ok(RectifyMap {
        width,
        height,
        map_x,
        map_y,
    })
}

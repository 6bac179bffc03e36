//! Stereo calibration types

use nalgebra::{Matrix3, Vector3};

use crate::stereo_pipeline::common::error::{Result, StereoError};

/// Lens distortion in OpenCV coefficient order.
///
/// Radial `k1..k6` (rational model when `k4..k6` are non-zero), tangential
/// `p1, p2` and thin prism `s1..s4`. Unused coefficients are zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
    pub s4: f64,
}

impl Distortion {
    /// Accepted coefficient counts, matching what OpenCV calibration writes.
    pub const SUPPORTED_LENGTHS: [usize; 5] = [0, 4, 5, 8, 12];

    /// Build from a coefficient vector `k1 k2 p1 p2 [k3 [k4 k5 k6 [s1 s2 s3 s4]]]`.
    pub fn from_coefficients(coeffs: &[f64]) -> Result<Self> {
        if !Self::SUPPORTED_LENGTHS.contains(&coeffs.len()) {
            return Err(StereoError::InvalidCalibration(format!(
                "unsupported number of distortion coefficients: {} (expected one of {:?})",
                coeffs.len(),
                Self::SUPPORTED_LENGTHS
            )));
        }
        let mut padded = [0.0; 12];
        padded[..coeffs.len()].copy_from_slice(coeffs);
        Ok(Self {
            k1: padded[0],
            k2: padded[1],
            p1: padded[2],
            p2: padded[3],
            k3: padded[4],
            k4: padded[5],
            k5: padded[6],
            k6: padded[7],
            s1: padded[8],
            s2: padded[9],
            s3: padded[10],
            s4: padded[11],
        })
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Map an undistorted normalized point to its distorted position.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let x2 = x * x;
        let y2 = y * y;
        let r2 = x2 + y2;
        let xy2 = 2.0 * x * y;
        let kr = (1.0 + ((self.k3 * r2 + self.k2) * r2 + self.k1) * r2)
            / (1.0 + ((self.k6 * r2 + self.k5) * r2 + self.k4) * r2);
        let xd = x * kr + self.p1 * xy2 + self.p2 * (r2 + 2.0 * x2) + self.s1 * r2 + self.s2 * r2 * r2;
        let yd = y * kr + self.p1 * (r2 + 2.0 * y2) + self.p2 * xy2 + self.s3 * r2 + self.s4 * r2 * r2;
        (xd, yd)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, xd: f64, yd: f64, iterations: usize) -> (f64, f64) {
        let (mut x, mut y) = (xd, yd);
        for _ in 0..iterations {
            let r2 = x * x + y * y;
            let icdist = (1.0 + ((self.k6 * r2 + self.k5) * r2 + self.k4) * r2)
                / (1.0 + ((self.k3 * r2 + self.k2) * r2 + self.k1) * r2);
            if icdist < 0.0 {
                return (xd, yd);
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x) + self.s1 * r2 + self.s2 * r2 * r2;
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y + self.s3 * r2 + self.s4 * r2 * r2;
            x = (xd - dx) * icdist;
            y = (yd - dy) * icdist;
        }
        (x, y)
    }
}

/// Intrinsics, distortion and relative pose of a calibrated stereo rig.
///
/// `r` and `t` map points from the left camera frame into the right camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoCalibration {
    pub k1: Matrix3<f64>,
    pub k2: Matrix3<f64>,
    pub dist1: Distortion,
    pub dist2: Distortion,
    pub r: Matrix3<f64>,
    pub t: Vector3<f64>,
    pub width: u32,
    pub height: u32,
}

impl StereoCalibration {
    pub fn image_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn baseline(&self) -> f64 {
        self.t.norm()
    }

    /// Reject records that cannot drive rectification.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(StereoError::InvalidDimensions(
                self.width as usize,
                self.height as usize,
            ));
        }
        for (name, k) in [("K1", &self.k1), ("K2", &self.k2)] {
            if k[(0, 0)] <= 0.0 || k[(1, 1)] <= 0.0 || k[(2, 2)] != 1.0 {
                return Err(StereoError::InvalidCalibration(format!(
                    "{} is not a camera matrix (fx={}, fy={}, k22={})",
                    name,
                    k[(0, 0)],
                    k[(1, 1)],
                    k[(2, 2)]
                )));
            }
        }
        if (self.r.determinant() - 1.0).abs() > 1e-3 {
            return Err(StereoError::InvalidCalibration(format!(
                "R is not a rotation matrix (det={:.6})",
                self.r.determinant()
            )));
        }
        if self.baseline() <= 1e-12 {
            return Err(StereoError::InvalidCalibration(
                "T describes a zero baseline".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_distortion() -> Distortion {
        Distortion::from_coefficients(&[-0.28, 0.07, 0.0012, -0.0008, 0.01]).unwrap()
    }

    #[test]
    fn coefficient_order_follows_opencv() {
        let d = Distortion::from_coefficients(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
        assert_eq!((d.k1, d.k2, d.p1, d.p2, d.k3), (1.0, 2.0, 3.0, 4.0, 5.0));
        assert_eq!((d.k4, d.k5, d.k6, d.s1), (6.0, 7.0, 8.0, 0.0));
    }

    #[test]
    fn rejects_unsupported_lengths() {
        assert!(matches!(
            Distortion::from_coefficients(&[0.1, 0.2, 0.3]),
            Err(StereoError::InvalidCalibration(_))
        ));
        assert!(Distortion::from_coefficients(&[0.0; 14]).is_err());
        assert!(Distortion::from_coefficients(&[]).unwrap().is_zero());
    }

    #[test]
    fn undistort_inverts_distort() {
        let d = sample_distortion();
        for &(x, y) in &[(0.0, 0.0), (0.1, -0.05), (-0.3, 0.2), (0.25, 0.25)] {
            let (xd, yd) = d.distort(x, y);
            let (xu, yu) = d.undistort(xd, yd, 50);
            assert_relative_eq!(xu, x, epsilon = 1e-6);
            assert_relative_eq!(yu, y, epsilon = 1e-6);
        }
    }

    #[test]
    fn zero_distortion_is_identity() {
        let d = Distortion::default();
        assert_eq!(d.distort(0.4, -0.2), (0.4, -0.2));
        assert_eq!(d.undistort(0.4, -0.2, 5), (0.4, -0.2));
    }

    #[test]
    fn validate_catches_degenerate_records() {
        let good = StereoCalibration {
            k1: Matrix3::new(700.0, 0.0, 320.0, 0.0, 700.0, 240.0, 0.0, 0.0, 1.0),
            k2: Matrix3::new(700.0, 0.0, 320.0, 0.0, 700.0, 240.0, 0.0, 0.0, 1.0),
            dist1: Distortion::default(),
            dist2: Distortion::default(),
            r: Matrix3::identity(),
            t: Vector3::new(-0.12, 0.0, 0.0),
            width: 640,
            height: 480,
        };
        assert!(good.validate().is_ok());

        let no_baseline = StereoCalibration { t: Vector3::zeros(), ..good.clone() };
        assert!(matches!(no_baseline.validate(), Err(StereoError::InvalidCalibration(_))));

        let no_size = StereoCalibration { width: 0, ..good.clone() };
        assert!(matches!(no_size.validate(), Err(StereoError::InvalidDimensions(0, 480))));

        let bad_rotation = StereoCalibration { r: Matrix3::identity() * 2.0, ..good };
        assert!(bad_rotation.validate().is_err());
    }
}

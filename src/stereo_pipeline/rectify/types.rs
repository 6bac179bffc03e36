//! Rectification data types

use image::{GrayImage, RgbImage};
use nalgebra::{Matrix3, Matrix3x4, Matrix4};

use crate::stereo_pipeline::common::error::{Result, StereoError};

/// Rectangle of a rectified view in which every pixel has a source pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidRoi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ValidRoi {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Output of Bouguet stereo rectification.
///
/// `r1`/`r2` rotate each camera into the common rectified frame, `p1`/`p2`
/// project into the rectified images and `q` reprojects `(x, y, disparity, 1)`
/// to 3D.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoRectification {
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    pub p1: Matrix3x4<f64>,
    pub p2: Matrix3x4<f64>,
    pub q: Matrix4<f64>,
    pub roi1: ValidRoi,
    pub roi2: ValidRoi,
}

impl StereoRectification {
    /// Focal length shared by both rectified views.
    pub fn focal_length(&self) -> f64 {
        self.p1[(0, 0)]
    }

    pub fn is_horizontal(&self) -> bool {
        self.p2[(0, 3)] != 0.0
    }
}

/// Per-pixel source coordinates for a remap (OpenCV `CV_32FC1` map pair).
#[derive(Debug, Clone, PartialEq)]
pub struct RectifyMap {
    pub width: u32,
    pub height: u32,
    pub map_x: Vec<f32>,
    pub map_y: Vec<f32>,
}

impl RectifyMap {
    pub fn validate(&self) -> Result<()> {
        let expected = self.width as usize * self.height as usize;
        if self.width == 0 || self.height == 0 || self.map_x.len() != expected || self.map_y.len() != expected {
            return Err(StereoError::InvalidDimensions(
                self.width as usize,
                self.height as usize,
            ));
        }
        Ok(())
    }

    pub fn get(&self, x: u32, y: u32) -> (f32, f32) {
        let idx = y as usize * self.width as usize + x as usize;
        (self.map_x[idx], self.map_y[idx])
    }
}

/// Rectified views in color and in the grayscale form fed to block matching.
#[derive(Debug, Clone)]
pub struct RectifiedPair {
    pub left: RgbImage,
    pub right: RgbImage,
    pub left_gray: GrayImage,
    pub right_gray: GrayImage,
}

//! Stereo rectification: rotations, remap tables and resampling
//!
//! A [`Rectifier`] is built once per calibration and then applied to any
//! number of image pairs taken by the same rig.

mod bouguet;
mod remap;
pub mod types;
mod undistort;

pub use bouguet::stereo_rectify;
pub use remap::{remap_bilinear, rgb_to_gray};
pub use types::{RectifiedPair, RectifyMap, StereoRectification, ValidRoi};
pub use undistort::{UNDISTORT_ITERATIONS, init_undistort_rectify_map, undistort_points};

use tracing::{debug, instrument, warn};

use crate::stereo_pipeline::calibration::StereoCalibration;
use crate::stereo_pipeline::common::error::Result;
use crate::stereo_pipeline::input::StereoPair;

pub struct Rectifier {
    rectification: StereoRectification,
    left_map: RectifyMap,
    right_map: RectifyMap,
}

impl Rectifier {
    #[instrument(skip_all, fields(width = calib.width, height = calib.height))]
    pub fn new(calib: &StereoCalibration, alpha: Option<f64>) -> Result<Self> {
        calib.validate()?;
        let rectification = stereo_rectify(calib, alpha)?;
        if rectification.roi1.is_empty() || rectification.roi2.is_empty() {
            warn!(roi1 = ?rectification.roi1, roi2 = ?rectification.roi2, "Rectified views have no fully valid region");
        }

        let (left_map, right_map) = rayon::join(
            || {
                init_undistort_rectify_map(
                    &calib.k1,
                    &calib.dist1,
                    &rectification.r1,
                    &rectification.p1,
                    calib.width,
                    calib.height,
                )
            },
            || {
                init_undistort_rectify_map(
                    &calib.k2,
                    &calib.dist2,
                    &rectification.r2,
                    &rectification.p2,
                    calib.width,
                    calib.height,
                )
            },
        );

        debug!("Remap tables built");
        Ok(Self {
            rectification,
            left_map: left_map?,
            right_map: right_map?,
        })
    }

    pub fn rectification(&self) -> &StereoRectification {
        &self.rectification
    }

    pub fn maps(&self) -> (&RectifyMap, &RectifyMap) {
        (&self.left_map, &self.right_map)
    }

    /// Remap both views and derive their grayscale versions.
    pub fn rectify_pair(&self, pair: &StereoPair) -> Result<RectifiedPair> {
        let (left, right) = rayon::join(
            || remap_bilinear(&pair.left, &self.left_map),
            || remap_bilinear(&pair.right, &self.right_map),
        );
        let (left, right) = (left?, right?);
        let left_gray = rgb_to_gray(&left);
        let right_gray = rgb_to_gray(&right);

        Ok(RectifiedPair {
            left,
            right,
            left_gray,
            right_gray,
        })
    }
}

use std::path::Path;

use crate::stereo_pipeline::calibration::types::StereoCalibration;
use crate::stereo_pipeline::common::error::{Result, StereoError};

pub trait CalibrationReader {
    fn read_calibration(&self, text: &str) -> Result<StereoCalibration>;

    fn read_calibration_file(&self, path: &Path) -> Result<StereoCalibration> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StereoError::InputReadError(format!("{}: {}", path.display(), e))
        })?;
        self.read_calibration(&text)
    }
}

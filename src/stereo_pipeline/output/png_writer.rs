use std::io::Write;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tracing::debug;

use crate::stereo_pipeline::common::error::{Result, StereoError};
use crate::stereo_pipeline::disparity::DisparityMap;
use crate::stereo_pipeline::output::writer::DisparityWriter;

/// Writes whole-pixel disparities as an 8-bit grayscale PNG; invalid pixels are 0.
pub struct PngDisparityWriter;

impl DisparityWriter for PngDisparityWriter {
    fn write_disparity(&self, map: &DisparityMap, output: &mut dyn Write) -> Result<()> {
        debug!("Encoding PNG disparity: {}x{}", map.width, map.height);

        let luma = map.to_luma8();
        PngEncoder::new(output)
            .write_image(luma.as_raw(), luma.width(), luma.height(), ExtendedColorType::L8)
            .map_err(|e| StereoError::EncodeError(e.to_string()))?;

        debug!("PNG encoding complete");
        Ok(())
    }
}

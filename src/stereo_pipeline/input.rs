//! Image loading for the stereo pair

use std::path::Path;

use image::RgbImage;
use tracing::debug;

use crate::stereo_pipeline::common::error::{Result, StereoError};

/// Left and right views as loaded from disk.
#[derive(Debug, Clone)]
pub struct StereoPair {
    pub left: RgbImage,
    pub right: RgbImage,
}

impl StereoPair {
    pub fn dimensions(&self) -> (u32, u32) {
        self.left.dimensions()
    }
}

/// Decode a color image, converting whatever the file holds to 8-bit RGB.
pub fn load_color_image<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let path = path.as_ref();
    let reader = image::ImageReader::open(path)
        .map_err(|e| StereoError::InputReadError(format!("{}: {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| StereoError::InputReadError(format!("{}: {}", path.display(), e)))?;
    let decoded = reader
        .decode()
        .map_err(|e| StereoError::DecodeError(format!("{}: {}", path.display(), e)))?;

    debug!(
        path = %path.display(),
        width = decoded.width(),
        height = decoded.height(),
        color = ?decoded.color(),
        "Image decoded"
    );
    Ok(decoded.into_rgb8())
}

pub fn load_stereo_pair<P: AsRef<Path>, Q: AsRef<Path>>(left: P, right: Q) -> Result<StereoPair> {
    Ok(StereoPair {
        left: load_color_image(left)?,
        right: load_color_image(right)?,
    })
}

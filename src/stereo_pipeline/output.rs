//! Disparity and rectification output

mod png_writer;
mod report;
mod tiff_writer;
pub mod types;
mod writer;

pub use png_writer::PngDisparityWriter;
pub use report::{rectification_report, write_rectification_report};
pub use tiff_writer::TiffDisparityWriter;
pub use types::{OutputFormat, TiffCompression};
pub use writer::DisparityWriter;

use std::path::Path;

use tracing::info;

use crate::stereo_pipeline::common::error::{Result, StereoError};
use crate::stereo_pipeline::common::types::StereoConfig;
use crate::stereo_pipeline::rectify::RectifiedPair;

/// The writer matching the configured output format.
pub fn writer_for(config: &StereoConfig) -> Box<dyn DisparityWriter> {
    match config.output_format {
        OutputFormat::Png => Box::new(PngDisparityWriter),
        OutputFormat::Tiff => Box::new(TiffDisparityWriter::new(config.compression, config.predictor)),
    }
}

/// Save the rectified color views as `left_rectified.png` and `right_rectified.png`.
pub fn save_rectified_pair<P: AsRef<Path>>(dir: P, pair: &RectifiedPair) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .map_err(|e| StereoError::OutputWriteError(format!("{}: {}", dir.display(), e)))?;

    for (name, image) in [("left_rectified.png", &pair.left), ("right_rectified.png", &pair.right)] {
        let path = dir.join(name);
        image
            .save(&path)
            .map_err(|e| StereoError::OutputWriteError(format!("{}: {}", path.display(), e)))?;
    }
    info!(dir = %dir.display(), "Rectified images saved");
    Ok(())
}

//! Stereo rig calibration: data model and readers

mod opencv_yaml_reader;
mod reader;
pub mod types;

pub use opencv_yaml_reader::OpenCvYamlReader;
pub use reader::CalibrationReader;
pub use types::{Distortion, StereoCalibration};

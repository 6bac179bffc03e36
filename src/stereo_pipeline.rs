//! Stereo disparity pipeline module
//!
//! Loads a calibrated stereo pair, rectifies both views and estimates the
//! disparity of the left view by block matching, on a CUDA device when one is
//! available.

pub mod calibration;
pub mod common;
pub mod disparity;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod rectify;

pub use common::{PipelineTimings, Result, Stage, StereoConfig, StereoConfigBuilder, StereoError};

pub use calibration::{CalibrationReader, OpenCvYamlReader, StereoCalibration};

pub use disparity::{Backend, BlockMatchParams, BlockMatcher, DisparityMap, PreFilter};

pub use input::{StereoPair, load_stereo_pair};

pub use output::{DisparityWriter, OutputFormat, PngDisparityWriter, TiffCompression, TiffDisparityWriter};

pub use pipeline::{RunSummary, StereoPipeline};

pub use rectify::{Rectifier, StereoRectification};

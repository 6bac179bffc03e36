//! Shared error, configuration and timing types

pub mod error;
pub mod timing;
pub mod types;

pub use error::{Result, StereoError};
pub use timing::{PipelineTimings, Stage, StageTiming};
pub use types::{StereoConfig, StereoConfigBuilder};

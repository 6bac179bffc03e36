//! Run configuration

use crate::stereo_pipeline::disparity::{Backend, BlockMatchParams};
use crate::stereo_pipeline::output::{OutputFormat, TiffCompression};

/// Configuration for one rectification and disparity run
#[derive(Debug, Clone)]
pub struct StereoConfig {
    pub block_match: BlockMatchParams,
    pub backend: Backend,
    /// Rectification zoom, `None` keeps the natural scale
    pub alpha: Option<f64>,
    /// Whether to check image sizes against the calibration before rectifying
    pub validate_dimensions: bool,
    pub output_format: OutputFormat,
    /// Compression method for TIFF output
    pub compression: TiffCompression,
    /// Predictor value for TIFF compression (2 for horizontal differencing)
    pub predictor: Option<u16>,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            block_match: BlockMatchParams::default(),
            backend: Backend::Auto,
            alpha: None,
            validate_dimensions: true,
            output_format: OutputFormat::Png,
            compression: TiffCompression::None,
            predictor: None,
        }
    }
}

impl StereoConfig {
    pub fn builder() -> StereoConfigBuilder {
        StereoConfigBuilder::default()
    }
}

/// Builder for StereoConfig
#[derive(Default)]
pub struct StereoConfigBuilder {
    block_match: Option<BlockMatchParams>,
    backend: Option<Backend>,
    alpha: Option<Option<f64>>,
    validate_dimensions: Option<bool>,
    output_format: Option<OutputFormat>,
    compression: Option<TiffCompression>,
    predictor: Option<Option<u16>>,
}

impl StereoConfigBuilder {
    pub fn block_match(mut self, params: BlockMatchParams) -> Self {
        self.block_match = Some(params);
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn alpha(mut self, alpha: Option<f64>) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn validate_dimensions(mut self, validate: bool) -> Self {
        self.validate_dimensions = Some(validate);
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn compression(mut self, compression: TiffCompression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn predictor(mut self, predictor: Option<u16>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn build(self) -> StereoConfig {
        let default = StereoConfig::default();
        StereoConfig {
            block_match: self.block_match.unwrap_or(default.block_match),
            backend: self.backend.unwrap_or(default.backend),
            alpha: self.alpha.unwrap_or(default.alpha),
            validate_dimensions: self.validate_dimensions.unwrap_or(default.validate_dimensions),
            output_format: self.output_format.unwrap_or(default.output_format),
            compression: self.compression.unwrap_or(default.compression),
            predictor: self.predictor.unwrap_or(default.predictor),
        }
    }
}

//! Disparity estimation by SAD block matching
//!
//! The correlation search runs on a CUDA device when one is available and on a
//! rayon-parallel CPU matcher otherwise. Pre-filtering and the texture check run on
//! the host so that both devices see identical input.

mod cpu_block_matcher;
mod cuda_block_matcher;
mod matcher;
pub mod prefilter;
pub mod types;

pub use cpu_block_matcher::CpuBlockMatcher;
pub use cuda_block_matcher::CudaBlockMatcher;
pub use matcher::BlockMatcher;
pub use types::{
    Backend, BlockMatchParams, DISP_SCALE, DisparityMap, INVALID_DISPARITY, PreFilter, best_match_offset,
};

use image::GrayImage;
use tracing::{info, instrument, warn};

use crate::stereo_pipeline::common::error::{Result, StereoError};

/// Build the matcher for the requested backend.
///
/// `Auto` falls back to the CPU when no CUDA device can be initialized; `Cuda`
/// reports the missing device instead.
pub fn select_matcher(backend: Backend) -> Result<Box<dyn BlockMatcher>> {
    match backend {
        Backend::Cpu => Ok(Box::new(CpuBlockMatcher::new()?)),
        Backend::Cuda => Ok(Box::new(CudaBlockMatcher::probe()?)),
        Backend::Auto => match CudaBlockMatcher::probe() {
            Ok(matcher) => {
                info!("CUDA device 0 initialized for block matching");
                Ok(Box::new(matcher))
            }
            Err(e) => {
                warn!("{}; falling back to CPU block matching", e);
                Ok(Box::new(CpuBlockMatcher::new()?))
            }
        },
    }
}

/// Compute the disparity map of a rectified grayscale pair.
#[instrument(skip_all, fields(matcher = matcher.name()))]
pub fn compute_disparity<M: BlockMatcher + ?Sized>(
    left: &GrayImage,
    right: &GrayImage,
    params: &BlockMatchParams,
    matcher: &M,
) -> Result<DisparityMap> {
    params.validate()?;

    let (width, height) = (left.width() as usize, left.height() as usize);
    if width == 0 || height == 0 {
        return Err(StereoError::InvalidDimensions(width, height));
    }
    if right.dimensions() != left.dimensions() {
        return Err(StereoError::SizeMismatch {
            what: "right rectified image".to_string(),
            expected_width: width,
            expected_height: height,
            width: right.width() as usize,
            height: right.height() as usize,
        });
    }

    let filtered_left = prefilter::prefilter(left, params);
    let filtered_right = prefilter::prefilter(right, params);

    let raw = matcher.compute(&filtered_left, &filtered_right, params)?;
    let mut disparity = DisparityMap::from_fixed_point(width, height, params.num_disparities, raw)?;

    prefilter::discard_textureless(&mut disparity, left, &filtered_left, params);

    info!(
        valid = disparity.valid_count(),
        total = width * height,
        "Disparity computed"
    );
    Ok(disparity)
}

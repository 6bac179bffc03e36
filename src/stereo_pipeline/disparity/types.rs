//! Types for block matching disparity estimation

use image::{GrayImage, ImageBuffer, Luma};

use crate::stereo_pipeline::common::error::{Result, StereoError};

/// Number of fractional steps per pixel in fixed-point disparities.
pub const DISP_SCALE: i16 = 16;
/// Bits of fractional precision in fixed-point disparities.
pub const DISP_SHIFT: u32 = 4;
/// Fixed-point value marking a pixel without a reliable match.
pub const INVALID_DISPARITY: i16 = -DISP_SCALE;

/// Pre-filter applied to both rectified images before matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PreFilter {
    /// Match raw intensities
    None,
    /// Match the clamped horizontal Sobel response
    XSobel,
}

/// Device used to run the correlation search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// CUDA when a device is present, CPU otherwise
    Auto,
    /// CUDA only; fails when no device is present
    Cuda,
    /// Multi-threaded CPU matcher
    Cpu,
}

/// Block matching parameters
#[derive(Debug, Clone)]
pub struct BlockMatchParams {
    /// Number of candidate disparities searched, `0..num_disparities`
    pub num_disparities: usize,
    /// Side of the square correlation window (odd)
    pub block_size: usize,
    pub pre_filter: PreFilter,
    /// Clamp applied to the x-Sobel response
    pub pre_filter_cap: u8,
    /// Minimum average texture per window pixel, below which a match is discarded
    pub texture_threshold: f32,
    /// Margin in percent by which the best cost must beat every non-adjacent candidate.
    /// Zero disables the check.
    pub uniqueness_ratio: u32,
}

impl Default for BlockMatchParams {
    fn default() -> Self {
        Self {
            num_disparities: 256,
            block_size: 9,
            pre_filter: PreFilter::XSobel,
            pre_filter_cap: 31,
            texture_threshold: 3.0,
            uniqueness_ratio: 0,
        }
    }
}

impl BlockMatchParams {
    pub fn radius(&self) -> usize {
        self.block_size / 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_disparities == 0 || self.num_disparities % 8 != 0 {
            return Err(StereoError::InvalidParameters(format!(
                "num_disparities must be a positive multiple of 8, got {}",
                self.num_disparities
            )));
        }
        // Disparities are stored as i16 in 1/16 pixel.
        if self.num_disparities > 2048 {
            return Err(StereoError::InvalidParameters(format!(
                "num_disparities must not exceed 2048, got {}",
                self.num_disparities
            )));
        }
        if self.block_size % 2 == 0 || !(5..=255).contains(&self.block_size) {
            return Err(StereoError::InvalidParameters(format!(
                "block_size must be odd and within 5..=255, got {}",
                self.block_size
            )));
        }
        if !(1..=63).contains(&self.pre_filter_cap) {
            return Err(StereoError::InvalidParameters(format!(
                "pre_filter_cap must be within 1..=63, got {}",
                self.pre_filter_cap
            )));
        }
        if !self.texture_threshold.is_finite() || self.texture_threshold < 0.0 {
            return Err(StereoError::InvalidParameters(format!(
                "texture_threshold must be a non-negative number, got {}",
                self.texture_threshold
            )));
        }
        if self.uniqueness_ratio >= 100 {
            return Err(StereoError::InvalidParameters(format!(
                "uniqueness_ratio must be below 100, got {}",
                self.uniqueness_ratio
            )));
        }
        Ok(())
    }
}

/// Integer best-match offset behind a refined fixed-point disparity.
///
/// Sub-pixel refinement moves a match by more than -1/2 and at most +1/2 pixel,
/// so the winning offset `d` always lies in `16 * d - 7 ..= 16 * d + 8`.
pub fn best_match_offset(fixed: i16) -> i16 {
    (fixed + DISP_SCALE / 2 - 1) >> DISP_SHIFT
}

/// Per-pixel disparity of the left view, in 1/16 pixel fixed point.
#[derive(Debug, Clone)]
pub struct DisparityMap {
    pub width: usize,
    pub height: usize,
    pub num_disparities: usize,
    data: Vec<i16>,
}

impl DisparityMap {
    pub fn from_fixed_point(
        width: usize,
        height: usize,
        num_disparities: usize,
        data: Vec<i16>,
    ) -> Result<Self> {
        if data.len() != width * height {
            return Err(StereoError::InvalidDimensions(width, height));
        }
        Ok(Self {
            width,
            height,
            num_disparities,
            data,
        })
    }

    pub fn fixed_point(&self) -> &[i16] {
        &self.data
    }

    pub(crate) fn fixed_point_mut(&mut self) -> &mut [i16] {
        &mut self.data
    }

    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] >= 0
    }

    /// Disparity in pixels, `None` for unmatched pixels.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        let raw = self.data[y * self.width + x];
        (raw >= 0).then(|| raw as f32 / DISP_SCALE as f32)
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&d| d >= 0).count()
    }

    /// Most frequent integer disparity among matched pixels.
    pub fn modal_disparity(&self) -> Option<usize> {
        let mut histogram = vec![0usize; self.num_disparities.max(1)];
        for &d in self.data.iter().filter(|&&d| d >= 0) {
            let bin = (best_match_offset(d) as usize).min(histogram.len() - 1);
            histogram[bin] += 1;
        }
        histogram
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(bin, _)| bin)
    }

    /// Best-match offsets as an 8-bit image; unmatched pixels are 0.
    pub fn to_luma8(&self) -> GrayImage {
        let pixels: Vec<u8> = self
            .data
            .iter()
            .map(|&d| if d < 0 { 0 } else { best_match_offset(d).min(255) as u8 })
            .collect();
        // Buffer length equals width * height by construction.
        GrayImage::from_raw(self.width as u32, self.height as u32, pixels)
            .unwrap_or_else(|| GrayImage::new(self.width as u32, self.height as u32))
    }

    /// Raw fixed-point disparities as a 16-bit image; unmatched pixels are 0.
    pub fn to_luma16(&self) -> ImageBuffer<Luma<u16>, Vec<u16>> {
        let pixels: Vec<u16> = self.data.iter().map(|&d| d.max(0) as u16).collect();
        ImageBuffer::from_raw(self.width as u32, self.height as u32, pixels)
            .unwrap_or_else(|| ImageBuffer::new(self.width as u32, self.height as u32))
    }
}

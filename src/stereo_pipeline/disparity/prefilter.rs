//! Host-side filters shared by every block matching backend.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::gradients::horizontal_sobel;
use imageproc::integral_image::integral_image;
use tracing::debug;

use super::types::{BlockMatchParams, DisparityMap, INVALID_DISPARITY, PreFilter};

/// Prepare an intensity image for SAD matching.
///
/// `XSobel` maps the horizontal gradient into `0..=2 * cap`, which removes
/// brightness offsets between the two cameras.
pub fn prefilter(image: &GrayImage, params: &BlockMatchParams) -> GrayImage {
    match params.pre_filter {
        PreFilter::None => image.clone(),
        PreFilter::XSobel => {
            let cap = params.pre_filter_cap as i16;
            let sobel = horizontal_sobel(image);
            GrayImage::from_fn(image.width(), image.height(), |x, y| {
                let g = sobel.get_pixel(x, y)[0].clamp(-cap, cap);
                Luma([(g + cap) as u8])
            })
        }
    }
}

/// Per-pixel texture magnitude used by [`discard_textureless`].
fn texture_image(left: &GrayImage, filtered_left: &GrayImage, params: &BlockMatchParams) -> GrayImage {
    match params.pre_filter {
        PreFilter::XSobel => {
            let cap = params.pre_filter_cap as i16;
            GrayImage::from_fn(filtered_left.width(), filtered_left.height(), |x, y| {
                Luma([(filtered_left.get_pixel(x, y)[0] as i16 - cap).unsigned_abs() as u8])
            })
        }
        PreFilter::None => {
            let last = left.width().saturating_sub(1);
            GrayImage::from_fn(left.width(), left.height(), |x, y| {
                let here = left.get_pixel(x, y)[0];
                let next = left.get_pixel((x + 1).min(last), y)[0];
                Luma([here.abs_diff(next)])
            })
        }
    }
}

/// Invalidate matches whose left window carries too little texture to be trusted.
pub fn discard_textureless(
    disparity: &mut DisparityMap,
    left: &GrayImage,
    filtered_left: &GrayImage,
    params: &BlockMatchParams,
) {
    if params.texture_threshold <= 0.0 {
        return;
    }

    let texture = texture_image(left, filtered_left, params);
    let integral: Image<Luma<u32>> = integral_image(&texture);
    let r = params.radius();
    let min_sum = params.texture_threshold * (params.block_size * params.block_size) as f32;
    let (width, height) = (disparity.width, disparity.height);

    let mut discarded = 0usize;
    let data = disparity.fixed_point_mut();
    for y in r..height.saturating_sub(r) {
        for x in r..width.saturating_sub(r) {
            let idx = y * width + x;
            if data[idx] < 0 {
                continue;
            }
            let (x0, y0) = ((x - r) as u32, (y - r) as u32);
            let (x1, y1) = ((x + r + 1) as u32, (y + r + 1) as u32);
            let sum = integral.get_pixel(x1, y1)[0] as i64 - integral.get_pixel(x0, y1)[0] as i64
                - integral.get_pixel(x1, y0)[0] as i64
                + integral.get_pixel(x0, y0)[0] as i64;
            if (sum as f32) < min_sum {
                data[idx] = INVALID_DISPARITY;
                discarded += 1;
            }
        }
    }
    debug!("Texture filter discarded {} matches", discarded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stereo_pipeline::disparity::types::DISP_SCALE;

    #[test]
    fn xsobel_is_centered_on_cap() {
        let flat = GrayImage::from_pixel(16, 8, Luma([90]));
        let params = BlockMatchParams::default();
        let filtered = prefilter(&flat, &params);
        assert!(filtered.pixels().all(|p| p[0] == params.pre_filter_cap));
    }

    #[test]
    fn xsobel_saturates_on_strong_edges() {
        let step = GrayImage::from_fn(16, 8, |x, _| Luma([if x < 8 { 0 } else { 255 }]));
        let params = BlockMatchParams::default();
        let filtered = prefilter(&step, &params);
        assert_eq!(filtered.get_pixel(7, 4)[0].abs_diff(params.pre_filter_cap), params.pre_filter_cap);
        assert_eq!(filtered.get_pixel(2, 4)[0], params.pre_filter_cap);
    }

    #[test]
    fn flat_regions_are_discarded() {
        let params = BlockMatchParams { num_disparities: 16, block_size: 5, ..Default::default() };
        let flat = GrayImage::from_pixel(12, 12, Luma([120]));
        let filtered = prefilter(&flat, &params);
        let mut map =
            DisparityMap::from_fixed_point(12, 12, 16, vec![3 * DISP_SCALE; 144]).unwrap();

        discard_textureless(&mut map, &flat, &filtered, &params);

        assert!(!map.is_valid(6, 6));
        // Border pixels are outside the window domain and left untouched.
        assert!(map.is_valid(0, 0));
    }

    #[test]
    fn zero_threshold_keeps_everything() {
        let params = BlockMatchParams {
            num_disparities: 16,
            block_size: 5,
            texture_threshold: 0.0,
            ..Default::default()
        };
        let flat = GrayImage::from_pixel(12, 12, Luma([120]));
        let filtered = prefilter(&flat, &params);
        let mut map = DisparityMap::from_fixed_point(12, 12, 16, vec![0; 144]).unwrap();

        discard_textureless(&mut map, &flat, &filtered, &params);

        assert_eq!(map.valid_count(), 144);
    }
}

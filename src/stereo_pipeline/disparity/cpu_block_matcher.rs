use image::GrayImage;
use rayon::prelude::*;
use tracing::info;

use crate::stereo_pipeline::common::error::Result;
use crate::stereo_pipeline::disparity::matcher::{BlockMatcher, select_disparity};
use crate::stereo_pipeline::disparity::types::{BlockMatchParams, INVALID_DISPARITY};

/// Multi-threaded SAD block matcher, one rayon task per image row.
pub struct CpuBlockMatcher;

impl CpuBlockMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }

    fn match_row(
        left: &[u8],
        right: &[u8],
        width: usize,
        y: usize,
        params: &BlockMatchParams,
        out_row: &mut [i16],
    ) {
        let ndisp = params.num_disparities;
        let r = params.radius();
        let x_begin = r + ndisp - 1;
        let Some(x_end) = width.checked_sub(r) else {
            return;
        };
        if x_begin >= x_end {
            return;
        }
        let span = x_end - x_begin;

        // costs[(x - x_begin) * ndisp + d]
        let mut costs = vec![0u32; span * ndisp];
        let mut column = vec![0u32; width];

        for d in 0..ndisp {
            // Column sums of absolute differences over the window rows.
            for x in (x_begin - r)..(x_end + r) {
                let mut acc = 0u32;
                for yy in (y - r)..=(y + r) {
                    let row = yy * width;
                    acc += left[row + x].abs_diff(right[row + x - d]) as u32;
                }
                column[x] = acc;
            }

            let mut window: u32 = column[(x_begin - r)..=(x_begin + r)].iter().sum();
            costs[d] = window;
            for x in (x_begin + 1)..x_end {
                window = window + column[x + r] - column[x - r - 1];
                costs[(x - x_begin) * ndisp + d] = window;
            }
        }

        for (i, curve) in costs.chunks_exact(ndisp).enumerate() {
            if let Some(disp) = select_disparity(curve, params.uniqueness_ratio) {
                out_row[x_begin + i] = disp;
            }
        }
    }
}

impl BlockMatcher for CpuBlockMatcher {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn compute(&self, left: &GrayImage, right: &GrayImage, params: &BlockMatchParams) -> Result<Vec<i16>> {
        let width = left.width() as usize;
        let height = left.height() as usize;
        let r = params.radius();
        info!(
            "Starting CPU block matching for image {}x{} ({} disparities, {}x{} window)",
            width, height, params.num_disparities, params.block_size, params.block_size
        );

        let left_px = left.as_raw();
        let right_px = right.as_raw();
        let mut disparity = vec![INVALID_DISPARITY; width * height];
        // No column can hold a window and the full search range.
        if width < 2 * r + params.num_disparities || height <= 2 * r {
            return Ok(disparity);
        }

        disparity
            .par_chunks_mut(width)
            .enumerate()
            .filter(|(y, _)| *y >= r && *y + r < height)
            .for_each(|(y, out_row)| Self::match_row(left_px, right_px, width, y, params, out_row));

        Ok(disparity)
    }
}

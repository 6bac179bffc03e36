use cudarc::driver::safe::*;
use cudarc::nvrtc::Ptx;
use image::GrayImage;
use std::sync::Arc;
use tracing::info;

use crate::stereo_pipeline::common::error::{Result, StereoError};
use crate::stereo_pipeline::disparity::matcher::BlockMatcher;
use crate::stereo_pipeline::disparity::types::BlockMatchParams;

const KERNEL_NAME: &str = "stereo_bm_sad";
const BLOCK_DIM: u32 = 16;

#[cfg(stereo_ptx)]
fn kernel_ptx() -> anyhow::Result<Ptx> {
    // Compiled by build.rs with nvcc
    Ok(Ptx::from_src(include_str!(concat!(env!("OUT_DIR"), "/stereo_bm.ptx"))))
}

#[cfg(not(stereo_ptx))]
fn kernel_ptx() -> anyhow::Result<Ptx> {
    tracing::debug!("No prebuilt PTX, compiling {} with NVRTC", KERNEL_NAME);
    Ok(cudarc::nvrtc::compile_ptx(include_str!("../../cuda/kernels/stereo_bm.cu"))?)
}

/// SAD block matcher running on CUDA device 0
pub struct CudaBlockMatcher {
    stream: Arc<CudaStream>,
    kernel: CudaFunction,
}

impl CudaBlockMatcher {
    /// Initialize CUDA context and load kernel
    pub fn new() -> anyhow::Result<Self> {
        let ptx = kernel_ptx()?;

        let ctx = CudaContext::new(0)?;
        let stream = ctx.default_stream();
        let module = ctx.load_module(ptx)?;
        let kernel = module.load_function(KERNEL_NAME)?;

        Ok(Self { stream, kernel })
    }

    /// Check for a usable device before committing to the GPU path.
    ///
    /// cudarc loads the driver and NVRTC libraries lazily and panics when they
    /// are missing, so the probe also catches unwinding.
    pub fn probe() -> Result<Self> {
        match std::panic::catch_unwind(Self::new) {
            Ok(Ok(matcher)) => Ok(matcher),
            Ok(Err(e)) => Err(StereoError::DeviceUnavailable(e.to_string())),
            Err(_) => Err(StereoError::DeviceUnavailable(
                "CUDA driver or NVRTC library could not be loaded".to_string(),
            )),
        }
    }

    /// Upload both images, run the correlation search, download the disparities.
    pub fn process(
        &self,
        left: &GrayImage,
        right: &GrayImage,
        params: &BlockMatchParams,
    ) -> anyhow::Result<Vec<i16>> {
        let width = left.width() as usize;
        let height = left.height() as usize;

        // Copy rectified pair to GPU
        let d_left = self.stream.clone_htod(left.as_raw())?;
        let d_right = self.stream.clone_htod(right.as_raw())?;

        // Output: one fixed-point disparity per pixel
        let mut d_disparity = self.stream.alloc_zeros::<i16>(width * height)?;

        let width_i32 = width as i32;
        let height_i32 = height as i32;
        let num_disparities = params.num_disparities as i32;
        let radius = params.radius() as i32;
        let uniqueness_ratio = params.uniqueness_ratio;

        let mut launch_args = self.stream.launch_builder(&self.kernel);
        launch_args.arg(&d_left);
        launch_args.arg(&d_right);
        launch_args.arg(&mut d_disparity);
        launch_args.arg(&width_i32);
        launch_args.arg(&height_i32);
        launch_args.arg(&num_disparities);
        launch_args.arg(&radius);
        launch_args.arg(&uniqueness_ratio);

        let threads = (BLOCK_DIM, BLOCK_DIM, 1);
        let blocks = (
            (width as u32).div_ceil(BLOCK_DIM),
            (height as u32).div_ceil(BLOCK_DIM),
            1,
        );
        let cfg = LaunchConfig {
            grid_dim: blocks,
            block_dim: threads,
            shared_mem_bytes: 0,
        };

        // Launch kernel
        unsafe { launch_args.launch(cfg)? };

        // Copy back from GPU; blocks until the kernel has finished
        let disparity = self.stream.clone_dtoh(&d_disparity)?;
        Ok(disparity)
    }
}

impl BlockMatcher for CudaBlockMatcher {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn compute(&self, left: &GrayImage, right: &GrayImage, params: &BlockMatchParams) -> Result<Vec<i16>> {
        info!(
            "Starting CUDA block matching for image {}x{} ({} disparities, {}x{} window)",
            left.width(),
            left.height(),
            params.num_disparities,
            params.block_size,
            params.block_size
        );
        self.process(left, right, params)
            .map_err(|e| StereoError::CudaError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stereo_pipeline::disparity::CpuBlockMatcher;
    use crate::stereo_pipeline::disparity::prefilter::prefilter;
    use image::Luma;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn textured_pair(width: u32, height: u32, shift: u32) -> (GrayImage, GrayImage) {
        let mut rng = StdRng::seed_from_u64(23);
        let texture = GrayImage::from_fn(width + shift, height, |_, _| Luma([rng.r#gen::<u8>()]));
        let left = GrayImage::from_fn(width, height, |x, y| *texture.get_pixel(x, y));
        let right = GrayImage::from_fn(width, height, |x, y| *texture.get_pixel(x + shift, y));
        (left, right)
    }

    #[test]
    #[ignore = "requires a CUDA device"]
    fn matches_cpu_backend_exactly() {
        let matcher = match CudaBlockMatcher::probe() {
            Ok(matcher) => matcher,
            Err(StereoError::DeviceUnavailable(reason)) => {
                eprintln!("skipping, no CUDA device: {}", reason);
                return;
            }
            Err(e) => panic!("unexpected probe error: {}", e),
        };

        let (left, right) = textured_pair(160, 72, 13);
        for uniqueness_ratio in [0, 15] {
            let params = BlockMatchParams {
                num_disparities: 32,
                block_size: 9,
                uniqueness_ratio,
                ..Default::default()
            };
            let left = prefilter(&left, &params);
            let right = prefilter(&right, &params);

            let gpu = matcher.process(&left, &right, &params).unwrap();
            let cpu = CpuBlockMatcher.compute(&left, &right, &params).unwrap();
            assert_eq!(gpu, cpu, "backends differ with uniqueness ratio {}", uniqueness_ratio);
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use stereo_disparity_rs::logger;
use stereo_disparity_rs::stereo_pipeline::{
    Backend, BlockMatchParams, OutputFormat, PreFilter, StereoConfig, StereoPipeline, TiffCompression,
};

use tracing::{error, info};

/// Rectify a calibrated stereo pair and compute the disparity map of the left view.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Left image
    left: PathBuf,

    /// Right image
    right: PathBuf,

    /// Stereo calibration (OpenCV FileStorage YAML)
    calibration: PathBuf,

    /// Output disparity map [default: disparity.png, or disparity.tiff with --format tiff]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Device running the block matcher
    #[arg(long, value_enum, default_value_t = Backend::Auto)]
    backend: Backend,

    /// Number of disparities searched (multiple of 8)
    #[arg(long, default_value_t = 256)]
    num_disparities: usize,

    /// Side of the correlation window (odd)
    #[arg(long, default_value_t = 9)]
    block_size: usize,

    #[arg(long, value_enum, default_value_t = PreFilter::XSobel)]
    pre_filter: PreFilter,

    /// Minimum average texture per window pixel
    #[arg(long, default_value_t = 3.0)]
    texture_threshold: f32,

    /// Uniqueness margin in percent (0 disables)
    #[arg(long, default_value_t = 0)]
    uniqueness_ratio: u32,

    /// Rectification zoom between 0 (valid pixels only) and 1 (all source pixels)
    #[arg(long)]
    alpha: Option<f64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Png)]
    format: OutputFormat,

    /// TIFF compression
    #[arg(long, value_enum, default_value_t = TiffCompression::None)]
    compression: TiffCompression,

    /// Skip the image size check against the calibration
    #[arg(long)]
    no_validate: bool,

    /// Write the rectification transforms to this YAML file
    #[arg(long)]
    rectification_report: Option<PathBuf>,

    /// Save the rectified color images into this directory
    #[arg(long)]
    save_rectified: Option<PathBuf>,

    /// Print per-stage timings
    #[arg(long)]
    timings: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = logger::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!("Starting stereo_disparity {}...", env!("CARGO_PKG_VERSION"));

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Disparity computation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let params = BlockMatchParams {
        num_disparities: args.num_disparities,
        block_size: args.block_size,
        pre_filter: args.pre_filter,
        texture_threshold: args.texture_threshold,
        uniqueness_ratio: args.uniqueness_ratio,
        ..Default::default()
    };
    let config = StereoConfig::builder()
        .block_match(params)
        .backend(args.backend)
        .alpha(args.alpha)
        .validate_dimensions(!args.no_validate)
        .output_format(args.format)
        .compression(args.compression)
        .predictor(match args.compression {
            TiffCompression::None => None,
            _ => Some(2),
        })
        .build();

    let mut pipeline = StereoPipeline::new(config)?;
    if let Some(path) = args.rectification_report {
        pipeline = pipeline.with_rectification_report(path);
    }
    if let Some(dir) = args.save_rectified {
        pipeline = pipeline.with_rectified_dir(dir);
    }

    info!("Stereo pipeline initialized");
    info!("Backend: {}", pipeline.backend_name());
    info!(
        "Block matching: {} disparities, {}x{} window",
        pipeline.config().block_match.num_disparities,
        pipeline.config().block_match.block_size,
        pipeline.config().block_match.block_size
    );

    let output = args.output.unwrap_or_else(|| args.format.default_output());
    let (summary, timings) =
        pipeline.run_with_timings(&args.left, &args.right, &args.calibration, &output)?;

    info!(
        "Disparity map written to {} ({}x{}, {} valid pixels)",
        output.display(),
        summary.width,
        summary.height,
        summary.valid_pixels
    );
    if args.timings {
        timings.print_summary();
    }
    Ok(())
}

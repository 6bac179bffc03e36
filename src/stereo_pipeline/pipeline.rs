use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{Span, info, info_span, instrument};

use crate::stereo_pipeline::{
    calibration::{CalibrationReader, OpenCvYamlReader, StereoCalibration},
    common::{PipelineTimings, Result, Stage, StereoConfig, StereoError},
    disparity::{BlockMatcher, compute_disparity, select_matcher},
    input::{StereoPair, load_stereo_pair},
    output::{DisparityWriter, save_rectified_pair, write_rectification_report, writer_for},
    rectify::Rectifier,
};


/// What a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub width: usize,
    pub height: usize,
    pub valid_pixels: usize,
    pub modal_disparity: Option<usize>,
    pub backend: &'static str,
}

/// Loads a stereo pair, rectifies it with the rig calibration and writes the
/// disparity map of the left view.
pub struct StereoPipeline<C: CalibrationReader, W: DisparityWriter> {
    reader: C,
    writer: W,
    matcher: Box<dyn BlockMatcher>,
    config: StereoConfig,
    report_path: Option<PathBuf>,
    rectified_dir: Option<PathBuf>,
}

impl StereoPipeline<OpenCvYamlReader, Box<dyn DisparityWriter>> {
    pub fn new(config: StereoConfig) -> Result<Self> {
        config.block_match.validate()?;
        let matcher = select_matcher(config.backend)?;
        let writer = writer_for(&config);
        Ok(Self::with_custom(OpenCvYamlReader, writer, matcher, config))
    }
}

/// Run `f` inside `span`, recording its duration under `stage`.
fn timed<T>(
    timings: &mut PipelineTimings,
    stage: Stage,
    span: Span,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let _guard = span.entered();
    timings.time(stage, f)
}

impl<C: CalibrationReader, W: DisparityWriter> StereoPipeline<C, W> {
    pub fn with_custom(reader: C, writer: W, matcher: Box<dyn BlockMatcher>, config: StereoConfig) -> Self {
        Self {
            reader,
            writer,
            matcher,
            config,
            report_path: None,
            rectified_dir: None,
        }
    }

    /// Also write the rectification transforms as YAML to `path`.
    pub fn with_rectification_report<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Also save the rectified color views into `dir`.
    pub fn with_rectified_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.rectified_dir = Some(dir.into());
        self
    }

    fn validate_dimensions(&self, pair: &StereoPair, calib: &StereoCalibration) -> Result<()> {
        if !self.config.validate_dimensions {
            return Ok(());
        }

        let (width, height) = (calib.width as usize, calib.height as usize);
        if width == 0 || height == 0 {
            return Err(StereoError::InvalidDimensions(width, height));
        }

        for (what, image) in [("left image", &pair.left), ("right image", &pair.right)] {
            if image.width() == 0 || image.height() == 0 {
                return Err(StereoError::InvalidDimensions(
                    image.width() as usize,
                    image.height() as usize,
                ));
            }
            if image.dimensions() != calib.image_size() {
                return Err(StereoError::SizeMismatch {
                    what: what.to_string(),
                    expected_width: width,
                    expected_height: height,
                    width: image.width() as usize,
                    height: image.height() as usize,
                });
            }
        }

        Ok(())
    }

    fn process_timed(
        &self,
        pair: &StereoPair,
        calibration_text: &str,
        output: &mut dyn Write,
        timings: &mut PipelineTimings,
    ) -> Result<RunSummary> {
        let calib = timed(timings, Stage::ReadCalibration, info_span!("read_calibration"), || {
            self.reader.read_calibration(calibration_text)
        })?;

        let (width, height) = pair.dimensions();
        timings.set_pixels(calib.width as usize, calib.height as usize);
        timed(
            timings,
            Stage::ValidateDimensions,
            info_span!("validate_dimensions", width, height),
            || self.validate_dimensions(pair, &calib),
        )?;

        let rectified = timed(timings, Stage::Rectify, info_span!("rectify"), || {
            let rectifier = Rectifier::new(&calib, self.config.alpha)?;
            if let Some(path) = &self.report_path {
                write_rectification_report(path, rectifier.rectification())?;
            }
            let rectified = rectifier.rectify_pair(pair)?;
            if let Some(dir) = &self.rectified_dir {
                save_rectified_pair(dir, &rectified)?;
            }
            Ok(rectified)
        })?;

        let disparity = timed(timings, Stage::Disparity, info_span!("disparity"), || {
            compute_disparity(
                &rectified.left_gray,
                &rectified.right_gray,
                &self.config.block_match,
                &self.matcher,
            )
        })?;

        timed(timings, Stage::WriteOutput, info_span!("write_output"), || {
            self.writer.write_disparity(&disparity, output)
        })?;

        let summary = RunSummary {
            width: disparity.width,
            height: disparity.height,
            valid_pixels: disparity.valid_count(),
            modal_disparity: disparity.modal_disparity(),
            backend: self.matcher.name(),
        };
        info!(
            width = summary.width,
            height = summary.height,
            valid = summary.valid_pixels,
            modal = ?summary.modal_disparity,
            backend = summary.backend,
            "Disparity map complete in {:.3}ms",
            timings.total_duration().as_secs_f64() * 1000.0
        );
        Ok(summary)
    }

    /// Process an already decoded pair with calibration text, writing the map to `output`.
    #[instrument(skip_all, fields(calibration_size = calibration_text.len()))]
    pub fn process(&self, pair: &StereoPair, calibration_text: &str, output: &mut dyn Write) -> Result<RunSummary> {
        self.process_timed(pair, calibration_text, output, &mut PipelineTimings::new())
    }

    pub fn process_with_timings(
        &self,
        pair: &StereoPair,
        calibration_text: &str,
        output: &mut dyn Write,
    ) -> Result<(RunSummary, PipelineTimings)> {
        let mut timings = PipelineTimings::new();
        let summary = self.process_timed(pair, calibration_text, output, &mut timings)?;
        Ok((summary, timings))
    }

    fn run_timed(
        &self,
        left: &Path,
        right: &Path,
        calibration: &Path,
        output: &Path,
        timings: &mut PipelineTimings,
    ) -> Result<RunSummary> {
        info!(
            left = %left.display(),
            right = %right.display(),
            calibration = %calibration.display(),
            output = %output.display(),
            "Processing stereo pair"
        );

        let (pair, calibration_text) = timed(timings, Stage::LoadInputs, info_span!("load_inputs"), || {
            let pair = load_stereo_pair(left, right)?;
            let text = std::fs::read_to_string(calibration).map_err(|e| {
                StereoError::InputReadError(format!("{}: {}", calibration.display(), e))
            })?;
            Ok((pair, text))
        })?;

        // Buffered so that a failed run leaves no partial output file.
        let mut encoded = Vec::new();
        let summary = self.process_timed(&pair, &calibration_text, &mut encoded, timings)?;

        std::fs::write(output, &encoded)
            .map_err(|e| StereoError::OutputWriteError(format!("{}: {}", output.display(), e)))?;
        Ok(summary)
    }

    /// Run on files: left image, right image, calibration YAML, output path.
    #[instrument(skip_all)]
    pub fn run<P, Q, R, S>(&self, left: P, right: Q, calibration: R, output: S) -> Result<RunSummary>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        R: AsRef<Path>,
        S: AsRef<Path>,
    {
        self.run_timed(
            left.as_ref(),
            right.as_ref(),
            calibration.as_ref(),
            output.as_ref(),
            &mut PipelineTimings::new(),
        )
    }

    pub fn run_with_timings<P, Q, R, S>(
        &self,
        left: P,
        right: Q,
        calibration: R,
        output: S,
    ) -> Result<(RunSummary, PipelineTimings)>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        R: AsRef<Path>,
        S: AsRef<Path>,
    {
        let mut timings = PipelineTimings::new();
        let summary = self.run_timed(
            left.as_ref(),
            right.as_ref(),
            calibration.as_ref(),
            output.as_ref(),
            &mut timings,
        )?;
        Ok((summary, timings))
    }

    pub fn config(&self) -> &StereoConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: StereoConfig) {
        self.config = config;
    }

    pub fn backend_name(&self) -> &'static str {
        self.matcher.name()
    }
}

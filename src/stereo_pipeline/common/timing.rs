use std::fmt::{self, Write as _};
use std::time::{Duration, Instant};

use crate::stereo_pipeline::common::error::Result;

/// Stages of a stereo run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    LoadInputs,
    ReadCalibration,
    ValidateDimensions,
    Rectify,
    Disparity,
    WriteOutput,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::LoadInputs,
        Stage::ReadCalibration,
        Stage::ValidateDimensions,
        Stage::Rectify,
        Stage::Disparity,
        Stage::WriteOutput,
    ];

    /// Name used for the stage's tracing span.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::LoadInputs => "load_inputs",
            Stage::ReadCalibration => "read_calibration",
            Stage::ValidateDimensions => "validate_dimensions",
            Stage::Rectify => "rectify",
            Stage::Disparity => "disparity",
            Stage::WriteOutput => "write_output",
        }
    }

    /// Stages whose cost grows with the image area.
    fn is_per_pixel(&self) -> bool {
        matches!(self, Stage::Rectify | Stage::Disparity | Stage::WriteOutput)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StageTiming {
    pub stage: Stage,
    pub duration: Duration,
}

/// Wall-clock durations of one stereo run.
#[derive(Debug, Default)]
pub struct PipelineTimings {
    stages: Vec<StageTiming>,
    pixels: Option<u64>,
}

impl PipelineTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` and record how long it took, also when it fails.
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let value = f();
        self.stages.push(StageTiming {
            stage,
            duration: start.elapsed(),
        });
        value
    }

    /// Image area of the run, for throughput figures.
    pub fn set_pixels(&mut self, width: usize, height: usize) {
        self.pixels = Some((width * height) as u64);
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn get_stage(&self, stage: Stage) -> Option<Duration> {
        self.stages
            .iter()
            .filter(|s| s.stage == stage)
            .map(|s| s.duration)
            .reduce(|a, b| a + b)
    }

    pub fn stages(&self) -> &[StageTiming] {
        &self.stages
    }

    /// Megapixels per second of a per-pixel stage.
    pub fn throughput(&self, stage: Stage) -> Option<f64> {
        let pixels = self.pixels?;
        let secs = self.get_stage(stage)?.as_secs_f64();
        (stage.is_per_pixel() && secs > 0.0).then(|| pixels as f64 / secs / 1e6)
    }

    /// One row per stage that ran, in `Stage::ALL` order.
    pub fn summary(&self) -> String {
        let total_ms = self.total_duration().as_secs_f64() * 1000.0;
        let mut out = String::new();
        let _ = writeln!(out, "{:<22} {:>12} {:>7} {:>10}", "stage", "ms", "share", "Mpx/s");
        for stage in Stage::ALL {
            let Some(duration) = self.get_stage(stage) else {
                continue;
            };
            let ms = duration.as_secs_f64() * 1000.0;
            let share = if total_ms > 0.0 { ms / total_ms * 100.0 } else { 0.0 };
            let rate = self
                .throughput(stage)
                .map_or_else(|| "-".to_string(), |r| format!("{:.1}", r));
            let _ = writeln!(out, "{:<22} {:>12.3} {:>6.1}% {:>10}", stage, ms, share, rate);
        }
        let _ = write!(out, "{:<22} {:>12.3}", "total", total_ms);
        out
    }

    pub fn print_summary(&self) {
        println!("\n{}", self.summary());
    }
}

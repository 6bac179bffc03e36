use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::stereo_pipeline::common::error::{Result, StereoError};
use crate::stereo_pipeline::rectify::{StereoRectification, ValidRoi};

/// Matrix laid out like an OpenCV `FileStorage` matrix node.
#[derive(Debug, Serialize)]
struct MatrixRecord {
    rows: usize,
    cols: usize,
    dt: &'static str,
    data: Vec<f64>,
}

impl MatrixRecord {
    fn from_fn(rows: usize, cols: usize, at: impl Fn(usize, usize) -> f64) -> Self {
        let data = (0..rows)
            .flat_map(|i| (0..cols).map(move |j| (i, j)))
            .map(|(i, j)| at(i, j))
            .collect();
        Self {
            rows,
            cols,
            dt: "d",
            data,
        }
    }
}

#[derive(Debug, Serialize)]
struct RectificationReport {
    #[serde(rename = "R1")]
    r1: MatrixRecord,
    #[serde(rename = "R2")]
    r2: MatrixRecord,
    #[serde(rename = "P1")]
    p1: MatrixRecord,
    #[serde(rename = "P2")]
    p2: MatrixRecord,
    #[serde(rename = "Q")]
    q: MatrixRecord,
    /// `[x, y, width, height]`
    roi1: [u32; 4],
    roi2: [u32; 4],
}

fn roi(r: &ValidRoi) -> [u32; 4] {
    [r.x, r.y, r.width, r.height]
}

/// Render the rectification as YAML.
pub fn rectification_report(rect: &StereoRectification) -> Result<String> {
    let report = RectificationReport {
        r1: MatrixRecord::from_fn(3, 3, |i, j| rect.r1[(i, j)]),
        r2: MatrixRecord::from_fn(3, 3, |i, j| rect.r2[(i, j)]),
        p1: MatrixRecord::from_fn(3, 4, |i, j| rect.p1[(i, j)]),
        p2: MatrixRecord::from_fn(3, 4, |i, j| rect.p2[(i, j)]),
        q: MatrixRecord::from_fn(4, 4, |i, j| rect.q[(i, j)]),
        roi1: roi(&rect.roi1),
        roi2: roi(&rect.roi2),
    };
    serde_yaml::to_string(&report).map_err(|e| StereoError::EncodeError(e.to_string()))
}

pub fn write_rectification_report<P: AsRef<Path>>(path: P, rect: &StereoRectification) -> Result<()> {
    let path = path.as_ref();
    let yaml = rectification_report(rect)?;
    std::fs::write(path, yaml)
        .map_err(|e| StereoError::OutputWriteError(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), "Rectification report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Matrix3x4, Matrix4};

    fn rectification() -> StereoRectification {
        StereoRectification {
            r1: Matrix3::identity(),
            r2: Matrix3::identity(),
            p1: Matrix3x4::new(500.0, 0.0, 320.0, 0.0, 0.0, 500.0, 240.0, 0.0, 0.0, 0.0, 1.0, 0.0),
            p2: Matrix3x4::new(500.0, 0.0, 320.0, -60.0, 0.0, 500.0, 240.0, 0.0, 0.0, 0.0, 1.0, 0.0),
            q: Matrix4::identity(),
            roi1: ValidRoi { x: 2, y: 3, width: 600, height: 400 },
            roi2: ValidRoi::default(),
        }
    }

    #[test]
    fn report_lists_matrices_row_major() {
        let yaml = rectification_report(&rectification()).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(value["P2"]["rows"].as_u64(), Some(3));
        assert_eq!(value["P2"]["cols"].as_u64(), Some(4));
        assert_eq!(value["P2"]["data"][3].as_f64(), Some(-60.0));
        assert_eq!(value["P1"]["data"][2].as_f64(), Some(320.0));
        assert_eq!(value["roi1"][1].as_u64(), Some(3));
        assert_eq!(value["Q"]["data"].as_sequence().map(Vec::len), Some(16));
    }

    #[test]
    fn report_is_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rectification.yaml");
        write_rectification_report(&path, &rectification()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("R1:"));
        assert!(text.contains("roi2:"));
    }

    #[test]
    fn unwritable_path_is_an_output_error() {
        let result = write_rectification_report("/nonexistent/dir/report.yaml", &rectification());
        assert!(matches!(result, Err(StereoError::OutputWriteError(_))));
    }
}

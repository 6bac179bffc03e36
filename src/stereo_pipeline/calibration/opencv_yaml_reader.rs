use nalgebra::{Matrix3, Vector3};
use serde::Deserialize;
use tracing::debug;

use crate::stereo_pipeline::calibration::reader::CalibrationReader;
use crate::stereo_pipeline::calibration::types::{Distortion, StereoCalibration};
use crate::stereo_pipeline::common::error::{Result, StereoError};

/// Reads stereo calibration written by OpenCV `FileStorage` in YAML mode.
pub struct OpenCvYamlReader;

/// A matrix as it may appear in the file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MatrixNode {
    OpenCv {
        rows: usize,
        cols: usize,
        #[allow(dead_code)]
        #[serde(default)]
        dt: Option<String>,
        data: Vec<f64>,
    },
    Nested(Vec<Vec<f64>>),
    Flat(Vec<f64>),
}

#[derive(Debug, Deserialize)]
struct RawCalibration {
    #[serde(rename = "K1")]
    k1: Option<MatrixNode>,
    #[serde(rename = "K2")]
    k2: Option<MatrixNode>,
    #[serde(rename = "distCoeffs1")]
    dist_coeffs1: Option<MatrixNode>,
    #[serde(rename = "distCoeffs2")]
    dist_coeffs2: Option<MatrixNode>,
    #[serde(rename = "R")]
    r: Option<MatrixNode>,
    #[serde(rename = "T")]
    t: Option<MatrixNode>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Drop the `%YAML:1.0` directive and `!!opencv-matrix` tags that plain YAML
/// parsers reject.
fn normalize(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("%YAML"))
        .map(|line| line.replace("!!opencv-matrix", ""))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_error(key: &str, reason: impl Into<String>) -> StereoError {
    StereoError::CalibrationFormat {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| StereoError::MissingCalibrationKey(key.to_string()))
}

impl MatrixNode {
    /// Flatten to `(rows, cols, row-major data)`.
    fn into_parts(self, key: &str) -> Result<(usize, usize, Vec<f64>)> {
        match self {
            MatrixNode::OpenCv { rows, cols, data, .. } => {
                if rows * cols != data.len() {
                    return Err(format_error(
                        key,
                        format!("{}x{} matrix holds {} values", rows, cols, data.len()),
                    ));
                }
                Ok((rows, cols, data))
            }
            MatrixNode::Nested(rows) => {
                let cols = rows.first().map_or(0, Vec::len);
                if rows.iter().any(|row| row.len() != cols) {
                    return Err(format_error(key, "rows have different lengths"));
                }
                let n = rows.len();
                Ok((n, cols, rows.into_iter().flatten().collect()))
            }
            MatrixNode::Flat(data) => Ok((1, data.len(), data)),
        }
    }
}

fn matrix3(node: MatrixNode, key: &str) -> Result<Matrix3<f64>> {
    let (rows, cols, data) = node.into_parts(key)?;
    // A flat list of nine values is read row by row.
    if data.len() != 9 || !((rows == 3 && cols == 3) || rows == 1 || cols == 1) {
        return Err(format_error(
            key,
            format!("expected a 3x3 matrix, got {}x{}", rows, cols),
        ));
    }
    Ok(Matrix3::from_row_slice(&data))
}

fn vector3(node: MatrixNode, key: &str) -> Result<Vector3<f64>> {
    let (rows, cols, data) = node.into_parts(key)?;
    if data.len() != 3 || (rows != 1 && cols != 1) {
        return Err(format_error(
            key,
            format!("expected a 3-vector, got {}x{}", rows, cols),
        ));
    }
    Ok(Vector3::from_column_slice(&data))
}

fn distortion(node: MatrixNode, key: &str) -> Result<Distortion> {
    let (rows, cols, data) = node.into_parts(key)?;
    if rows > 1 && cols > 1 {
        return Err(format_error(
            key,
            format!("expected a coefficient vector, got {}x{}", rows, cols),
        ));
    }
    Distortion::from_coefficients(&data).map_err(|e| format_error(key, e.to_string()))
}

impl CalibrationReader for OpenCvYamlReader {
    fn read_calibration(&self, text: &str) -> Result<StereoCalibration> {
        let raw: RawCalibration = serde_yaml::from_str(&normalize(text))
            .map_err(|e| format_error("document", e.to_string()))?;

        let calibration = StereoCalibration {
            k1: matrix3(required(raw.k1, "K1")?, "K1")?,
            k2: matrix3(required(raw.k2, "K2")?, "K2")?,
            dist1: distortion(required(raw.dist_coeffs1, "distCoeffs1")?, "distCoeffs1")?,
            dist2: distortion(required(raw.dist_coeffs2, "distCoeffs2")?, "distCoeffs2")?,
            r: matrix3(required(raw.r, "R")?, "R")?,
            t: vector3(required(raw.t, "T")?, "T")?,
            width: required(raw.width, "width")?,
            height: required(raw.height, "height")?,
        };

        debug!(
            width = calibration.width,
            height = calibration.height,
            baseline = calibration.baseline(),
            "Calibration parsed"
        );
        Ok(calibration)
    }
}

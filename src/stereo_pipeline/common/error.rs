use thiserror::Error;

#[derive(Error, Debug)]
pub enum StereoError {
    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to encode output: {0}")]
    EncodeError(String),

    #[error("Calibration is missing required key `{0}`")]
    MissingCalibrationKey(String),

    #[error("Malformed calibration value for `{key}`: {reason}")]
    CalibrationFormat { key: String, reason: String },

    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(usize, usize),

    #[error("Size mismatch: expected {expected_width}x{expected_height}, got {width}x{height} ({what})")]
    SizeMismatch {
        what: String,
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Invalid block matching parameters: {0}")]
    InvalidParameters(String),

    #[error("GPU device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("CUDA error: {0}")]
    CudaError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StereoError>;

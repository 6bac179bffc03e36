//! Output format configuration types

use std::path::PathBuf;

use clap::ValueEnum;

/// Container for the disparity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// 8-bit PNG with whole-pixel disparities
    #[default]
    Png,
    /// 16-bit TIFF holding the raw 1/16 pixel values
    Tiff,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Tiff => "tiff",
        }
    }

    /// `disparity.<ext>` in the working directory.
    pub fn default_output(&self) -> PathBuf {
        PathBuf::from(format!("disparity.{}", self.extension()))
    }
}

/// TIFF compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TiffCompression {
    /// No compression (fastest, largest file)
    #[default]
    None,
    /// LZW compression
    Lzw,
    /// Deflate compression - fast level
    DeflateFast,
    /// Deflate compression - balanced
    DeflateBalanced,
    /// Deflate compression - best compression (slower)
    DeflateBest,
}

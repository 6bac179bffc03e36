use std::io::Write;

use tiff::encoder::compression::DeflateLevel;
use tiff::encoder::{Compression, TiffEncoder, colortype::Gray16};
use tiff::tags::Predictor;
use tracing::debug;

use crate::stereo_pipeline::common::error::{Result, StereoError};
use crate::stereo_pipeline::disparity::DisparityMap;
use crate::stereo_pipeline::output::types::TiffCompression;
use crate::stereo_pipeline::output::writer::DisparityWriter;

/// Writes the 1/16 pixel disparities unchanged as a 16-bit grayscale TIFF.
///
/// Invalid pixels are stored as 0, so a reader divides by 16 to get pixels.
#[derive(Debug, Clone, Default)]
pub struct TiffDisparityWriter {
    pub compression: TiffCompression,
    /// Predictor value for compression (2 for horizontal differencing)
    pub predictor: Option<u16>,
}

impl TiffDisparityWriter {
    pub fn new(compression: TiffCompression, predictor: Option<u16>) -> Self {
        Self {
            compression,
            predictor,
        }
    }
}

impl DisparityWriter for TiffDisparityWriter {
    fn write_disparity(&self, map: &DisparityMap, output: &mut dyn Write) -> Result<()> {
        debug!("Encoding TIFF disparity: {}x{}", map.width, map.height);

        let mut buffer = Vec::new();

        let compression = match self.compression {
            TiffCompression::None => Compression::Uncompressed,
            TiffCompression::Lzw => Compression::Lzw,
            TiffCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
            TiffCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
            TiffCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
        };

        let mut encoder = TiffEncoder::new(std::io::Cursor::new(&mut buffer))
            .map_err(|e| StereoError::EncodeError(e.to_string()))?
            .with_compression(compression);

        if let Some(predictor_val) = self.predictor {
            let predictor = match predictor_val {
                2 => Predictor::Horizontal,
                _ => Predictor::None,
            };
            encoder = encoder.with_predictor(predictor);
        }

        let luma = map.to_luma16();
        encoder
            .write_image::<Gray16>(luma.width(), luma.height(), luma.as_raw())
            .map_err(|e| StereoError::EncodeError(e.to_string()))?;

        output.write_all(&buffer)?;

        debug!("TIFF encoding complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stereo_pipeline::disparity::INVALID_DISPARITY;
    use std::io::Cursor;
    use tiff::decoder::{Decoder, DecodingResult};

    fn sample_map() -> DisparityMap {
        let data: Vec<i16> = (0..64 * 8)
            .map(|i| if i % 7 == 0 { INVALID_DISPARITY } else { (i % 200) as i16 * 3 })
            .collect();
        DisparityMap::from_fixed_point(64, 8, 256, data).unwrap()
    }

    fn decode(bytes: Vec<u8>) -> ((u32, u32), Vec<u16>) {
        let mut decoder = Decoder::new(Cursor::new(bytes)).unwrap();
        let dims = decoder.dimensions().unwrap();
        match decoder.read_image().unwrap() {
            DecodingResult::U16(data) => (dims, data),
            _ => panic!("expected 16-bit samples"),
        }
    }

    #[test]
    fn stores_fixed_point_values() {
        let map = sample_map();
        let mut buffer = Vec::new();
        TiffDisparityWriter::default().write_disparity(&map, &mut buffer).unwrap();

        let (dims, data) = decode(buffer);
        assert_eq!(dims, (64, 8));
        assert_eq!(data[0], 0);
        assert_eq!(data[1], 3);
        assert_eq!(data[10], 30);
    }

    #[test]
    fn compressed_variants_decode_identically() {
        let map = sample_map();
        let expected = map.to_luma16().into_raw();

        for (compression, predictor) in [
            (TiffCompression::Lzw, None),
            (TiffCompression::DeflateFast, Some(2)),
            (TiffCompression::DeflateBest, None),
        ] {
            let mut buffer = Vec::new();
            TiffDisparityWriter::new(compression, predictor)
                .write_disparity(&map, &mut buffer)
                .unwrap();
            assert_eq!(decode(buffer).1, expected, "{:?}", compression);
        }
    }
}

use image::{GrayImage, RgbImage};
use rayon::prelude::*;

use crate::stereo_pipeline::common::error::Result;
use crate::stereo_pipeline::rectify::types::RectifyMap;

/// Resample `src` through `map` with bilinear interpolation.
///
/// Neighbours outside the source contribute black.
pub fn remap_bilinear(src: &RgbImage, map: &RectifyMap) -> Result<RgbImage> {
    map.validate()?;

    let (src_w, src_h) = (src.width() as i64, src.height() as i64);
    let src_px = src.as_raw();
    let out_w = map.width as usize;
    let mut out = vec![0u8; out_w * map.height as usize * 3];

    let sample = |x: i64, y: i64| -> [f32; 3] {
        if x < 0 || y < 0 || x >= src_w || y >= src_h {
            return [0.0; 3];
        }
        let i = ((y * src_w + x) * 3) as usize;
        [src_px[i] as f32, src_px[i + 1] as f32, src_px[i + 2] as f32]
    };

    out.par_chunks_mut(out_w * 3).enumerate().for_each(|(v, row)| {
        let offset = v * out_w;
        for u in 0..out_w {
            let mx = map.map_x[offset + u];
            let my = map.map_y[offset + u];
            if !mx.is_finite() || !my.is_finite() {
                continue;
            }
            let x0 = mx.floor();
            let y0 = my.floor();
            let (ax, ay) = (mx - x0, my - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);

            let weights = [
                ((1.0 - ax) * (1.0 - ay), sample(x0, y0)),
                (ax * (1.0 - ay), sample(x0 + 1, y0)),
                ((1.0 - ax) * ay, sample(x0, y0 + 1)),
                (ax * ay, sample(x0 + 1, y0 + 1)),
            ];
            for c in 0..3 {
                let value: f32 = weights.iter().map(|(w, px)| w * px[c]).sum();
                row[u * 3 + c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    });

    Ok(RgbImage::from_raw(map.width, map.height, out)
        .unwrap_or_else(|| RgbImage::new(map.width, map.height)))
}

/// Luma in 14-bit fixed point: `0.299 R + 0.587 G + 0.114 B`.
pub fn rgb_to_gray(src: &RgbImage) -> GrayImage {
    GrayImage::from_fn(src.width(), src.height(), |x, y| {
        let [r, g, b] = src.get_pixel(x, y).0;
        let luma = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
        image::Luma([luma as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn shift_map(width: u32, height: u32, dx: f32, dy: f32) -> RectifyMap {
        let len = (width * height) as usize;
        let mut map_x = Vec::with_capacity(len);
        let mut map_y = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                map_x.push(x as f32 + dx);
                map_y.push(y as f32 + dy);
            }
        }
        RectifyMap { width, height, map_x, map_y }
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 200]))
    }

    #[test]
    fn integer_shift_copies_pixels() {
        let src = gradient(10, 8);
        let out = remap_bilinear(&src, &shift_map(10, 8, 2.0, 1.0)).unwrap();
        assert_eq!(out.get_pixel(3, 2), src.get_pixel(5, 3));
        assert_eq!(out.get_pixel(0, 0), src.get_pixel(2, 1));
    }

    #[test]
    fn half_pixel_shift_averages_neighbours() {
        let src = gradient(10, 8);
        let out = remap_bilinear(&src, &shift_map(10, 8, 0.5, 0.0)).unwrap();
        assert_eq!(out.get_pixel(4, 3)[0], 45);
        assert_eq!(out.get_pixel(4, 3)[1], 30);
    }

    #[test]
    fn outside_source_is_black() {
        let src = RgbImage::from_pixel(6, 6, Rgb([200, 100, 50]));
        let out = remap_bilinear(&src, &shift_map(6, 6, -10.0, 0.0)).unwrap();
        assert!(out.pixels().all(|p| *p == Rgb([0, 0, 0])));

        // Half a pixel past the right edge blends with the black border.
        let out = remap_bilinear(&src, &shift_map(6, 6, 0.5, 0.0)).unwrap();
        assert_eq!(*out.get_pixel(5, 2), Rgb([100, 50, 25]));
        assert_eq!(*out.get_pixel(2, 2), Rgb([200, 100, 50]));
    }

    #[test]
    fn output_takes_the_map_size() {
        let src = gradient(10, 8);
        let out = remap_bilinear(&src, &shift_map(4, 3, 0.0, 0.0)).unwrap();
        assert_eq!(out.dimensions(), (4, 3));
    }

    #[test]
    fn inconsistent_map_is_rejected() {
        let mut map = shift_map(4, 4, 0.0, 0.0);
        map.map_y.pop();
        assert!(remap_bilinear(&gradient(4, 4), &map).is_err());
    }

    #[test]
    fn gray_uses_rec601_weights() {
        let src = RgbImage::from_fn(4, 1, |x, _| match x {
            0 => Rgb([255, 255, 255]),
            1 => Rgb([255, 0, 0]),
            2 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let gray = rgb_to_gray(&src);
        let values: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![255, 76, 150, 29]);
    }
}

use image::GrayImage;

use crate::stereo_pipeline::common::error::Result;
use crate::stereo_pipeline::disparity::types::BlockMatchParams;

/// A device that runs the SAD correlation search over a pre-filtered, rectified pair.
///
/// Implementations return one fixed-point disparity per pixel (row-major), using
/// `INVALID_DISPARITY` where the correlation window does not fit or the match is ambiguous.
pub trait BlockMatcher {
    fn name(&self) -> &'static str;

    fn compute(&self, left: &GrayImage, right: &GrayImage, params: &BlockMatchParams) -> Result<Vec<i16>>;
}

impl<M: BlockMatcher + ?Sized> BlockMatcher for Box<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn compute(&self, left: &GrayImage, right: &GrayImage, params: &BlockMatchParams) -> Result<Vec<i16>> {
        (**self).compute(left, right, params)
    }
}

/// Pick the best disparity from a full cost curve and refine it to 1/16 pixel.
///
/// Ties resolve to the lowest disparity. Returns `None` when the uniqueness test fails.
pub(crate) fn select_disparity(costs: &[u32], uniqueness_ratio: u32) -> Option<i16> {
    let (mind, &minsad) = costs
        .iter()
        .enumerate()
        .fold((0, &u32::MAX), |best, (d, c)| if *c < *best.1 { (d, c) } else { best });

    if uniqueness_ratio > 0 {
        let thresh = minsad + minsad * uniqueness_ratio / 100;
        let ambiguous = costs
            .iter()
            .enumerate()
            .any(|(d, &c)| (d + 1 < mind || d > mind + 1) && c <= thresh);
        if ambiguous {
            return None;
        }
    }

    Some(refine_subpixel(costs, mind))
}

pub(crate) fn refine_subpixel(costs: &[u32], mind: usize) -> i16 {
    if mind == 0 || mind + 1 >= costs.len() {
        return (mind * 16) as i16;
    }
    let n = costs[mind - 1] as i64;
    let p = costs[mind + 1] as i64;
    let c = costs[mind] as i64;
    let den = p + n - 2 * c + (p - n).abs();
    let offset = if den != 0 { (n - p) * 256 / den } else { 0 };
    ((mind as i64 * 256 + offset + 15) >> 4) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stereo_pipeline::disparity::types::{DisparityMap, best_match_offset};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    #[test]
    fn picks_lowest_cost_and_first_on_ties() {
        assert_eq!(select_disparity(&[9, 4, 4, 9], 0), Some(refine_subpixel(&[9, 4, 4, 9], 1)));
        assert_eq!(select_disparity(&[0, 5, 7], 0), Some(0));
        assert_eq!(select_disparity(&[7, 5, 0], 0), Some(32));
    }

    #[test]
    fn symmetric_curve_refines_to_integer() {
        assert_eq!(refine_subpixel(&[10, 2, 10], 1), 16);
    }

    #[test]
    fn skewed_curve_shifts_toward_cheaper_neighbour() {
        let toward_right = refine_subpixel(&[20, 2, 6], 1);
        assert!(toward_right > 16, "{}", toward_right);
        let toward_left = refine_subpixel(&[6, 2, 20], 1);
        assert!(toward_left < 16, "{}", toward_left);
        assert!(toward_left >= 8);
    }

    #[test]
    fn uniqueness_rejects_distant_second_minimum() {
        let costs = [50, 10, 40, 60, 11, 70];
        assert!(select_disparity(&costs, 0).is_some());
        assert!(select_disparity(&costs, 15).is_none());

        // Neighbours of the minimum never count against uniqueness.
        let costs = [50, 10, 11, 60, 80, 70];
        assert!(select_disparity(&costs, 15).is_some());
    }

    #[test]
    fn flat_right_neighbour_keeps_the_best_match_in_the_image() {
        let fixed = select_disparity(&[20, 2, 2, 40], 0).unwrap();
        assert_eq!(fixed, 24);
        let map = DisparityMap::from_fixed_point(1, 1, 8, vec![fixed]).unwrap();
        assert_eq!(map.to_luma8().as_raw(), &vec![1]);
        assert_eq!(map.modal_disparity(), Some(1));
    }

    #[test]
    fn refined_value_always_decodes_to_lowest_cost_offset() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..5000 {
            let len = rng.gen_range(2..24);
            let costs: Vec<u32> = (0..len).map(|_| rng.gen_range(0..40)).collect();
            let best = costs
                .iter()
                .enumerate()
                .min_by_key(|(d, c)| (**c, *d))
                .map(|(d, _)| d as i16)
                .unwrap();

            let fixed = select_disparity(&costs, 0).unwrap();
            assert_eq!(best_match_offset(fixed), best, "{:?} -> {}", costs, fixed);
        }
    }
}

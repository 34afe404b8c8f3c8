//! Region → output bounding box conversion.

use crate::types::{BboxMode, FaceRegion};

/// Convert a detector region into `[left, top, right, bottom]` in the requested mode.
///
/// `Percentage` divides x coordinates by `image_width` and y coordinates by
/// `image_height`, then scales by 100. A zero dimension yields zeros on that axis.
pub fn normalize(region: &FaceRegion, image_width: u32, image_height: u32, mode: BboxMode) -> [f32; 4] {
    match mode {
        BboxMode::Absolute => [region.left, region.top, region.right, region.bottom],
        BboxMode::Percentage => {
            let px = |v: f32| percent(v, image_width);
            let py = |v: f32| percent(v, image_height);
            [px(region.left), py(region.top), px(region.right), py(region.bottom)]
        }
    }
}

fn percent(value: f32, extent: u32) -> f32 {
    if extent == 0 {
        return 0.0;
    }
    value / extent as f32 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_absolute_is_ltrb() {
        let region = FaceRegion::from_trbl(40.0, 220.0, 180.0, 100.0);
        assert_eq!(
            normalize(&region, 640, 480, BboxMode::Absolute),
            [100.0, 40.0, 220.0, 180.0]
        );
    }

    #[test]
    fn test_percentage_uses_matching_axis() {
        let region = FaceRegion::new(160.0, 120.0, 320.0, 240.0);
        let bbox = normalize(&region, 640, 480, BboxMode::Percentage);
        assert_relative_eq!(bbox[0], 25.0);
        assert_relative_eq!(bbox[1], 25.0);
        assert_relative_eq!(bbox[2], 50.0);
        assert_relative_eq!(bbox[3], 50.0);
    }

    #[test]
    fn test_full_frame_is_hundred_percent() {
        let region = FaceRegion::new(0.0, 0.0, 1920.0, 1080.0);
        assert_eq!(
            normalize(&region, 1920, 1080, BboxMode::Percentage),
            [0.0, 0.0, 100.0, 100.0]
        );
    }

    #[test]
    fn test_zero_dimension_does_not_divide_by_zero() {
        let region = FaceRegion::new(1.0, 1.0, 2.0, 2.0);
        let bbox = normalize(&region, 0, 0, BboxMode::Percentage);
        assert_eq!(bbox, [0.0; 4]);
    }

    #[rstest]
    #[case(640, 480, FaceRegion::new(13.0, 27.0, 301.0, 399.0))]
    #[case(1921, 1079, FaceRegion::new(0.0, 1.0, 1920.0, 1079.0))]
    #[case(97, 53, FaceRegion::new(3.0, 5.0, 41.0, 52.0))]
    fn test_percentage_round_trip_within_a_pixel(
        #[case] width: u32,
        #[case] height: u32,
        #[case] region: FaceRegion,
    ) {
        let absolute = normalize(&region, width, height, BboxMode::Absolute);
        let pct = normalize(&region, width, height, BboxMode::Percentage);
        let dims = [width, height, width, height];
        for i in 0..4 {
            let recovered = (pct[i] / 100.0 * dims[i] as f32).round();
            assert!(
                (recovered - absolute[i]).abs() <= 1.0,
                "coordinate {i}: {recovered} vs {}",
                absolute[i]
            );
        }
    }
}

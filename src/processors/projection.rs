//! Turning range images into Cartesian points through a lookup table.
//!
//! The range image is in image-plane orientation, like the masks drawn
//! over it. Each pixel's native index picks the ray of the table's XYZ
//! ray table; the point lies `range * range_scale` millimetres along it.

use rayon::prelude::*;

use super::lookup::LookupTable;
use super::masking::{check_image, selected_indices, Result, SegmentedCloud};
use crate::core::image::{Mask2D, RangeImage};
use crate::core::loaders::PointCloud;

#[inline]
fn valid_range(range: f32) -> bool {
    range.is_finite() && range > 0.0
}

/// Project the masked pixels of a range image to Cartesian points.
///
/// Pixels with no return (zero, negative or non-finite range) and
/// sentinel table entries are skipped. Points come out in row-major mask
/// order.
pub fn project_masked(
    range: &RangeImage,
    table: &LookupTable,
    mask: &Mask2D,
    range_scale: f32,
) -> Result<SegmentedCloud> {
    check_image(table, range)?;

    let xyz = table.xyz();
    let values = range.values();
    let mut cloud = SegmentedCloud::new();

    for (pixel, index) in selected_indices(table, mask)? {
        let r = values[pixel];
        if !valid_range(r) {
            continue;
        }
        let [x, y, z] = xyz.project(index, r * range_scale);
        cloud.push(x, y, z);
    }

    log::debug!(
        "Projected {} of {} masked pixels to points",
        cloud.len(),
        mask.count()
    );

    Ok(cloud)
}

/// Project a whole range image into a native-order cloud.
///
/// The result has one point per table entry; pixels without a return
/// and native indices the table never reaches stay at the origin so
/// indexing remains dense.
pub fn project_full(range: &RangeImage, table: &LookupTable, range_scale: f32) -> Result<PointCloud> {
    check_image(table, range)?;

    let xyz = table.xyz();
    let mut points = vec![[0.0f32; 3]; table.len()];
    let placed: Vec<(usize, [f32; 3])> = range
        .values()
        .par_iter()
        .enumerate()
        .filter_map(|(pixel, &r)| {
            let index = table.at(pixel)?;
            valid_range(r).then(|| (index, xyz.project(index, r * range_scale)))
        })
        .collect();

    for (index, point) in placed {
        points[index] = point;
    }

    let mut cloud = PointCloud::with_capacity(points.len());
    for [x, y, z] in points {
        cloud.push(x, y, z);
    }
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::BoundingBox;
    use crate::core::metadata::CalibrationMetadata;
    use crate::processors::masking::{apply, DimensionMismatchError};

    fn flat_sensor() -> LookupTable {
        // Single horizontal beam, four columns 90 degrees apart.
        let calibration = CalibrationMetadata::uniform("flat", 1, 4, 0.0, 0.0);
        LookupTable::build(&calibration, 1, 4).unwrap()
    }

    fn assert_close(actual: [f32; 3], expected: [f32; 3]) {
        for k in 0..3 {
            assert!(
                (actual[k] - expected[k]).abs() < 1e-4,
                "{:?} != {:?}",
                actual,
                expected
            );
        }
    }

    #[test]
    fn test_project_masked_scales_range() {
        let table = flat_sensor();
        let range = RangeImage::new(1, 4, vec![500.0, 250.0, 0.0, 100.0]).unwrap();
        let mask = Mask2D::from_bbox(1, 4, BoundingBox::new(0, 0, 1, 2));

        let cloud = project_masked(&range, &table, &mask, 4.0).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_close(cloud.point(0), [2.0, 0.0, 0.0]);
        assert_close(cloud.point(1), [0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_project_masked_skips_invalid_returns() {
        let table = flat_sensor();
        let range = RangeImage::new(1, 4, vec![0.0, f32::NAN, -3.0, 1000.0]).unwrap();
        let cloud = project_masked(&range, &table, &Mask2D::filled(1, 4, true), 1.0).unwrap();
        assert_eq!(cloud.len(), 1);
        assert_close(cloud.point(0), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_project_masked_dimension_checks() {
        let table = flat_sensor();
        let range = RangeImage::zeros(2, 4);
        assert!(matches!(
            project_masked(&range, &table, &Mask2D::new(1, 4), 1.0),
            Err(DimensionMismatchError::Image { image_rows: 2, .. })
        ));

        let range = RangeImage::zeros(1, 4);
        assert!(matches!(
            project_masked(&range, &table, &Mask2D::new(1, 3), 1.0),
            Err(DimensionMismatchError::Mask { .. })
        ));
    }

    #[test]
    fn test_project_full_then_apply_matches_project_masked() {
        let mut calibration = CalibrationMetadata::uniform("stagger", 2, 4, 10.0, -10.0);
        calibration.pixel_shift_by_row = vec![1, -1];
        let table = LookupTable::build(&calibration, 2, 4).unwrap();
        let range = RangeImage::new(2, 4, vec![100.0, 200.0, 300.0, 400.0, 500.0, 0.0, 700.0, 800.0]).unwrap();
        let mask = Mask2D::from_bbox(2, 4, BoundingBox::new(0, 1, 2, 3));

        let full = project_full(&range, &table, 1.0).unwrap();
        assert_eq!(full.len(), 8);

        let via_cloud = apply(&full, &table, &mask).unwrap();
        let direct = project_masked(&range, &table, &mask, 1.0).unwrap();
        assert_eq!(via_cloud.len(), 4);
        // Zero range survives as an origin point in the full cloud only.
        assert_eq!(direct.len(), 3);
        assert_eq!(via_cloud.point(0), direct.point(0));
    }

    #[test]
    fn test_project_full_sentinels_stay_at_origin() {
        let mut calibration = CalibrationMetadata::uniform("window", 1, 4, 0.0, 0.0);
        calibration.column_window = (0, 1);
        let table = LookupTable::build(&calibration, 1, 4).unwrap();
        let range = RangeImage::new(1, 4, vec![1000.0; 4]).unwrap();

        let full = project_full(&range, &table, 1.0).unwrap();
        assert_close(full.point(0), [1.0, 0.0, 0.0]);
        assert_eq!(full.point(2), [0.0, 0.0, 0.0]);
        assert_eq!(full.point(3), [0.0, 0.0, 0.0]);
    }
}

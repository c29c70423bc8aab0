//! Applying image-plane masks to point clouds.
//!
//! Masks select pixels of the image plane; the lookup table translates
//! each selected pixel into a point of the native-order cloud. Output is
//! always in row-major mask order, so identical inputs give identical
//! outputs and a larger mask yields a supersequence of a smaller one.

use rayon::prelude::*;
use thiserror::Error;

use super::lookup::LookupTable;
use crate::core::image::{Mask2D, RangeImage};
use crate::core::loaders::PointCloud;

/// Points selected from a cloud by a mask.
pub type SegmentedCloud = PointCloud;

/// An input whose shape disagrees with the lookup table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DimensionMismatchError {
    #[error("mask is {mask_rows}x{mask_columns} but the lookup table is {rows}x{columns}")]
    Mask {
        mask_rows: usize,
        mask_columns: usize,
        rows: usize,
        columns: usize,
    },

    #[error("point cloud has {points} points but the lookup table expects {expected}")]
    Cloud { points: usize, expected: usize },

    #[error("point cloud columns differ in length: x {x}, y {y}, z {z}, intensity {intensity:?}")]
    RaggedCloud {
        x: usize,
        y: usize,
        z: usize,
        intensity: Option<usize>,
    },

    #[error("image is {image_rows}x{image_columns} but the lookup table is {rows}x{columns}")]
    Image {
        image_rows: usize,
        image_columns: usize,
        rows: usize,
        columns: usize,
    },
}

/// Result type for masking operations.
pub type Result<T> = std::result::Result<T, DimensionMismatchError>;

pub(crate) fn check_mask(table: &LookupTable, mask: &Mask2D) -> Result<()> {
    let (rows, columns) = table.dims();
    if mask.rows() != rows || mask.columns() != columns {
        return Err(DimensionMismatchError::Mask {
            mask_rows: mask.rows(),
            mask_columns: mask.columns(),
            rows,
            columns,
        });
    }
    Ok(())
}

pub(crate) fn check_cloud(table: &LookupTable, cloud: &PointCloud) -> Result<()> {
    if !cloud.is_consistent() {
        return Err(DimensionMismatchError::RaggedCloud {
            x: cloud.x.len(),
            y: cloud.y.len(),
            z: cloud.z.len(),
            intensity: cloud.intensity.as_ref().map(Vec::len),
        });
    }
    if cloud.len() != table.len() {
        return Err(DimensionMismatchError::Cloud {
            points: cloud.len(),
            expected: table.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_image(table: &LookupTable, image: &RangeImage) -> Result<()> {
    let (rows, columns) = table.dims();
    if image.rows() != rows || image.columns() != columns {
        return Err(DimensionMismatchError::Image {
            image_rows: image.rows(),
            image_columns: image.columns(),
            rows,
            columns,
        });
    }
    Ok(())
}

/// (pixel, native index) pairs selected by `mask`, in row-major mask order.
///
/// Pixels are row-major offsets into the image plane. Sentinel entries of
/// the table contribute nothing.
pub fn selected_indices(table: &LookupTable, mask: &Mask2D) -> Result<Vec<(usize, usize)>> {
    check_mask(table, mask)?;
    Ok(mask
        .cells()
        .iter()
        .enumerate()
        .filter(|(_, selected)| **selected)
        .filter_map(|(pixel, _)| table.at(pixel).map(|index| (pixel, index)))
        .collect())
}

/// Extract the points of `cloud` whose image-plane position is set in `mask`.
///
/// # Errors
///
/// Returns [`DimensionMismatchError`] when the mask or cloud shape differs
/// from the table's; inputs are never cropped or padded.
///
/// # Example
///
/// ```
/// use lidar_segmentation::core::{Mask2D, PointCloud};
/// use lidar_segmentation::processors::lookup::LookupTable;
/// use lidar_segmentation::processors::masking::apply;
///
/// let cloud = PointCloud::from_xyz((0..4).map(|i| i as f32).collect(), vec![0.0; 4], vec![0.0; 4]);
/// let table = LookupTable::identity(2, 2);
/// let mut mask = Mask2D::new(2, 2);
/// mask.set(1, 0, true);
///
/// let segmented = apply(&cloud, &table, &mask).unwrap();
/// assert_eq!(segmented.x, vec![2.0]);
/// ```
pub fn apply(cloud: &PointCloud, table: &LookupTable, mask: &Mask2D) -> Result<SegmentedCloud> {
    check_cloud(table, cloud)?;
    let selected = selected_indices(table, mask)?;

    let mut segmented = SegmentedCloud::with_capacity(selected.len());
    for (_, index) in selected {
        segmented.push_from(cloud, index);
    }

    log::debug!(
        "Mask selected {} pixels, {} points extracted",
        mask.count(),
        segmented.len()
    );

    Ok(segmented)
}

/// Apply several masks to the same cloud and table in parallel.
///
/// Results are returned in mask order. Every mask is checked before any
/// work is done, so a mismatched mask fails the whole batch.
pub fn apply_many(
    cloud: &PointCloud,
    table: &LookupTable,
    masks: &[Mask2D],
) -> Result<Vec<SegmentedCloud>> {
    check_cloud(table, cloud)?;
    masks.iter().try_for_each(|mask| check_mask(table, mask))?;

    masks
        .par_iter()
        .map(|mask| apply(cloud, table, mask))
        .collect()
}

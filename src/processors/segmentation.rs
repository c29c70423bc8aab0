//! File-level segmentation runs.
//!
//! These functions tie the pieces together for the CLI: read sensor
//! metadata and inputs from disk, resolve a mask, segment, composite and
//! write the results into an output directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::cache::TableCache;
use super::compositor::{combine, CombinedCloud, Origin};
use super::keypoints::limb_mask;
use super::lookup::LookupTable;
use super::masking::{apply, SegmentedCloud};
use super::projection::{project_full, project_masked};
use crate::config::{MaskConfig, OutputConfig, PipelineConfig, SensorConfig};
use crate::core::image::{BoundingBox, Mask2D};
use crate::core::loaders::{
    load_keypoints_csv, load_mask_csv, load_point_cloud, load_range_image_csv, PointCloud,
};
use crate::core::metadata::CalibrationMetadata;
use crate::core::writers::{
    write_cartesian_csv, write_combined_csv, write_combined_ply, write_lookup_csv, write_ply,
};

/// Where the image-plane mask comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskSource {
    /// CSV grid of 0/1 cells.
    File(PathBuf),
    /// Detection box over the image plane.
    BoundingBox(BoundingBox),
    /// Pose keypoints CSV; the configured limb is drawn.
    Keypoints(PathBuf),
}

/// What a segmentation run produced.
#[derive(Debug, Clone)]
pub struct SegmentationSummary {
    pub sensor_model: String,
    pub rows: usize,
    pub columns: usize,
    pub original_points: usize,
    pub masked_pixels: usize,
    pub segmented_points: usize,
    /// Output kind ("segmented", "combined", ...) to written path.
    pub outputs: HashMap<String, PathBuf>,
}

/// Image-plane size: config overrides win over the metadata.
pub fn image_dimensions(calibration: &CalibrationMetadata, sensor: &SensorConfig) -> (usize, usize) {
    (
        sensor.rows.unwrap_or(calibration.pixels_per_column),
        sensor.columns.unwrap_or(calibration.columns_per_frame),
    )
}

/// Load calibration metadata, attaching the path to any failure.
pub fn load_calibration(path: &Path) -> Result<CalibrationMetadata> {
    CalibrationMetadata::from_json_file(path)
        .with_context(|| format!("Failed to read sensor metadata {}", path.display()))
}

/// Produce the mask described by `source` for a `rows` x `columns` plane.
///
/// Masks read from disk must already match the plane; they are never
/// resized.
pub fn resolve_mask(
    source: &MaskSource,
    rows: usize,
    columns: usize,
    config: &MaskConfig,
) -> Result<Mask2D> {
    match source {
        MaskSource::File(path) => {
            load_mask_csv(path).with_context(|| format!("Failed to load mask {}", path.display()))
        }
        MaskSource::BoundingBox(bbox) => Ok(Mask2D::from_bbox(rows, columns, *bbox)),
        MaskSource::Keypoints(path) => {
            let keypoints = load_keypoints_csv(path)
                .with_context(|| format!("Failed to load keypoints {}", path.display()))?;
            limb_mask(&keypoints, rows, columns, config)
                .with_context(|| format!("No limb mask from {}", path.display()))
        }
    }
}

/// Build the lookup table for a metadata file and write it as CSV.
pub fn export_lookup_table(
    metadata_path: &Path,
    output_path: &Path,
    sensor: &SensorConfig,
) -> Result<LookupTable> {
    let calibration = load_calibration(metadata_path)?;
    let (rows, columns) = image_dimensions(&calibration, sensor);
    let table = LookupTable::build_with_unit(&calibration, rows, columns, sensor.range_unit)
        .with_context(|| format!("Cannot build a {}x{} lookup table", rows, columns))?;

    write_lookup_csv(output_path, &table)?;
    log::info!("Wrote lookup table to {}", output_path.display());

    Ok(table)
}

/// Segment a native-order point cloud file with a mask.
///
/// Writes `<prefix>_segmented.ply` and `<prefix>_combined.ply` to
/// `output_dir`, plus CSV twins when `config.output.write_csv` is set.
/// Tables come from `cache`, so repeated runs for one sensor share a
/// single table.
pub fn segment_files(
    metadata_path: &Path,
    cloud_path: &Path,
    mask_source: &MaskSource,
    output_dir: &Path,
    name_prefix: &str,
    config: &PipelineConfig,
    cache: &TableCache,
) -> Result<SegmentationSummary> {
    let calibration = load_calibration(metadata_path)?;
    let (rows, columns) = image_dimensions(&calibration, &config.sensor);
    let table = cache
        .get_or_build(&calibration, rows, columns)
        .with_context(|| format!("Cannot build a {}x{} lookup table", rows, columns))?;

    let cloud = load_point_cloud(cloud_path)
        .with_context(|| format!("Failed to load point cloud {}", cloud_path.display()))?;
    let mask = resolve_mask(mask_source, rows, columns, &config.mask)?;

    let segmented = apply(&cloud, &table, &mask)?;
    finish(
        &calibration,
        (rows, columns),
        &mask,
        &cloud,
        &segmented,
        output_dir,
        name_prefix,
        &config.output,
    )
}

/// Segment directly from a range image, projecting through the XYZ ray
/// table.
///
/// The original cloud is the full projection of the range image, so the
/// outputs match those of [`segment_files`].
pub fn project_files(
    metadata_path: &Path,
    range_path: &Path,
    mask_source: &MaskSource,
    output_dir: &Path,
    name_prefix: &str,
    config: &PipelineConfig,
) -> Result<SegmentationSummary> {
    let calibration = load_calibration(metadata_path)?;
    let (rows, columns) = image_dimensions(&calibration, &config.sensor);
    let table =
        LookupTable::build_with_unit(&calibration, rows, columns, config.sensor.range_unit)
            .with_context(|| format!("Cannot build a {}x{} lookup table", rows, columns))?;

    let range = load_range_image_csv(range_path)
        .with_context(|| format!("Failed to load range image {}", range_path.display()))?;
    let mask = resolve_mask(mask_source, rows, columns, &config.mask)?;

    let scale = config.sensor.range_scale;
    let full = project_full(&range, &table, scale)?;
    let segmented = project_masked(&range, &table, &mask, scale)?;
    finish(
        &calibration,
        (rows, columns),
        &mask,
        &full,
        &segmented,
        output_dir,
        name_prefix,
        &config.output,
    )
}

#[allow(clippy::too_many_arguments)]
fn finish(
    calibration: &CalibrationMetadata,
    (rows, columns): (usize, usize),
    mask: &Mask2D,
    original: &PointCloud,
    segmented: &SegmentedCloud,
    output_dir: &Path,
    name_prefix: &str,
    output: &OutputConfig,
) -> Result<SegmentationSummary> {
    if segmented.is_empty() {
        log::warn!("Mask selected no points; segmented cloud is empty");
    }

    let combined = combine(original, segmented);
    let outputs = write_outputs(&combined, segmented, output_dir, name_prefix, output)?;

    Ok(SegmentationSummary {
        sensor_model: calibration.prod_line.clone(),
        rows,
        columns,
        original_points: combined.count(Origin::Original),
        masked_pixels: mask.count(),
        segmented_points: combined.count(Origin::Segmented),
        outputs,
    })
}

fn write_outputs(
    combined: &CombinedCloud,
    segmented: &SegmentedCloud,
    output_dir: &Path,
    name_prefix: &str,
    output: &OutputConfig,
) -> Result<HashMap<String, PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut outputs = HashMap::new();

    let segmented_path = output_dir.join(format!("{}_segmented.ply", name_prefix));
    write_ply(&segmented_path, segmented)?;
    outputs.insert("segmented".to_string(), segmented_path);

    let combined_path = output_dir.join(format!("{}_combined.ply", name_prefix));
    write_combined_ply(
        &combined_path,
        combined,
        output.original_color,
        output.segmented_color,
    )?;
    outputs.insert("combined".to_string(), combined_path);

    if output.write_csv {
        let segmented_csv = output_dir.join(format!("{}_segmented.csv", name_prefix));
        write_cartesian_csv(&segmented_csv, segmented)?;
        outputs.insert("segmented_csv".to_string(), segmented_csv);

        let combined_csv = output_dir.join(format!("{}_combined.csv", name_prefix));
        write_combined_csv(&combined_csv, combined)?;
        outputs.insert("combined_csv".to_string(), combined_csv);
    }

    for (kind, path) in &outputs {
        log::info!("Wrote {} cloud to {}", kind, path.display());
    }

    Ok(outputs)
}

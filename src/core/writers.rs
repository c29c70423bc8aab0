//! Data writers for PLY and CSV formats.
//!
//! This module provides functions for writing segmentation results:
//! - PLY (ASCII) for plain clouds and for origin-colored combined clouds
//! - CSV with Cartesian coordinates, or coordinates plus origin tag
//! - CSV grids for masks and CSV listings of lookup tables

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::image::Mask2D;
use super::loaders::PointCloud;
use crate::processors::compositor::{CombinedCloud, Origin};
use crate::processors::lookup::LookupTable;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::with_capacity(1024 * 1024, file))
}

fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    Ok(csv::Writer::from_writer(create_buffered_writer(path)?))
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> WriteError + '_ {
    move |source| WriteError::WriteFile {
        path: path.display().to_string(),
        source,
    }
}

fn csv_error(path: &Path) -> impl Fn(csv::Error) -> WriteError + '_ {
    move |source| WriteError::CsvError {
        path: path.display().to_string(),
        source,
    }
}

fn write_ply_header<W: Write>(writer: &mut W, vertices: usize, properties: &[&str]) -> std::io::Result<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", vertices)?;
    for property in properties {
        writeln!(writer, "property {}", property)?;
    }
    writeln!(writer, "end_header")
}

/// Write a point cloud to an ASCII PLY file.
///
/// Properties are `x y z`, plus `intensity` when the cloud carries it.
/// Parent directories are created if needed.
///
/// # Example
///
/// ```no_run
/// use lidar_segmentation::core::loaders::PointCloud;
/// use lidar_segmentation::core::writers::write_ply;
/// use std::path::Path;
///
/// let cloud = PointCloud::default();
/// write_ply(Path::new("output.ply"), &cloud).unwrap();
/// ```
pub fn write_ply(path: &Path, cloud: &PointCloud) -> Result<()> {
    let mut writer = create_buffered_writer(path)?;
    let err = io_error(path);

    let mut properties = vec!["float x", "float y", "float z"];
    if cloud.intensity.is_some() {
        properties.push("float intensity");
    }
    write_ply_header(&mut writer, cloud.len(), &properties).map_err(&err)?;

    for i in 0..cloud.len() {
        let [x, y, z] = cloud.point(i);
        let written = match cloud.intensity {
            Some(ref intensity) => writeln!(writer, "{:.6} {:.6} {:.6} {}", x, y, z, intensity[i]),
            None => writeln!(writer, "{:.6} {:.6} {:.6}", x, y, z),
        };
        written.map_err(&err)?;
    }

    writer.flush().map_err(io_error(path))
}

/// Write a combined cloud to an ASCII PLY file, colored by origin.
pub fn write_combined_ply(
    path: &Path,
    combined: &CombinedCloud,
    original_color: [u8; 3],
    segmented_color: [u8; 3],
) -> Result<()> {
    let mut writer = create_buffered_writer(path)?;
    let err = io_error(path);

    write_ply_header(
        &mut writer,
        combined.len(),
        &[
            "float x",
            "float y",
            "float z",
            "uchar red",
            "uchar green",
            "uchar blue",
        ],
    )
    .map_err(&err)?;

    for (i, origin) in combined.origins.iter().enumerate() {
        let [x, y, z] = combined.points.point(i);
        let [r, g, b] = match origin {
            Origin::Original => original_color,
            Origin::Segmented => segmented_color,
        };
        writeln!(writer, "{:.6} {:.6} {:.6} {} {} {}", x, y, z, r, g, b).map_err(&err)?;
    }

    writer.flush().map_err(io_error(path))
}

/// Write point cloud to CSV with x, y, z (and intensity) columns.
pub fn write_cartesian_csv(path: &Path, cloud: &PointCloud) -> Result<()> {
    let mut csv_writer = create_csv_writer(path)?;
    let err = csv_error(path);

    let header: &[&str] = if cloud.intensity.is_some() {
        &["x", "y", "z", "intensity"]
    } else {
        &["x", "y", "z"]
    };
    csv_writer.write_record(header).map_err(&err)?;

    for i in 0..cloud.len() {
        let mut record = vec![
            format!("{:.6}", cloud.x[i]),
            format!("{:.6}", cloud.y[i]),
            format!("{:.6}", cloud.z[i]),
        ];
        if let Some(ref intensity) = cloud.intensity {
            record.push(intensity[i].to_string());
        }
        csv_writer.write_record(&record).map_err(&err)?;
    }

    csv_writer.flush().map_err(io_error(path))
}

/// Write a combined cloud to CSV with x, y, z, origin columns.
///
/// # Example
///
/// ```no_run
/// use lidar_segmentation::core::loaders::PointCloud;
/// use lidar_segmentation::core::writers::write_combined_csv;
/// use lidar_segmentation::processors::compositor::combine;
/// use std::path::Path;
///
/// let cloud = PointCloud::from_xyz(vec![1.0], vec![2.0], vec![3.0]);
/// let combined = combine(&cloud, &cloud);
/// write_combined_csv(Path::new("combined.csv"), &combined).unwrap();
/// ```
pub fn write_combined_csv(path: &Path, combined: &CombinedCloud) -> Result<()> {
    let mut csv_writer = create_csv_writer(path)?;
    let err = csv_error(path);

    csv_writer
        .write_record(["x", "y", "z", "origin"])
        .map_err(&err)?;

    for (i, origin) in combined.origins.iter().enumerate() {
        let [x, y, z] = combined.points.point(i);
        csv_writer
            .write_record(&[
                format!("{:.6}", x),
                format!("{:.6}", y),
                format!("{:.6}", z),
                origin.to_string(),
            ])
            .map_err(&err)?;
    }

    csv_writer.flush().map_err(io_error(path))
}

/// Write a mask as a headerless CSV grid of 0/1 cells.
pub fn write_mask_csv(path: &Path, mask: &Mask2D) -> Result<()> {
    let mut csv_writer = create_csv_writer(path)?;
    let err = csv_error(path);

    if mask.columns() > 0 {
        for row in mask.cells().chunks(mask.columns()) {
            csv_writer
                .write_record(row.iter().map(|&c| if c { "1" } else { "0" }))
                .map_err(&err)?;
        }
    }

    csv_writer.flush().map_err(io_error(path))
}

/// Write a lookup table as CSV with row, column, index columns.
///
/// Sentinel entries are written with an empty index.
pub fn write_lookup_csv(path: &Path, table: &LookupTable) -> Result<()> {
    let mut csv_writer = create_csv_writer(path)?;
    let err = csv_error(path);

    csv_writer
        .write_record(["row", "column", "index"])
        .map_err(&err)?;

    for (row, column, index) in table.entries() {
        csv_writer
            .write_record(&[
                row.to_string(),
                column.to_string(),
                index.map(|i| i.to_string()).unwrap_or_default(),
            ])
            .map_err(&err)?;
    }

    csv_writer.flush().map_err(io_error(path))
}

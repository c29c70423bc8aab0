//! Data loaders for point clouds, range images, masks and keypoints.
//!
//! This module provides parsers for:
//! - ASCII PLY point cloud files (with optional intensity/reflectivity)
//! - Cartesian point cloud CSV files (x, y, z and optional intensity columns)
//! - Range image and mask CSV grids (one image row per CSV row)
//! - Pose keypoint CSV files (x, y, confidence columns)

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

use super::image::{ImageError, Mask2D, RangeImage};
use crate::processors::keypoints::Keypoint;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Ragged grid in {path}: row {row} has {found} columns, expected {expected}")]
    RaggedGrid {
        path: PathBuf,
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("Unsupported point cloud format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Container for 3D point cloud data in the sensor's native ordering.
///
/// Invalid returns are kept as zero points so indices stay stable.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
    /// Optional reflectivity/intensity for each point.
    pub intensity: Option<Vec<f32>>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            intensity: None,
        }
    }

    /// Creates a new point cloud from coordinate vectors.
    pub fn from_xyz(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>) -> Self {
        Self {
            x,
            y,
            z,
            intensity: None,
        }
    }

    /// Creates a new point cloud from coordinate vectors with intensities.
    pub fn from_xyz_intensity(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>, intensity: Vec<f32>) -> Self {
        Self {
            x,
            y,
            z,
            intensity: Some(intensity),
        }
    }

    /// Creates a point cloud of `len` zero points.
    pub fn zeros(len: usize) -> Self {
        Self::from_xyz(vec![0.0; len], vec![0.0; len], vec![0.0; len])
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            intensity: None,
        }
    }

    /// Returns the number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// True when every column holds the same number of values.
    pub fn is_consistent(&self) -> bool {
        let n = self.x.len();
        self.y.len() == n
            && self.z.len() == n
            && self.intensity.as_ref().map_or(true, |i| i.len() == n)
    }

    /// Coordinates of point `i`.
    #[inline]
    pub fn point(&self, i: usize) -> [f32; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    /// Converts point cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<[f32; 3]> {
        (0..self.len()).map(|i| self.point(i)).collect()
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    /// Adds a point with intensity to the cloud.
    pub fn push_with_intensity(&mut self, x: f32, y: f32, z: f32, intensity: f32) {
        self.push(x, y, z);
        self.intensity
            .get_or_insert_with(|| Vec::with_capacity(self.x.capacity()))
            .push(intensity);
    }

    /// Copies point `i` of `source` onto the end of this cloud.
    pub fn push_from(&mut self, source: &PointCloud, i: usize) {
        match source.intensity {
            Some(ref intensity) => {
                self.push_with_intensity(source.x[i], source.y[i], source.z[i], intensity[i])
            }
            None => self.push(source.x[i], source.y[i], source.z[i]),
        }
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a numeric cell, reporting where it failed.
fn parse_cell(value: &str, path: &Path, row: usize) -> Result<f32> {
    value.trim().parse().map_err(|_| {
        LoaderError::ParseError(format!(
            "{}: invalid value '{}' on row {}",
            path.display(),
            value,
            row
        ))
    })
}

/// Load a point cloud from a file, choosing the parser by extension.
///
/// `.ply` files go through [`load_ply`], `.csv` through [`load_cartesian_csv`].
pub fn load_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("ply") => load_ply(path),
        Some("csv") => load_cartesian_csv(path),
        _ => Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Load a Cartesian point cloud from a CSV file with x, y, z columns.
///
/// Columns are looked up by name (case-insensitive), falling back to the
/// first three columns. An `intensity` or `reflectivity` column is
/// carried when present.
pub fn load_cartesian_csv<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let x_idx = col_map.get("x").copied().unwrap_or(0);
    let y_idx = col_map.get("y").copied().unwrap_or(1);
    let z_idx = col_map.get("z").copied().unwrap_or(2);
    let i_idx = col_map
        .get("intensity")
        .or_else(|| col_map.get("reflectivity"))
        .copied();

    let mut cloud = PointCloud::with_capacity(65536);

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let cell = |idx: usize| -> Result<f32> {
            let value = record
                .get(idx)
                .ok_or_else(|| LoaderError::MissingColumns(format!("column {} on row {}", idx, row)))?;
            parse_cell(value, path, row)
        };

        let (x, y, z) = (cell(x_idx)?, cell(y_idx)?, cell(z_idx)?);
        match i_idx {
            Some(idx) => cloud.push_with_intensity(x, y, z, cell(idx)?),
            None => cloud.push(x, y, z),
        }
    }

    if cloud.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(cloud)
}

/// Load a point cloud from an ASCII PLY file.
///
/// Supports PLY files with vertex elements containing:
/// - Required: x, y, z properties
/// - Optional: intensity (or reflectivity) property
///
/// # Errors
///
/// Returns an error if the file is not a valid PLY or lacks required properties.
pub fn load_ply<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    // Check PLY magic number
    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut header_done = false;
    let mut in_vertex_element = false;
    let mut line_number = 1;

    for line in &mut lines {
        let line = line?;
        line_number += 1;
        let stripped = line.trim();

        if stripped.starts_with("format") && !stripped.contains("ascii") {
            return Err(LoaderError::InvalidPly(format!(
                "only ASCII PLY is supported, found '{}'",
                stripped
            )));
        } else if stripped.starts_with("element") {
            in_vertex_element = stripped.starts_with("element vertex");
            if in_vertex_element {
                num_vertices = stripped.split_whitespace().last().and_then(|c| c.parse().ok());
            }
        } else if stripped.starts_with("property") && in_vertex_element {
            if let Some(name) = stripped.split_whitespace().last() {
                prop_names.push(name.to_string());
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<&str, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let required = |name: &str| {
        prop_idx
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let x_idx = required("x")?;
    let y_idx = required("y")?;
    let z_idx = required("z")?;
    let i_idx = prop_idx
        .get("intensity")
        .or_else(|| prop_idx.get("reflectivity"))
        .copied();

    let mut cloud = PointCloud::with_capacity(num_vertices);

    let mut vertex_count = 0;
    for line in lines {
        if vertex_count >= num_vertices {
            break;
        }

        let line = line?;
        line_number += 1;
        let values: Vec<&str> = line.split_whitespace().collect();

        if values.is_empty() {
            continue;
        }
        if values.len() < prop_names.len() {
            return Err(LoaderError::InvalidPly(format!(
                "{}: line {} has {} values, expected {}",
                path.display(),
                line_number,
                values.len(),
                prop_names.len()
            )));
        }

        let x = parse_cell(values[x_idx], path, vertex_count)?;
        let y = parse_cell(values[y_idx], path, vertex_count)?;
        let z = parse_cell(values[z_idx], path, vertex_count)?;
        match i_idx {
            Some(idx) => {
                let intensity = parse_cell(values[idx], path, vertex_count)?;
                cloud.push_with_intensity(x, y, z, intensity);
            }
            None => cloud.push(x, y, z),
        }

        vertex_count += 1;
    }

    if vertex_count < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices, vertex_count
        )));
    }

    Ok(cloud)
}

/// Read a headerless numeric CSV grid, returning (rows, columns, values).
fn load_grid_csv(path: &Path) -> Result<(usize, usize, Vec<f32>)> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut values = Vec::new();
    let mut columns: Option<usize> = None;
    let mut rows = 0;

    for result in reader.records() {
        let record = result?;
        let expected = *columns.get_or_insert(record.len());
        if record.len() != expected {
            return Err(LoaderError::RaggedGrid {
                path: path.to_path_buf(),
                row: rows,
                found: record.len(),
                expected,
            });
        }
        for value in record.iter() {
            values.push(parse_cell(value, path, rows)?);
        }
        rows += 1;
    }

    match columns {
        Some(columns) if rows > 0 => Ok((rows, columns, values)),
        _ => Err(LoaderError::EmptyFile(path.to_path_buf())),
    }
}

/// Load a range (or reflectivity) image from a headerless CSV grid.
pub fn load_range_image_csv<P: AsRef<Path>>(path: P) -> Result<RangeImage> {
    let (rows, columns, values) = load_grid_csv(path.as_ref())?;
    Ok(RangeImage::new(rows, columns, values)?)
}

/// Load a mask from a headerless CSV grid; any non-zero cell is selected.
pub fn load_mask_csv<P: AsRef<Path>>(path: P) -> Result<Mask2D> {
    let (rows, columns, values) = load_grid_csv(path.as_ref())?;
    let cells = values.into_iter().map(|v| v != 0.0).collect();
    Ok(Mask2D::from_cells(rows, columns, cells)?)
}

/// Load pose keypoints from a CSV file with x, y, confidence columns.
///
/// Row order is the keypoint index (COCO order for pose models).
pub fn load_keypoints_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Keypoint>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let (x_idx, y_idx, c_idx) = (find("x")?, find("y")?, find("confidence")?);

    let mut keypoints = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let cell = |idx: usize| parse_cell(record.get(idx).unwrap_or(""), path, row);
        keypoints.push(Keypoint::new(cell(x_idx)?, cell(y_idx)?, cell(c_idx)?));
    }

    if keypoints.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(keypoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn temp_with_suffix(suffix: &str) -> NamedTempFile {
        Builder::new().suffix(suffix).tempfile().unwrap()
    }

    #[test]
    fn test_point_cloud_operations() {
        let mut cloud = PointCloud::new();
        assert!(cloud.is_empty());

        cloud.push(1.0, 2.0, 3.0);
        cloud.push(4.0, 5.0, 6.0);

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.point(1), [4.0, 5.0, 6.0]);
        assert_eq!(cloud.to_coords(), vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert!(cloud.intensity.is_none());
        assert!(cloud.is_consistent());

        cloud.y.push(0.0);
        assert!(!cloud.is_consistent());
    }

    #[test]
    fn test_push_from_keeps_intensity() {
        let source =
            PointCloud::from_xyz_intensity(vec![1.0, 2.0], vec![0.0, 0.0], vec![0.0, 0.0], vec![7.0, 9.0]);
        let mut cloud = PointCloud::new();
        cloud.push_from(&source, 1);
        assert_eq!(cloud.point(0), [2.0, 0.0, 0.0]);
        assert_eq!(cloud.intensity, Some(vec![9.0]));
    }

    #[test]
    fn test_load_cartesian_csv_with_intensity() -> Result<()> {
        let mut file = temp_with_suffix(".csv");
        writeln!(file, "x,y,z,intensity").unwrap();
        writeln!(file, "1.0,2.0,3.0,10").unwrap();
        writeln!(file, "4.0,5.0,6.0,20").unwrap();
        file.flush().unwrap();

        let cloud = load_point_cloud(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.point(0), [1.0, 2.0, 3.0]);
        assert_eq!(cloud.intensity, Some(vec![10.0, 20.0]));

        Ok(())
    }

    #[test]
    fn test_load_cartesian_csv_bad_value() {
        let mut file = temp_with_suffix(".csv");
        writeln!(file, "x,y,z").unwrap();
        writeln!(file, "1.0,oops,3.0").unwrap();
        file.flush().unwrap();

        let result = load_cartesian_csv(file.path());
        assert!(matches!(result, Err(LoaderError::ParseError(_))));
    }

    #[test]
    fn test_load_ply() -> Result<()> {
        let mut file = temp_with_suffix(".ply");
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 2").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "property float intensity").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "1.0 2.0 3.0 50").unwrap();
        writeln!(file, "4.0 5.0 6.0 60").unwrap();
        file.flush().unwrap();

        let cloud = load_point_cloud(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.x[0], 1.0);
        assert_eq!(cloud.y[1], 5.0);
        assert_eq!(cloud.intensity, Some(vec![50.0, 60.0]));

        Ok(())
    }

    #[test]
    fn test_load_ply_truncated() {
        let mut file = temp_with_suffix(".ply");
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 3").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "1.0 2.0 3.0").unwrap();
        file.flush().unwrap();

        assert!(matches!(load_ply(file.path()), Err(LoaderError::InvalidPly(_))));
    }

    #[test]
    fn test_load_ply_short_vertex_line() {
        let mut file = temp_with_suffix(".ply");
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 2").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "element face 1").unwrap();
        writeln!(file, "property list uchar int vertex_indices").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "1.0 2.0").unwrap();
        writeln!(file, "3.0 4.0 5.0").unwrap();
        writeln!(file, "3 0 1 2").unwrap();
        file.flush().unwrap();

        match load_ply(file.path()) {
            Err(LoaderError::InvalidPly(message)) => assert!(message.contains("line 10")),
            other => panic!("expected InvalidPly, got {:?}", other),
        }
    }

    #[test]
    fn test_load_ply_skips_blank_lines() {
        let mut file = temp_with_suffix(".ply");
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 2").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "1.0 2.0 3.0").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "4.0 5.0 6.0").unwrap();
        file.flush().unwrap();

        let cloud = load_ply(file.path()).unwrap();
        assert_eq!(cloud.to_coords(), vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_load_ply_rejects_binary() {
        let mut file = temp_with_suffix(".ply");
        writeln!(file, "ply").unwrap();
        writeln!(file, "format binary_little_endian 1.0").unwrap();
        writeln!(file, "element vertex 1").unwrap();
        writeln!(file, "end_header").unwrap();
        file.flush().unwrap();

        assert!(matches!(load_ply(file.path()), Err(LoaderError::InvalidPly(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = temp_with_suffix(".pcd");
        assert!(matches!(
            load_point_cloud(file.path()),
            Err(LoaderError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_load_range_image_csv() -> Result<()> {
        let mut file = temp_with_suffix(".csv");
        writeln!(file, "0,100,200").unwrap();
        writeln!(file, "300,0,500").unwrap();
        file.flush().unwrap();

        let image = load_range_image_csv(file.path())?;
        assert_eq!((image.rows(), image.columns()), (2, 3));
        assert_eq!(image.get(1, 2), Some(500.0));

        Ok(())
    }

    #[test]
    fn test_load_mask_csv_ragged() {
        let mut file = temp_with_suffix(".csv");
        writeln!(file, "0,1,0").unwrap();
        writeln!(file, "1,1").unwrap();
        file.flush().unwrap();

        let result = load_mask_csv(file.path());
        assert!(matches!(
            result,
            Err(LoaderError::RaggedGrid { row: 1, found: 2, expected: 3, .. })
        ));
    }

    #[test]
    fn test_load_mask_csv() -> Result<()> {
        let mut file = temp_with_suffix(".csv");
        writeln!(file, "0,1").unwrap();
        writeln!(file, "1,0").unwrap();
        file.flush().unwrap();

        let mask = load_mask_csv(file.path())?;
        assert_eq!(mask.selected().collect::<Vec<_>>(), vec![(0, 1), (1, 0)]);

        Ok(())
    }

    #[test]
    fn test_load_empty_grid() {
        let file = temp_with_suffix(".csv");
        assert!(matches!(
            load_range_image_csv(file.path()),
            Err(LoaderError::EmptyFile(_))
        ));
    }

    #[test]
    fn test_load_keypoints_csv() -> Result<()> {
        let mut file = temp_with_suffix(".csv");
        writeln!(file, "x,y,confidence").unwrap();
        writeln!(file, "10.5,3.0,0.9").unwrap();
        writeln!(file, "12.0,4.0,0.2").unwrap();
        file.flush().unwrap();

        let keypoints = load_keypoints_csv(file.path())?;
        assert_eq!(keypoints.len(), 2);
        assert_eq!(keypoints[0], Keypoint::new(10.5, 3.0, 0.9));
        assert_eq!(keypoints[1].confidence, 0.2);

        Ok(())
    }
}

//! Sensor calibration metadata.
//!
//! Parses the JSON metadata an Ouster sensor (or its ROS driver on the
//! `/ouster/metadata` topic) publishes. Two layouts are accepted:
//! - the legacy flat layout (`beam_altitude_angles`, `data_format`, ...)
//! - the nested layout (`beam_intrinsics`, `lidar_intrinsics`,
//!   `lidar_data_format`, `sensor_info`)

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while reading calibration metadata.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing metadata field: {0}")]
    MissingField(&'static str),

    #[error("Invalid metadata field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Result type for metadata operations.
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Row-major 4x4 identity transform.
pub const IDENTITY_TRANSFORM: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Fixed per-sensor calibration parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMetadata {
    /// Sensor model, e.g. "OS-1-64".
    pub prod_line: String,
    /// Beam elevation angles in degrees, one per row.
    pub beam_altitude_angles: Vec<f32>,
    /// Beam azimuth offsets in degrees, one per row.
    pub beam_azimuth_angles: Vec<f32>,
    /// Distance from the lidar origin to each beam origin.
    pub lidar_origin_to_beam_origin_mm: f32,
    /// Row-major 4x4 lidar-to-sensor transform, translation in mm.
    pub lidar_to_sensor_transform: [f32; 16],
    /// Destagger shift per row. Empty means no shift.
    pub pixel_shift_by_row: Vec<i32>,
    /// Measurement columns in one frame.
    pub columns_per_frame: usize,
    /// Beams per measurement column.
    pub pixels_per_column: usize,
    /// Inclusive range of measurement columns that carry returns.
    pub column_window: (usize, usize),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDataFormat {
    pixels_per_column: Option<usize>,
    columns_per_frame: Option<usize>,
    pixel_shift_by_row: Option<Vec<i32>>,
    column_window: Option<[usize; 2]>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBeamIntrinsics {
    beam_altitude_angles: Option<Vec<f32>>,
    beam_azimuth_angles: Option<Vec<f32>>,
    lidar_origin_to_beam_origin_mm: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLidarIntrinsics {
    lidar_to_sensor_transform: Option<Vec<f32>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSensorInfo {
    prod_line: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetadata {
    prod_line: Option<String>,
    beam_altitude_angles: Option<Vec<f32>>,
    beam_azimuth_angles: Option<Vec<f32>>,
    lidar_origin_to_beam_origin_mm: Option<f32>,
    lidar_to_sensor_transform: Option<Vec<f32>>,
    data_format: Option<RawDataFormat>,
    sensor_info: Option<RawSensorInfo>,
    beam_intrinsics: Option<RawBeamIntrinsics>,
    lidar_intrinsics: Option<RawLidarIntrinsics>,
    lidar_data_format: Option<RawDataFormat>,
}

impl RawMetadata {
    fn resolve(self) -> Result<CalibrationMetadata> {
        let beams = self.beam_intrinsics.unwrap_or_default();
        let format = self
            .lidar_data_format
            .or(self.data_format)
            .ok_or(MetadataError::MissingField("data_format"))?;

        let beam_altitude_angles = beams
            .beam_altitude_angles
            .or(self.beam_altitude_angles)
            .ok_or(MetadataError::MissingField("beam_altitude_angles"))?;
        let beam_azimuth_angles = beams
            .beam_azimuth_angles
            .or(self.beam_azimuth_angles)
            .ok_or(MetadataError::MissingField("beam_azimuth_angles"))?;
        let lidar_origin_to_beam_origin_mm = beams
            .lidar_origin_to_beam_origin_mm
            .or(self.lidar_origin_to_beam_origin_mm)
            .unwrap_or(0.0);

        let lidar_to_sensor_transform = match self
            .lidar_intrinsics
            .and_then(|l| l.lidar_to_sensor_transform)
            .or(self.lidar_to_sensor_transform)
        {
            Some(values) => <[f32; 16]>::try_from(values.as_slice()).map_err(|_| {
                MetadataError::InvalidField {
                    field: "lidar_to_sensor_transform",
                    reason: format!("expected 16 values, found {}", values.len()),
                }
            })?,
            None => IDENTITY_TRANSFORM,
        };

        let columns_per_frame = format
            .columns_per_frame
            .ok_or(MetadataError::MissingField("columns_per_frame"))?;
        let pixels_per_column = format
            .pixels_per_column
            .unwrap_or(beam_altitude_angles.len());
        let column_window = format
            .column_window
            .map(|[start, end]| (start, end))
            .unwrap_or((0, columns_per_frame.saturating_sub(1)));

        let prod_line = self
            .sensor_info
            .and_then(|s| s.prod_line)
            .or(self.prod_line)
            .unwrap_or_else(|| "unknown".to_string());

        Ok(CalibrationMetadata {
            prod_line,
            beam_altitude_angles,
            beam_azimuth_angles,
            lidar_origin_to_beam_origin_mm,
            lidar_to_sensor_transform,
            pixel_shift_by_row: format.pixel_shift_by_row.unwrap_or_default(),
            columns_per_frame,
            pixels_per_column,
            column_window,
        })
    }
}

impl CalibrationMetadata {
    /// Parse metadata from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawMetadata = serde_json::from_str(json)?;
        raw.resolve()
    }

    /// Parse metadata from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| MetadataError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&content)
    }

    /// Calibration for an idealised sensor: beams evenly spread between
    /// `fov_up` and `fov_down` degrees, no azimuth offsets, no stagger.
    pub fn uniform(prod_line: &str, rows: usize, columns: usize, fov_up: f32, fov_down: f32) -> Self {
        let step = if rows > 1 {
            (fov_up - fov_down) / (rows - 1) as f32
        } else {
            0.0
        };
        Self {
            prod_line: prod_line.to_string(),
            beam_altitude_angles: (0..rows).map(|r| fov_up - step * r as f32).collect(),
            beam_azimuth_angles: vec![0.0; rows],
            lidar_origin_to_beam_origin_mm: 0.0,
            lidar_to_sensor_transform: IDENTITY_TRANSFORM,
            pixel_shift_by_row: Vec::new(),
            columns_per_frame: columns,
            pixels_per_column: rows,
            column_window: (0, columns.saturating_sub(1)),
        }
    }

    /// Number of beams described by the altitude table.
    #[inline]
    pub fn beam_count(&self) -> usize {
        self.beam_altitude_angles.len()
    }

    /// Destagger shift for a row, zero when no shift table is present.
    #[inline]
    pub fn shift_for_row(&self, row: usize) -> i32 {
        self.pixel_shift_by_row.get(row).copied().unwrap_or(0)
    }

    /// Whether a measurement column lies inside the column window.
    ///
    /// A window whose start is past its end wraps around the frame.
    pub fn column_in_window(&self, column: usize) -> bool {
        let (start, end) = self.column_window;
        if start <= end {
            column >= start && column <= end
        } else {
            column >= start || column <= end
        }
    }

    /// Hash of every calibration value, floats compared bitwise.
    ///
    /// Two calibrations with the same fingerprint produce the same lookup
    /// table at a given resolution.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.prod_line.hash(&mut hasher);
        for angles in [&self.beam_altitude_angles, &self.beam_azimuth_angles] {
            angles.len().hash(&mut hasher);
            angles.iter().for_each(|a| a.to_bits().hash(&mut hasher));
        }
        self.lidar_origin_to_beam_origin_mm.to_bits().hash(&mut hasher);
        self.lidar_to_sensor_transform
            .iter()
            .for_each(|v| v.to_bits().hash(&mut hasher));
        self.pixel_shift_by_row.hash(&mut hasher);
        self.columns_per_frame.hash(&mut hasher);
        self.pixels_per_column.hash(&mut hasher);
        self.column_window.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"{
        "prod_line": "OS-1-16",
        "beam_altitude_angles": [15.0, 5.0, -5.0, -15.0],
        "beam_azimuth_angles": [3.0, 1.0, -1.0, -3.0],
        "lidar_origin_to_beam_origin_mm": 12.163,
        "lidar_to_sensor_transform": [-1, 0, 0, 0, 0, -1, 0, 0, 0, 0, 1, 36.18, 0, 0, 0, 1],
        "data_format": {
            "pixels_per_column": 4,
            "columns_per_packet": 16,
            "columns_per_frame": 8,
            "pixel_shift_by_row": [3, 1, -1, -3],
            "column_window": [0, 7]
        }
    }"#;

    const NESTED: &str = r#"{
        "sensor_info": { "prod_line": "OS-0-32" },
        "beam_intrinsics": {
            "beam_altitude_angles": [10.0, 0.0],
            "beam_azimuth_angles": [0.0, 0.0],
            "lidar_origin_to_beam_origin_mm": 27.67
        },
        "lidar_intrinsics": {
            "lidar_to_sensor_transform": [1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1]
        },
        "lidar_data_format": {
            "pixels_per_column": 2,
            "columns_per_frame": 512,
            "pixel_shift_by_row": [0, 0],
            "column_window": [500, 10]
        }
    }"#;

    #[test]
    fn test_fingerprint_tracks_calibration() {
        let a = CalibrationMetadata::from_json_str(LEGACY).unwrap();
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.pixel_shift_by_row[0] = 0;
        assert_ne!(a.fingerprint(), b.fingerprint());

        let mut c = a.clone();
        c.column_window = (1, 6);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_parse_legacy_layout() {
        let meta = CalibrationMetadata::from_json_str(LEGACY).unwrap();
        assert_eq!(meta.prod_line, "OS-1-16");
        assert_eq!(meta.beam_count(), 4);
        assert_eq!(meta.columns_per_frame, 8);
        assert_eq!(meta.pixel_shift_by_row, vec![3, 1, -1, -3]);
        assert_eq!(meta.lidar_to_sensor_transform[11], 36.18);
        assert_eq!(meta.shift_for_row(3), -3);
    }

    #[test]
    fn test_parse_nested_layout() {
        let meta = CalibrationMetadata::from_json_str(NESTED).unwrap();
        assert_eq!(meta.prod_line, "OS-0-32");
        assert_eq!(meta.beam_count(), 2);
        assert_eq!(meta.columns_per_frame, 512);
        assert_eq!(meta.column_window, (500, 10));
        assert!((meta.lidar_origin_to_beam_origin_mm - 27.67).abs() < 1e-6);
    }

    #[test]
    fn test_missing_data_format() {
        let err = CalibrationMetadata::from_json_str(
            r#"{"beam_altitude_angles": [0.0], "beam_azimuth_angles": [0.0]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::MissingField("data_format")));
    }

    #[test]
    fn test_bad_transform_length() {
        let json = r#"{
            "beam_altitude_angles": [0.0], "beam_azimuth_angles": [0.0],
            "lidar_to_sensor_transform": [1, 0, 0],
            "data_format": { "columns_per_frame": 4 }
        }"#;
        let err = CalibrationMetadata::from_json_str(json).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::InvalidField { field: "lidar_to_sensor_transform", .. }
        ));
    }

    #[test]
    fn test_defaults_when_optional_fields_missing() {
        let json = r#"{
            "beam_altitude_angles": [1.0, -1.0], "beam_azimuth_angles": [0.0, 0.0],
            "data_format": { "columns_per_frame": 16 }
        }"#;
        let meta = CalibrationMetadata::from_json_str(json).unwrap();
        assert_eq!(meta.prod_line, "unknown");
        assert_eq!(meta.column_window, (0, 15));
        assert_eq!(meta.pixels_per_column, 2);
        assert!(meta.pixel_shift_by_row.is_empty());
        assert_eq!(meta.shift_for_row(1), 0);
        assert_eq!(meta.lidar_to_sensor_transform, IDENTITY_TRANSFORM);
    }

    #[test]
    fn test_column_window_wraps() {
        let meta = CalibrationMetadata::from_json_str(NESTED).unwrap();
        assert!(meta.column_in_window(505));
        assert!(meta.column_in_window(0));
        assert!(meta.column_in_window(10));
        assert!(!meta.column_in_window(11));
        assert!(!meta.column_in_window(499));
    }

    #[test]
    fn test_uniform_calibration() {
        let meta = CalibrationMetadata::uniform("test", 3, 32, 10.0, -10.0);
        assert_eq!(meta.beam_altitude_angles, vec![10.0, 0.0, -10.0]);
        assert_eq!(meta.column_window, (0, 31));
        assert!(meta.column_in_window(31));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, LEGACY).unwrap();
        let meta = CalibrationMetadata::from_json_file(&path).unwrap();
        assert_eq!(meta.beam_count(), 4);

        let missing = CalibrationMetadata::from_json_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(MetadataError::Io { .. })));
    }
}

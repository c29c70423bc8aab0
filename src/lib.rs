//! Segmentation of LiDAR point clouds guided by masks over the sensor's
//! reflectivity image.
//!
//! This crate provides tools for:
//! - Parsing Ouster-style sensor metadata into calibration parameters
//! - Building lookup tables from image-plane pixels to native point indices
//! - Applying 2D masks (files, bounding boxes or pose keypoints) to clouds
//! - Compositing segmented subsets with the full cloud for inspection
//!
//! # Example
//!
//! ```no_run
//! use lidar_segmentation::core::{loaders::load_point_cloud, loaders::load_mask_csv, CalibrationMetadata};
//! use lidar_segmentation::processors::{apply, combine, LookupTable};
//!
//! let calibration = CalibrationMetadata::from_json_file("metadata.json").unwrap();
//! let table = LookupTable::build(&calibration, 64, 1024).unwrap();
//! let cloud = load_point_cloud("scan.ply").unwrap();
//! let mask = load_mask_csv("mask.csv").unwrap();
//!
//! let segmented = apply(&cloud, &table, &mask).unwrap();
//! let combined = combine(&cloud, &segmented);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{MaskConfig, OutputConfig, PipelineConfig, SensorConfig};
pub use core::loaders::PointCloud;
pub use core::{CalibrationMetadata, Mask2D};
pub use processors::{CombinedCloud, LookupTable, SegmentedCloud};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

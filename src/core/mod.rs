//! Core data types and I/O operations.

pub mod image;
pub mod loaders;
pub mod metadata;
pub mod transforms;
pub mod writers;

pub use image::{BoundingBox, ImageError, Mask2D, RangeImage};
pub use loaders::{LoaderError, PointCloud};
pub use metadata::{CalibrationMetadata, MetadataError};
pub use writers::{write_combined_csv, write_combined_ply, write_ply, WriteError};

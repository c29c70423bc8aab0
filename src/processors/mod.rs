//! Data processing modules.

pub mod cache;
pub mod compositor;
pub mod keypoints;
pub mod lookup;
pub mod masking;
pub mod projection;
pub mod segmentation;

// Re-export key types for convenience
pub use cache::TableCache;
pub use compositor::{combine, CombinedCloud, Origin};
pub use keypoints::{limb_mask, Keypoint, KeypointError};
pub use lookup::{ConfigurationError, LookupTable, TableKey, NO_POINT};
pub use masking::{apply, apply_many, DimensionMismatchError, SegmentedCloud};
pub use projection::{project_full, project_masked};
pub use segmentation::{
    export_lookup_table, project_files, resolve_mask, segment_files, MaskSource,
    SegmentationSummary,
};

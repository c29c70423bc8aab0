//! Configuration types for the segmentation pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for interpreting sensor data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Multiplier converting raw range image pixels to millimetres
    #[serde(default = "default_range_scale")]
    pub range_scale: f32,

    /// Metres per millimetre applied to the XYZ ray table
    #[serde(default = "default_range_unit")]
    pub range_unit: f32,

    /// Rows of the image plane, overrides the metadata when set
    #[serde(default)]
    pub rows: Option<usize>,

    /// Columns of the image plane, overrides the metadata when set
    #[serde(default)]
    pub columns: Option<usize>,
}

fn default_range_scale() -> f32 {
    4.0
}

fn default_range_unit() -> f32 {
    0.001
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            range_scale: default_range_scale(),
            range_unit: default_range_unit(),
            rows: None,
            columns: None,
        }
    }
}

/// Configuration for building masks from pose keypoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskConfig {
    /// Keypoints at or below this confidence reject the mask
    #[serde(default = "default_keypoint_confidence")]
    pub keypoint_confidence: f32,

    /// Disc radius in pixels swept along each limb segment
    #[serde(default = "default_radius")]
    pub radius: u32,

    /// Keypoint indices joined in order (COCO left shoulder, elbow, wrist)
    #[serde(default = "default_limb_keypoints")]
    pub limb_keypoints: Vec<usize>,
}

fn default_keypoint_confidence() -> f32 {
    0.5
}

fn default_radius() -> u32 {
    1
}

fn default_limb_keypoints() -> Vec<usize> {
    vec![5, 7, 9]
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            keypoint_confidence: default_keypoint_confidence(),
            radius: default_radius(),
            limb_keypoints: default_limb_keypoints(),
        }
    }
}

/// Configuration for written outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// RGB color for points tagged `original`
    #[serde(default = "default_original_color")]
    pub original_color: [u8; 3],

    /// RGB color for points tagged `segmented`
    #[serde(default = "default_segmented_color")]
    pub segmented_color: [u8; 3],

    /// Also write CSV files next to the PLY outputs
    #[serde(default)]
    pub write_csv: bool,
}

fn default_original_color() -> [u8; 3] {
    [180, 180, 180] // light gray
}

fn default_segmented_color() -> [u8; 3] {
    [255, 0, 0] // red
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            original_color: default_original_color(),
            segmented_color: default_segmented_color(),
            write_csv: false,
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub mask: MaskConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mask_config() {
        let config = MaskConfig::default();
        assert_eq!(config.limb_keypoints, vec![5, 7, 9]);
        assert_eq!(config.radius, 1);
        assert_eq!(config.keypoint_confidence, 0.5);
    }

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.sensor.range_scale, 4.0);
        assert_eq!(config.output.segmented_color, [255, 0, 0]);
        assert!(config.sensor.rows.is_none());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: PipelineConfig =
            serde_yaml::from_str("mask:\n  radius: 3\nsensor:\n  range_scale: 1.0\n").unwrap();
        assert_eq!(config.mask.radius, 3);
        assert_eq!(config.mask.limb_keypoints, vec![5, 7, 9]);
        assert_eq!(config.sensor.range_scale, 1.0);
        assert_eq!(config.sensor.range_unit, 0.001);
    }

    #[test]
    fn test_yaml_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        let mut config = PipelineConfig::default();
        config.output.write_csv = true;
        config.sensor.rows = Some(64);

        config.to_yaml(&path).unwrap();
        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert!(loaded.output.write_csv);
        assert_eq!(loaded.sensor.rows, Some(64));
    }
}

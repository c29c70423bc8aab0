//! Merging a full cloud with its segmented subset.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::loaders::PointCloud;
use super::masking::SegmentedCloud;

/// Which input a point of a [`CombinedCloud`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Original,
    Segmented,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Original => "original",
            Origin::Segmented => "segmented",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cloud whose points are each tagged with their [`Origin`].
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedCloud {
    pub points: PointCloud,
    pub origins: Vec<Origin>,
}

impl CombinedCloud {
    #[inline]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Number of points with the given origin.
    pub fn count(&self, origin: Origin) -> usize {
        self.origins.iter().filter(|&&o| o == origin).count()
    }
}

/// Concatenate `original` and `segmented`, tagging every point.
///
/// Original points come first. Intensity is carried only when both
/// inputs have it.
pub fn combine(original: &PointCloud, segmented: &SegmentedCloud) -> CombinedCloud {
    let total_size = original.len() + segmented.len();

    let mut x = Vec::with_capacity(total_size);
    let mut y = Vec::with_capacity(total_size);
    let mut z = Vec::with_capacity(total_size);
    let mut origins = Vec::with_capacity(total_size);

    for (cloud, origin) in [(original, Origin::Original), (segmented, Origin::Segmented)] {
        x.extend_from_slice(&cloud.x);
        y.extend_from_slice(&cloud.y);
        z.extend_from_slice(&cloud.z);
        origins.extend(std::iter::repeat(origin).take(cloud.len()));
    }

    let intensity = match (&original.intensity, &segmented.intensity) {
        (Some(a), Some(b)) => Some([a.as_slice(), b.as_slice()].concat()),
        _ => None,
    };

    CombinedCloud {
        points: PointCloud { x, y, z, intensity },
        origins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(xs: &[f32]) -> PointCloud {
        PointCloud::from_xyz(xs.to_vec(), vec![0.0; xs.len()], vec![0.0; xs.len()])
    }

    #[test]
    fn test_combine_orders_and_tags() {
        let original = cloud(&[1.0, 2.0, 3.0]);
        let segmented = cloud(&[2.0]);

        let combined = combine(&original, &segmented);
        assert_eq!(combined.len(), 4);
        assert_eq!(combined.points.x, vec![1.0, 2.0, 3.0, 2.0]);
        assert_eq!(
            combined.origins,
            vec![Origin::Original, Origin::Original, Origin::Original, Origin::Segmented]
        );
        assert_eq!(combined.count(Origin::Segmented), 1);
    }

    #[test]
    fn test_combine_empty_segmented() {
        let original = cloud(&[1.0, 2.0]);
        let combined = combine(&original, &PointCloud::new());
        assert_eq!(combined.points, original);
        assert_eq!(combined.count(Origin::Original), 2);
    }

    #[test]
    fn test_combine_intensity() {
        let mut original = cloud(&[1.0]);
        original.intensity = Some(vec![5.0]);
        let mut segmented = cloud(&[1.0]);
        segmented.intensity = Some(vec![5.0]);

        assert_eq!(combine(&original, &segmented).points.intensity, Some(vec![5.0, 5.0]));

        segmented.intensity = None;
        assert_eq!(combine(&original, &segmented).points.intensity, None);
    }

    #[test]
    fn test_origin_labels() {
        assert_eq!(Origin::Original.to_string(), "original");
        assert_eq!(Origin::Segmented.as_str(), "segmented");
        assert_eq!(serde_json::to_string(&Origin::Segmented).unwrap(), "\"segmented\"");
    }
}

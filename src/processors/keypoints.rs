//! Building image-plane masks from pose keypoints.
//!
//! A pose model run on the reflectivity image yields keypoints in pixel
//! coordinates. A limb is masked by sweeping a small disc along the
//! segments joining its keypoints (shoulder to elbow to wrist by default),
//! giving a capsule-shaped region around the arm.

use thiserror::Error;

use crate::config::MaskConfig;
use crate::core::image::Mask2D;

/// A detected keypoint: `x` is the image column, `y` the image row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }
}

/// Reasons a limb mask cannot be built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeypointError {
    #[error("keypoint {index} missing: only {available} keypoints detected")]
    Missing { index: usize, available: usize },

    #[error("keypoint {index} confidence {confidence} is not above {threshold}")]
    LowConfidence {
        index: usize,
        confidence: f32,
        threshold: f32,
    },

    #[error("a limb needs at least one keypoint")]
    EmptyLimb,
}

/// Build a mask covering the limb described by `config.limb_keypoints`.
///
/// Every limb keypoint must be present and more confident than
/// `config.keypoint_confidence`; the mask is rejected otherwise rather
/// than drawn from a partial limb.
pub fn limb_mask(
    keypoints: &[Keypoint],
    rows: usize,
    columns: usize,
    config: &MaskConfig,
) -> Result<Mask2D, KeypointError> {
    if config.limb_keypoints.is_empty() {
        return Err(KeypointError::EmptyLimb);
    }

    let mut limb = Vec::with_capacity(config.limb_keypoints.len());
    for &index in &config.limb_keypoints {
        let keypoint = keypoints.get(index).ok_or(KeypointError::Missing {
            index,
            available: keypoints.len(),
        })?;
        if !(keypoint.confidence > config.keypoint_confidence) {
            return Err(KeypointError::LowConfidence {
                index,
                confidence: keypoint.confidence,
                threshold: config.keypoint_confidence,
            });
        }
        limb.push(*keypoint);
    }

    let mut mask = Mask2D::new(rows, columns);
    if let [single] = limb.as_slice() {
        draw_disc(&mut mask, single.x, single.y, config.radius);
    }
    for pair in limb.windows(2) {
        draw_capsule(&mut mask, (pair[0].x, pair[0].y), (pair[1].x, pair[1].y), config.radius);
    }

    log::debug!(
        "Limb mask from keypoints {:?} covers {} pixels",
        config.limb_keypoints,
        mask.count()
    );

    Ok(mask)
}

/// Fill the disc of `radius` pixels centred on (x, y), clipped to the mask.
///
/// Non-finite centres draw nothing.
pub fn draw_disc(mask: &mut Mask2D, x: f32, y: f32, radius: u32) {
    if !(x.is_finite() && y.is_finite()) {
        return;
    }

    let r = radius as i64;
    let rows = mask.rows() as i64;
    let columns = mask.columns() as i64;
    // Centres further out than this cannot reach the grid.
    let cx = (x.round() as i64).clamp(-r - 1, columns + r);
    let cy = (y.round() as i64).clamp(-r - 1, rows + r);
    let r_squared = (r as i128) * (r as i128);

    for row in (cy - r).max(0)..=(cy + r).min(rows - 1) {
        let dy = (row - cy) as i128;
        for column in (cx - r).max(0)..=(cx + r).min(columns - 1) {
            let dx = (column - cx) as i128;
            if dx * dx + dy * dy <= r_squared {
                mask.set(row as usize, column as usize, true);
            }
        }
    }
}

/// Sweep a disc from `from` to `to`, both endpoints included.
///
/// The segment is first clipped to the part that can touch the grid, then
/// sampled one pixel apart so the swept region has no gaps. Segments with
/// a non-finite endpoint draw nothing.
pub fn draw_capsule(mask: &mut Mask2D, from: (f32, f32), to: (f32, f32), radius: u32) {
    let margin = radius as f64 + 1.0;
    let bounds = (
        -margin,
        -margin,
        mask.columns() as f64 + margin,
        mask.rows() as f64 + margin,
    );
    let from = (from.0 as f64, from.1 as f64);
    let to = (to.0 as f64, to.1 as f64);

    let Some((start, end)) = clip_segment(from, to, bounds) else {
        return;
    };

    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let steps = dx.hypot(dy).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        draw_disc(mask, (start.0 + dx * t) as f32, (start.1 + dy * t) as f32, radius);
    }
}

/// Liang-Barsky clip of a segment to `(min_x, min_y, max_x, max_y)`.
fn clip_segment(
    from: (f64, f64),
    to: (f64, f64),
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) {
        return None;
    }

    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-dx, from.0 - min_x),
        (dx, max_x - from.0),
        (-dy, from.1 - min_y),
        (dy, max_y - from.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }

    Some((
        (from.0 + dx * t0, from.1 + dy * t0),
        (from.0 + dx * t1, from.1 + dy * t1),
    ))
}

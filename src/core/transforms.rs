//! Scan geometry transformations.
//!
//! This module provides the fixed-geometry pieces of an Ouster-style
//! scan: destaggering image-plane grids by per-row pixel shifts, and the
//! per-pixel XYZ ray table used to turn ranges into Cartesian points.
//! Row-independent work is parallelized using Rayon.

use std::f32::consts::PI;

use rayon::prelude::*;

use super::metadata::CalibrationMetadata;

/// Measurement column that lands in image column `column` after
/// destaggering by `shift` in a frame `width` columns wide.
#[inline]
pub fn staggered_column(column: usize, shift: i32, width: usize) -> usize {
    let width_i = width as i64;
    (column as i64 - shift as i64).rem_euclid(width_i) as usize
}

/// Circularly shift each row of a row-major grid.
///
/// With `inverse == false`, `dst[r][(c + shift[r]) mod W] = src[r][c]`,
/// turning measurement-order data into an aligned image. With
/// `inverse == true` the shift is undone. Rows without a shift entry are
/// copied unchanged.
///
/// # Example
///
/// ```
/// use lidar_segmentation::core::transforms::destagger;
///
/// let staggered = vec![1, 2, 3, 4, 5, 6];
/// let image = destagger(&staggered, 2, 3, &[1, 0], false);
/// assert_eq!(image, vec![3, 1, 2, 4, 5, 6]);
/// assert_eq!(destagger(&image, 2, 3, &[1, 0], true), staggered);
/// ```
pub fn destagger<T: Copy + Send + Sync>(
    values: &[T],
    rows: usize,
    columns: usize,
    shifts: &[i32],
    inverse: bool,
) -> Vec<T> {
    debug_assert_eq!(values.len(), rows * columns, "grid size mismatch");

    if columns == 0 {
        return values.to_vec();
    }

    let mut out = values.to_vec();
    out.par_chunks_mut(columns)
        .zip(values.par_chunks(columns))
        .enumerate()
        .for_each(|(row, (dst, src))| {
            let shift = shifts.get(row).copied().unwrap_or(0);
            let shift = if inverse { -shift } else { shift };
            for (column, &value) in src.iter().enumerate() {
                let target = (column as i64 + shift as i64).rem_euclid(columns as i64) as usize;
                dst[target] = value;
            }
        });
    out
}

/// Per-pixel ray table in native (measurement) order.
///
/// A return of `range` millimetres at native index `i` lies at
/// `direction[i] * range + offset[i]` metres in the sensor frame.
#[derive(Debug, Clone, PartialEq)]
pub struct XyzLut {
    pub direction: Vec<[f32; 3]>,
    pub offset: Vec<[f32; 3]>,
}

impl XyzLut {
    /// Number of rays in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.direction.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.direction.is_empty()
    }

    /// Cartesian point for a range measured along ray `index`.
    #[inline]
    pub fn project(&self, index: usize, range: f32) -> [f32; 3] {
        let d = self.direction[index];
        let o = self.offset[index];
        [d[0] * range + o[0], d[1] * range + o[1], d[2] * range + o[2]]
    }
}

fn rotate(m: &[f32; 16], v: [f32; 3]) -> [f32; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[4] * v[0] + m[5] * v[1] + m[6] * v[2],
        m[8] * v[0] + m[9] * v[1] + m[10] * v[2],
    ]
}

/// Build the XYZ ray table for a calibrated sensor.
///
/// Each beam's elevation and azimuth offset is combined with the encoder
/// angle of its measurement column; the beam-origin offset is subtracted
/// along the ray, then everything is moved into the sensor frame with
/// `lidar_to_sensor_transform` and scaled by `range_unit`.
///
/// The caller is responsible for `rows` matching the calibration's beam
/// tables; rows without calibration entries get a horizontal beam.
pub fn make_xyz_lut(
    calibration: &CalibrationMetadata,
    rows: usize,
    columns: usize,
    range_unit: f32,
) -> XyzLut {
    let transform = &calibration.lidar_to_sensor_transform;
    let translation = [transform[3], transform[7], transform[11]];
    let n = calibration.lidar_origin_to_beam_origin_mm;
    let azimuth_step = 2.0 * PI / columns.max(1) as f32;

    let rays: Vec<([f32; 3], [f32; 3])> = (0..rows * columns)
        .into_par_iter()
        .map(|i| {
            let (row, column) = (i / columns, i % columns);
            let encoder = 2.0 * PI - column as f32 * azimuth_step;
            let azimuth = -calibration.beam_azimuth_angles.get(row).copied().unwrap_or(0.0) * PI / 180.0;
            let altitude = calibration.beam_altitude_angles.get(row).copied().unwrap_or(0.0) * PI / 180.0;

            let direction = [
                (encoder + azimuth).cos() * altitude.cos(),
                (encoder + azimuth).sin() * altitude.cos(),
                altitude.sin(),
            ];
            let offset = [
                encoder.cos() * n - direction[0] * n,
                encoder.sin() * n - direction[1] * n,
                -direction[2] * n,
            ];

            let direction = rotate(transform, direction);
            let offset = rotate(transform, offset);
            (
                direction.map(|v| v * range_unit),
                [
                    (offset[0] + translation[0]) * range_unit,
                    (offset[1] + translation[1]) * range_unit,
                    (offset[2] + translation[2]) * range_unit,
                ],
            )
        })
        .collect();

    let (direction, offset) = rays.into_iter().unzip();
    XyzLut { direction, offset }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::IDENTITY_TRANSFORM;

    fn norm(v: [f32; 3]) -> f32 {
        (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
    }

    #[test]
    fn test_staggered_column_wraps() {
        assert_eq!(staggered_column(0, 1, 4), 3);
        assert_eq!(staggered_column(3, -2, 4), 1);
        assert_eq!(staggered_column(2, 0, 4), 2);
        assert_eq!(staggered_column(1, 9, 4), 0);
    }

    #[test]
    fn test_destagger_basic() {
        let values: Vec<u32> = (0..8).collect();
        let image = destagger(&values, 2, 4, &[1, -1], false);
        assert_eq!(image, vec![3, 0, 1, 2, 5, 6, 7, 4]);
    }

    #[test]
    fn test_destagger_inverse_roundtrip() {
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let shifts = [3, 1, -1, -3];
        let image = destagger(&values, 4, 6, &shifts, false);
        assert_ne!(image, values);
        assert_eq!(destagger(&image, 4, 6, &shifts, true), values);
    }

    #[test]
    fn test_destagger_matches_staggered_column() {
        let values: Vec<usize> = (0..12).collect();
        let shifts = [2, 0, 5];
        let image = destagger(&values, 3, 4, &shifts, false);
        for row in 0..3 {
            for column in 0..4 {
                let v = staggered_column(column, shifts[row], 4);
                assert_eq!(image[row * 4 + column], values[row * 4 + v]);
            }
        }
    }

    #[test]
    fn test_destagger_missing_shifts() {
        let values = vec![1, 2, 3, 4];
        assert_eq!(destagger(&values, 2, 2, &[], false), values);
    }

    #[test]
    fn test_xyz_lut_unit_directions() {
        let calibration = CalibrationMetadata::uniform("test", 4, 16, 20.0, -20.0);
        let lut = make_xyz_lut(&calibration, 4, 16, 1.0);
        assert_eq!(lut.len(), 64);
        for d in &lut.direction {
            assert!((norm(*d) - 1.0).abs() < 1e-5);
        }
        for o in &lut.offset {
            assert!(norm(*o) < 1e-6);
        }
    }

    #[test]
    fn test_xyz_lut_first_column_points_forward() {
        let calibration = CalibrationMetadata::uniform("test", 1, 4, 0.0, 0.0);
        let lut = make_xyz_lut(&calibration, 1, 4, 0.001);

        // Column 0 has encoder angle 2*pi: straight along +x.
        let p = lut.project(0, 1000.0);
        assert!((p[0] - 1.0).abs() < 1e-5);
        assert!(p[1].abs() < 1e-5);
        assert!(p[2].abs() < 1e-5);

        // Column 1 sweeps clockwise to -y.
        let p = lut.project(1, 1000.0);
        assert!(p[0].abs() < 1e-5);
        assert!((p[1] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_xyz_lut_transform_translation() {
        let mut calibration = CalibrationMetadata::uniform("test", 1, 4, 0.0, 0.0);
        let mut transform = IDENTITY_TRANSFORM;
        transform[11] = 36.0;
        calibration.lidar_to_sensor_transform = transform;

        let lut = make_xyz_lut(&calibration, 1, 4, 0.001);
        let p = lut.project(0, 0.0);
        assert!((p[2] - 0.036).abs() < 1e-6);
    }

    #[test]
    fn test_xyz_lut_beam_offset() {
        let mut calibration = CalibrationMetadata::uniform("test", 1, 4, 0.0, 0.0);
        calibration.lidar_origin_to_beam_origin_mm = 10.0;
        let lut = make_xyz_lut(&calibration, 1, 4, 1.0);

        // Beam origin lies on the ray when there is no azimuth offset.
        let p = lut.project(0, 100.0);
        assert!((p[0] - 100.0).abs() < 1e-3);
    }
}
